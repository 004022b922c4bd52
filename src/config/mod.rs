use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "architect.toml";

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    #[default]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LLMProvider::OpenAI => "openai",
            LLMProvider::DeepSeek => "deepseek",
            LLMProvider::OpenRouter => "openrouter",
            LLMProvider::Anthropic => "anthropic",
            LLMProvider::Gemini => "gemini",
            LLMProvider::Ollama => "ollama",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// LLM模型配置
    pub llm: LLMConfig,

    /// 各智能体的模型覆盖配置
    pub agents: AgentsConfig,

    /// 检索配置
    pub retrieval: RetrievalConfig,

    /// 编排器配置
    pub orchestrator: OrchestratorConfig,

    /// 对话记录存储配置
    pub storage: StorageConfig,

    /// 文档输出配置
    pub docs: DocsConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址，为空时使用provider默认地址
    pub api_base_url: String,

    /// 默认模型
    pub model: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 默认温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 单次调用超时时间（秒）
    pub timeout_seconds: u64,
}

/// 单个智能体的模型覆盖项
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AgentModelConfig {
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

/// 解析后的智能体模型参数
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f64,
}

impl AgentModelConfig {
    /// 以LLM默认配置为底，叠加智能体自身的覆盖项
    pub fn resolve(&self, llm: &LLMConfig) -> AgentSettings {
        AgentSettings {
            model: self
                .model
                .as_ref()
                .filter(|m| !m.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| llm.model.clone()),
            temperature: self.temperature.unwrap_or(llm.temperature),
        }
    }
}

/// 智能体配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AgentsConfig {
    pub understanding_agent: AgentModelConfig,
    pub impact_agent: AgentModelConfig,
    pub blueprint_agent: AgentModelConfig,
    pub doc_agent: AgentModelConfig,
    pub requirement_agent: AgentModelConfig,
}

/// 检索配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 向量索引持久化目录
    pub persist_dir: PathBuf,

    /// 待索引的源码目录
    pub source_dir: PathBuf,

    /// 每次检索返回的文档数
    pub top_k: usize,

    /// 上下文最大字符数
    pub max_context_chars: usize,

    /// 参与索引的文件模式
    pub include_patterns: Vec<String>,

    /// 要排除的目录
    pub excluded_dirs: Vec<String>,

    /// 单个分片的目标字符数
    pub chunk_chars: usize,

    /// 最大文件大小限制（字节）
    pub max_file_size: u64,
}

/// 编排器配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// 最终回复过短时对最后一个智能体的额外调用次数
    pub refinement_retries: u32,

    /// 回复被视为有效的最小字符数
    pub min_response_chars: usize,

    /// 状态记录中输出片段的最大字符数
    pub snippet_chars: usize,

    /// 状态日志环形缓冲区容量
    pub status_log_capacity: usize,

    /// 是否使用LLM进行意图识别（失败时回退到关键字匹配）
    pub llm_intent_detection: bool,
}

/// 对话记录存储配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

/// 文档输出配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DocsConfig {
    /// 生成文档的输出目录，为空时不落盘
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 加载配置：显式路径必须可读；否则尝试当前目录下的默认配置文件，都没有则使用默认值
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let default_config_path = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE);

        if default_config_path.exists() {
            Self::from_file(&default_config_path)
        } else {
            Ok(Config::default())
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: default_api_key(),
            api_base_url: String::new(),
            model: String::from("gemini-2.5-flash"),
            max_tokens: 8192,
            temperature: 0.2,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 120,
        }
    }
}

fn default_api_key() -> String {
    std::env::var("ARCHITECT_LLM_API_KEY")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .unwrap_or_default()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("data/vector_index"),
            source_dir: PathBuf::from("."),
            top_k: 5,
            max_context_chars: 30_000,
            include_patterns: [
                "*.py", "*.java", "*.go", "*.js", "*.ts", "*.rs", "*.md", "*.txt", "*.yaml",
                "*.yml", "*.json", "*.toml",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            excluded_dirs: [".git", "target", "node_modules", "venv", "__pycache__", "data"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            chunk_chars: 4000,
            max_file_size: 512 * 1024, // 512KB
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            refinement_retries: 2,
            min_response_chars: 20,
            snippet_chars: 400,
            status_log_capacity: 200,
            llm_intent_detection: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/chats.db"),
        }
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            output_dir: Some(PathBuf::from("generated_docs")),
        }
    }
}
