use crate::config::{Config, LLMProvider};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Agentic Architect - 基于检索增强的多智能体架构助手
#[derive(Parser, Debug)]
#[command(name = "agentic-architect")]
#[command(
    about = "Retrieval-augmented multi-agent assistant that answers questions about a codebase: understanding, impact assessment, blueprints and documentation."
)]
#[command(version)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 是否启用详细日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// LLM Provider (openai, deepseek, openrouter, anthropic, gemini, ollama)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// LLM API KEY
    #[arg(long, global = true)]
    pub llm_api_key: Option<String>,

    /// LLM API基地址
    #[arg(long, global = true)]
    pub llm_api_base_url: Option<String>,

    /// 默认模型，未单独配置的智能体都使用它
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// 温度参数
    #[arg(long, global = true)]
    pub temperature: Option<f64>,

    /// 最大tokens数
    #[arg(long, global = true)]
    pub max_tokens: Option<u32>,

    /// 对话数据库路径
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// 向量索引目录
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// 只用关键字规则识别意图，不调用LLM
    #[arg(long, global = true)]
    pub keyword_intent: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// 向智能体提问
    Ask {
        query: String,

        /// 追加到已有对话
        #[arg(long)]
        chat: Option<i64>,

        /// 以JSON输出运行结果
        #[arg(long)]
        json: bool,

        /// 运行期间打印状态变化
        #[arg(long)]
        watch: bool,

        /// 检索返回的文档数
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// 为源码目录建立向量索引
    Index {
        /// 清空后重建
        #[arg(long)]
        rebuild: bool,

        /// 源码目录，默认取配置中的 retrieval.source_dir
        #[arg(long)]
        source_dir: Option<PathBuf>,
    },

    /// 列出历史对话
    History {
        #[arg(long)]
        search: Option<String>,
    },

    /// 查看对话详情
    Show { chat_id: i64 },

    /// 重新检索对话原始问题的来源
    Sources {
        chat_id: i64,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// 导出对话为JSON
    Export { chat_id: i64, path: PathBuf },

    /// 删除对话
    Delete { chat_id: i64 },
}

impl Args {
    /// 加载配置文件并用CLI参数覆盖
    pub fn to_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        // 覆盖LLM配置
        if let Some(provider_str) = &self.llm_provider {
            if let Ok(provider) = provider_str.parse::<LLMProvider>() {
                config.llm.provider = provider;
            } else {
                eprintln!(
                    "⚠️ 警告: 未知的provider: {}，使用配置中的provider",
                    provider_str
                );
            }
        }
        if let Some(api_key) = &self.llm_api_key {
            config.llm.api_key = api_key.clone();
        }
        if let Some(api_base_url) = &self.llm_api_base_url {
            config.llm.api_base_url = api_base_url.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }

        // 存储与检索
        if let Some(db_path) = &self.db_path {
            config.storage.db_path = db_path.clone();
        }
        if let Some(index_dir) = &self.index_dir {
            config.retrieval.persist_dir = index_dir.clone();
        }
        match &self.command {
            Command::Ask {
                top_k: Some(top_k), ..
            } => config.retrieval.top_k = *top_k,
            Command::Index {
                source_dir: Some(source_dir),
                ..
            } => config.retrieval.source_dir = source_dir.clone(),
            _ => {}
        }

        if self.keyword_intent {
            config.orchestrator.llm_intent_detection = false;
        }
        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }
}

// Include tests
#[cfg(test)]
mod tests;
