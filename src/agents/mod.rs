//! 智能体注册表与调用约定

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::llm::LanguageModel;

pub mod blueprint;
pub mod documentation;
pub mod impact;
pub mod prompt_agent;
pub mod requirements;
pub mod sanitize;
pub mod understanding;

pub use blueprint::BlueprintGenerator;
pub use documentation::DocGenerator;
pub use impact::ImpactAnalyzer;
pub use requirements::RequirementsAnalyzer;
pub use understanding::UnderstandingAgent;

/// 智能体调用错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    /// 调用约定不匹配：该智能体不接受上下文参数
    #[error("agent does not accept a context argument")]
    ContextNotSupported,

    #[error("{0}")]
    Failed(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        AgentError::Failed(e.to_string())
    }
}

/// 流水线中可用的智能体种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Understanding,
    Impact,
    Blueprint,
    Documentation,
}

impl AgentKind {
    /// 对外展示的名称，同时用于状态记录与对话持久化
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Understanding => "UnderstandingAgent",
            AgentKind::Impact => "ImpactAnalyzerAgent",
            AgentKind::Blueprint => "BlueprintGeneratorAgent",
            AgentKind::Documentation => "DocGeneratorAgent",
        }
    }

    /// 所有内置种类，按流水线中的常见顺序
    pub fn all() -> [AgentKind; 4] {
        [
            AgentKind::Understanding,
            AgentKind::Impact,
            AgentKind::Blueprint,
            AgentKind::Documentation,
        ]
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// 智能体处理器：接收用户请求与可选的检索上下文，返回文本结果。
/// 内置实现自行吸收LLM失败并返回降级文本，只有调用约定问题才以错误返回。
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn generate(&self, query: &str, context: Option<&str>) -> Result<String, AgentError>;
}

/// 注册表中的智能体引用，名称在注册时确定
#[derive(Clone)]
pub struct AgentRef {
    pub kind: AgentKind,
    pub display_name: String,
    pub handler: Arc<dyn AgentHandler>,
}

impl std::fmt::Debug for AgentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRef")
            .field("kind", &self.kind)
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// 智能体注册表
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentKind, AgentRef>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置构建所有内置智能体，模型参数在此处一次性解析
    pub fn from_config(config: &Config, llm: Arc<dyn LanguageModel>) -> Self {
        let agents = &config.agents;
        let llm_config = &config.llm;

        Self::new()
            .with_handler(
                AgentKind::Understanding,
                Arc::new(UnderstandingAgent::new(
                    llm.clone(),
                    agents.understanding_agent.resolve(llm_config),
                )),
            )
            .with_handler(
                AgentKind::Impact,
                Arc::new(ImpactAnalyzer::new(
                    llm.clone(),
                    agents.impact_agent.resolve(llm_config),
                )),
            )
            .with_handler(
                AgentKind::Blueprint,
                Arc::new(BlueprintGenerator::new(
                    llm.clone(),
                    agents.blueprint_agent.resolve(llm_config),
                )),
            )
            .with_handler(
                AgentKind::Documentation,
                Arc::new(DocGenerator::new(
                    llm,
                    agents.doc_agent.resolve(llm_config),
                    config.docs.output_dir.clone(),
                )),
            )
    }

    /// 注册（或替换）某一类智能体，使用默认展示名称
    pub fn register(&mut self, kind: AgentKind, handler: Arc<dyn AgentHandler>) {
        self.register_named(kind, kind.display_name(), handler);
    }

    /// 以自定义展示名称注册
    pub fn register_named(
        &mut self,
        kind: AgentKind,
        display_name: impl Into<String>,
        handler: Arc<dyn AgentHandler>,
    ) {
        self.agents.insert(
            kind,
            AgentRef {
                kind,
                display_name: display_name.into(),
                handler,
            },
        );
    }

    pub fn with_handler(mut self, kind: AgentKind, handler: Arc<dyn AgentHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn get(&self, kind: AgentKind) -> Option<AgentRef> {
        self.agents.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl AgentHandler for Echo {
        async fn generate(&self, query: &str, _context: Option<&str>) -> Result<String, AgentError> {
            Ok(query.to_string())
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(AgentKind::Understanding.display_name(), "UnderstandingAgent");
        assert_eq!(AgentKind::Impact.display_name(), "ImpactAnalyzerAgent");
        assert_eq!(AgentKind::Blueprint.display_name(), "BlueprintGeneratorAgent");
        assert_eq!(AgentKind::Documentation.display_name(), "DocGeneratorAgent");
    }

    #[test]
    fn test_all_kinds_have_distinct_names() {
        let names: std::collections::HashSet<_> =
            AgentKind::all().iter().map(|k| k.display_name()).collect();
        assert_eq!(names.len(), 4);
    }

    #[tokio::test]
    async fn test_registry_register_and_replace() {
        let mut registry = AgentRegistry::new();
        assert!(registry.get(AgentKind::Impact).is_none());

        registry.register(AgentKind::Impact, Arc::new(Echo));
        let agent = registry.get(AgentKind::Impact).unwrap();
        assert_eq!(agent.display_name, "ImpactAnalyzerAgent");
        assert_eq!(agent.handler.generate("hi", None).await.unwrap(), "hi");

        registry.register_named(AgentKind::Impact, "CustomImpact", Arc::new(Echo));
        assert_eq!(
            registry.get(AgentKind::Impact).unwrap().display_name,
            "CustomImpact"
        );
    }

    #[test]
    fn test_agent_error_from_anyhow() {
        let err: AgentError = anyhow::anyhow!("quota exceeded").into();
        assert_eq!(err, AgentError::Failed("quota exceeded".to_string()));
    }
}
