use async_trait::async_trait;
use std::sync::Arc;

use super::prompt_agent::{AgentCore, LLMCallMode, PromptAgent, PromptTemplate};
use super::{AgentError, AgentHandler, AgentKind};
use crate::config::AgentSettings;
use crate::llm::LanguageModel;

/// 模块理解智能体 - 解释相关模块/服务的职责、关系与注意事项，输出自由文本
pub struct UnderstandingAgent {
    core: AgentCore,
}

impl UnderstandingAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self {
            core: AgentCore::new(llm, settings),
        }
    }
}

#[async_trait]
impl PromptAgent for UnderstandingAgent {
    fn agent_type(&self) -> AgentKind {
        AgentKind::Understanding
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are an expert Software Architect and Senior Dev Lead advisor. Your audience includes architects, tech leads and engineering managers.
Using the supplied context, explain the relevant module or service and answer the user's query with practical, prioritized actions and concerns."#
                .to_string(),

            opening_instruction: "Answer the request below using the retrieved repository context."
                .to_string(),

            closing_instruction: r#"
Behavior / output guidance:
- If the user asks generically about a module/service, return concise bullet points covering: purpose, major relationships, key challenges, known gotchas, and prioritized improvement areas (tech debt, architecture, performance, security). Limit to 6 bullets.
- If the user asks a specific question (how to implement X, where to change code, migration steps), focus strictly on the requested topic and give step-by-step actionable guidance for engineers (code locations, tests, rollout notes).
- Where relevant, include one-line recommendations for monitoring/metrics and a short rollback strategy.

Return plain human-readable text, with short code-path references where possible."#
                .to_string(),

            llm_call_mode: LLMCallMode::Prompt,
        }
    }

    fn fallback(&self, error: &anyhow::Error) -> String {
        format!("Error generating understanding: {}", error)
    }
}

#[async_trait]
impl AgentHandler for UnderstandingAgent {
    async fn generate(&self, query: &str, context: Option<&str>) -> Result<String, AgentError> {
        Ok(self.execute(query, context).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompt_agent::EMPTY_CONTEXT;
    use crate::llm::testing::ScriptedModel;

    fn settings() -> AgentSettings {
        AgentSettings {
            model: "understanding-model".to_string(),
            temperature: 0.4,
        }
    }

    #[tokio::test]
    async fn test_returns_llm_text_and_uses_settings() {
        let llm = Arc::new(ScriptedModel::replying("The cache module memoizes prompts."));
        let agent = UnderstandingAgent::new(llm.clone(), settings());

        let out = agent
            .generate("Explain the cache", Some("Source: cache.rs\nfn get()"))
            .await
            .unwrap();
        assert_eq!(out, "The cache module memoizes prompts.");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "understanding-model");
        assert_eq!(requests[0].temperature, 0.4);
        assert!(requests[0].user_prompt.contains("Source: cache.rs"));
        assert!(requests[0].user_prompt.contains("Explain the cache"));
    }

    #[tokio::test]
    async fn test_missing_context_uses_placeholder() {
        let llm = Arc::new(ScriptedModel::replying("ok"));
        let agent = UnderstandingAgent::new(llm.clone(), settings());

        agent.generate("why?", None).await.unwrap();
        assert!(llm.requests()[0].user_prompt.contains(EMPTY_CONTEXT));
    }

    #[tokio::test]
    async fn test_llm_failure_is_degraded_text() {
        let llm = Arc::new(ScriptedModel::failing("rate limited"));
        let agent = UnderstandingAgent::new(llm, settings());

        let out = agent.generate("why?", None).await.unwrap();
        assert_eq!(out, "Error generating understanding: rate limited");
    }
}
