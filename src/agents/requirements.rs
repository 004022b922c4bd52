use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::prompt_agent::AgentCore;
use super::sanitize::{schema_text, try_parse_structured};
use crate::config::AgentSettings;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::pipeline::intent::{Intent, IntentAssessment, IntentDetector};

/// 意图识别的模型输出
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IntentResponse {
    /// impact|blueprint|understanding|documentation|generic
    pub intent: String,
    #[serde(default)]
    pub summary: String,
}

const SYSTEM_PROMPT: &str = "You are a requirements intent detector and short analyzer. Given the user's request, produce the intent classification and a one-line summary.";

/// 需求分析智能体 - 用LLM识别意图，失败时回退到关键字匹配
pub struct RequirementsAnalyzer {
    core: AgentCore,
}

impl RequirementsAnalyzer {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self {
            core: AgentCore::new(llm, settings),
        }
    }

    fn build_prompt(query: &str) -> String {
        format!(
            r#"Possible intents are: impact, blueprint, understanding, documentation, generic.

Request:
{}

Return STRICT JSON only, matching this schema:
{}"#,
            query.trim(),
            schema_text::<IntentResponse>()
        )
    }

    fn keyword_fallback(query: &str) -> IntentAssessment {
        IntentAssessment {
            intent: Intent::classify(query),
            summary: None,
        }
    }
}

#[async_trait]
impl IntentDetector for RequirementsAnalyzer {
    async fn detect(&self, query: &str) -> IntentAssessment {
        let request = CompletionRequest {
            model: self.core.settings.model.clone(),
            temperature: self.core.settings.temperature,
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: Self::build_prompt(query),
        };

        let raw = match self.core.llm.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Intent detection LLM call failed, using keyword rules");
                return Self::keyword_fallback(query);
            }
        };

        let Some(response) = try_parse_structured::<IntentResponse>(&raw) else {
            warn!("Intent detection output was not valid JSON, using keyword rules");
            return Self::keyword_fallback(query);
        };

        match response.intent.parse::<Intent>() {
            Ok(intent) => {
                debug!(intent = %intent, "LLM intent detected");
                let summary = response.summary.trim();
                IntentAssessment {
                    intent,
                    summary: (!summary.is_empty()).then(|| summary.to_string()),
                }
            }
            Err(e) => {
                warn!(error = %e, "Unknown intent label, using keyword rules");
                Self::keyword_fallback(query)
            }
        }
    }
}
