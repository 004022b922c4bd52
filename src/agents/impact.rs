use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::prompt_agent::{AgentCore, LLMCallMode, PromptAgent, PromptTemplate};
use super::sanitize::{
    PARSE_FAILURE_MARKER, StructuredOutput, render_structured, sanitize_structured, schema_text,
};
use super::{AgentError, AgentHandler, AgentKind};
use crate::config::AgentSettings;
use crate::llm::LanguageModel;

/// 单个受影响项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImpactItem {
    /// 服务/模块名称
    pub name: String,
    /// 变更性质：code/config/data/infra
    pub nature: String,
    /// 影响等级：minor|medium|major
    pub level: String,
    /// 工作量估算：XS|S|M|L|XL|XXL
    pub tshirt: String,
    /// 一句话理由
    pub justification: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// 影响评估结果，按影响程度降序排列的受影响项列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ImpactAssessment(pub Vec<ImpactItem>);

impl StructuredOutput for ImpactAssessment {
    fn placeholder(raw: &str) -> Self {
        ImpactAssessment(vec![ImpactItem {
            name: "unknown".to_string(),
            nature: raw.to_string(),
            level: "unknown".to_string(),
            tshirt: "M".to_string(),
            justification: PARSE_FAILURE_MARKER.to_string(),
            risks: Vec::new(),
            next_steps: Vec::new(),
            owners: Vec::new(),
            sources: Vec::new(),
        }])
    }
}

/// 影响分析智能体 - 列出受变更影响的服务/模块、风险、规模与后续步骤
pub struct ImpactAnalyzer {
    core: AgentCore,
}

impl ImpactAnalyzer {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self {
            core: AgentCore::new(llm, settings),
        }
    }
}

#[async_trait]
impl PromptAgent for ImpactAnalyzer {
    fn agent_type(&self) -> AgentKind {
        AgentKind::Impact
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are a Senior Digital Architect and Dev Lead assistant. Your audience is engineering leads, architects and program managers.
Given the repository context and a change request, produce a concise impact assessment listing the services/modules affected, the nature of change, risks, estimated size, and concrete next steps for implementation and rollout."#
                .to_string(),

            opening_instruction: "Assess the impact of the change request below.".to_string(),

            closing_instruction: format!(
                r#"Requirements:
- Produce a STRICT JSON array of objects with no surrounding text.
- For each impacted item provide a short, actionable "next_steps" list for engineers and one-line risk statements for stakeholders.
- "level" is one of minor|medium|major; "tshirt" is one of XS|S|M|L|XL|XXL.
- Keep entries brief (max 5 bullets in next_steps). Put high-impact items first.

The output must validate against this JSON schema:
{}"#,
                schema_text::<ImpactAssessment>()
            ),

            llm_call_mode: LLMCallMode::Extract,
        }
    }

    async fn post_process(&self, _query: &str, raw: String) -> String {
        render_structured(&sanitize_structured::<ImpactAssessment>(&raw))
    }

    fn fallback(&self, error: &anyhow::Error) -> String {
        render_structured(&ImpactAssessment::placeholder(&format!(
            "LLM call failed: {}",
            error
        )))
    }
}

#[async_trait]
impl AgentHandler for ImpactAnalyzer {
    async fn generate(&self, query: &str, context: Option<&str>) -> Result<String, AgentError> {
        Ok(self.execute(query, context).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    fn analyzer(llm: Arc<ScriptedModel>) -> ImpactAnalyzer {
        ImpactAnalyzer::new(
            llm,
            AgentSettings {
                model: "impact-model".to_string(),
                temperature: 0.0,
            },
        )
    }

    fn parse(out: &str) -> Vec<ImpactItem> {
        serde_json::from_str::<ImpactAssessment>(out).unwrap().0
    }

    #[tokio::test]
    async fn test_fenced_json_is_normalized() {
        let raw = r#"```json
[{"name":"billing-service","nature":"code","level":"major","tshirt":"L",
  "justification":"owns invoice totals","risks":["double charge"],
  "next_steps":["add migration"],"owners":["payments"],"sources":["src/billing.rs"]}]
```"#;
        let llm = Arc::new(ScriptedModel::replying(raw));
        let out = analyzer(llm).generate("change invoices", None).await.unwrap();

        let items = parse(&out);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "billing-service");
        assert_eq!(items[0].sources, vec!["src/billing.rs"]);
    }

    #[tokio::test]
    async fn test_optional_lists_default_to_empty() {
        let raw = r#"[{"name":"a","nature":"config","level":"minor","tshirt":"XS","justification":"flag"}]"#;
        let llm = Arc::new(ScriptedModel::replying(raw));
        let items = parse(&analyzer(llm).generate("q", None).await.unwrap());
        assert!(items[0].risks.is_empty());
        assert!(items[0].owners.is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_output_becomes_placeholder() {
        let llm = Arc::new(ScriptedModel::replying("The billing service changes a lot."));
        let items = parse(&analyzer(llm).generate("q", None).await.unwrap());

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "unknown");
        assert_eq!(items[0].nature, "The billing service changes a lot.");
        assert_eq!(items[0].level, "unknown");
        assert_eq!(items[0].tshirt, "M");
        assert_eq!(items[0].justification, PARSE_FAILURE_MARKER);
        assert!(items[0].sources.is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_is_placeholder() {
        let llm = Arc::new(ScriptedModel::failing("timeout"));
        let items = parse(&analyzer(llm).generate("q", None).await.unwrap());
        assert_eq!(items[0].justification, PARSE_FAILURE_MARKER);
        assert!(items[0].nature.contains("timeout"));
    }

    #[tokio::test]
    async fn test_prompt_embeds_schema() {
        let llm = Arc::new(ScriptedModel::replying("[]"));
        analyzer(llm.clone()).generate("q", Some("ctx")).await.unwrap();
        let prompt = &llm.requests()[0].user_prompt;
        assert!(prompt.contains("next_steps"));
        assert!(prompt.contains("STRICT JSON array"));
    }
}
