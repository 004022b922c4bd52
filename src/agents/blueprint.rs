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

/// 方案中的组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BlueprintComponent {
    pub name: String,
    #[serde(default)]
    pub solution_description: String,
    /// API/事件/主题/接口说明
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// 数据结构与迁移说明
    #[serde(default)]
    pub data_changes: Vec<String>,
    #[serde(default)]
    pub notes: String,
    /// XS|S|M|L|XL|XXL
    #[serde(default)]
    pub estimated_effort: String,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub risk_mitigation: Vec<String>,
}

/// 可落地的技术方案蓝图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Blueprint {
    pub title: String,
    #[serde(rename = "originalRequirement", default)]
    pub original_requirement: String,
    /// 面向干系人的一句话摘要
    pub summary: String,
    pub components: Vec<BlueprintComponent>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub testing_strategy: Vec<String>,
    #[serde(default)]
    pub deployment_plan: Vec<String>,
    #[serde(default)]
    pub observability: Vec<String>,
    #[serde(default)]
    pub rollback_plan: String,
    #[serde(default)]
    pub estimated_overall_effort: String,
    /// 解析失败时保留的模型原始输出
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl StructuredOutput for Blueprint {
    fn placeholder(raw: &str) -> Self {
        Blueprint {
            title: "unknown".to_string(),
            original_requirement: String::new(),
            summary: PARSE_FAILURE_MARKER.to_string(),
            components: Vec::new(),
            patterns: Vec::new(),
            testing_strategy: Vec::new(),
            deployment_plan: Vec::new(),
            observability: Vec::new(),
            rollback_plan: String::new(),
            estimated_overall_effort: String::new(),
            raw_output: Some(raw.to_string()),
        }
    }
}

/// 方案蓝图智能体，同时作为并行流水线的综合器
pub struct BlueprintGenerator {
    core: AgentCore,
}

impl BlueprintGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self {
            core: AgentCore::new(llm, settings),
        }
    }
}

#[async_trait]
impl PromptAgent for BlueprintGenerator {
    fn agent_type(&self) -> AgentKind {
        AgentKind::Blueprint
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are a Senior Digital Architect producing an actionable blueprint for engineering teams and program managers. Target audience: architects, tech leads, and dev leads.
Using the provided context and request, produce a STRICT JSON blueprint that is implementation-ready. Be specific about components, interfaces, data changes, migration steps, testing strategy, deployment plan and observability."#
                .to_string(),

            opening_instruction: "Design a blueprint for the request below.".to_string(),

            closing_instruction: format!(
                r#"Notes:
- Return STRICT JSON only, no surrounding commentary.
- Copy the user request verbatim into "originalRequirement".
- Keep component descriptions concise but precise (include required interfaces and data changes).
- Provide migration steps where schema or contract changes are required.
- Include testing and observability actions so teams can validate rollout.
- Effort values are one of XS|S|M|L|XL|XXL.

The output must validate against this JSON schema:
{}"#,
                schema_text::<Blueprint>()
            ),

            llm_call_mode: LLMCallMode::Extract,
        }
    }

    async fn post_process(&self, query: &str, raw: String) -> String {
        let mut blueprint = sanitize_structured::<Blueprint>(&raw);
        if blueprint.original_requirement.trim().is_empty() {
            blueprint.original_requirement = query.trim().to_string();
        }
        render_structured(&blueprint)
    }

    fn fallback(&self, error: &anyhow::Error) -> String {
        render_structured(&Blueprint::placeholder(&format!("LLM call failed: {}", error)))
    }
}

#[async_trait]
impl AgentHandler for BlueprintGenerator {
    async fn generate(&self, query: &str, context: Option<&str>) -> Result<String, AgentError> {
        Ok(self.execute(query, context).await)
    }
}
