use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::AgentKind;
use crate::config::AgentSettings;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::utils::text::truncate_chars;

/// 上下文为空时写入提示词的占位文本
pub const EMPTY_CONTEXT: &str = "No context";

/// LLM调用方式配置
#[derive(Debug, Clone, PartialEq)]
pub enum LLMCallMode {
    /// 要求返回符合特定结构的JSON
    Extract,
    /// 返回自由文本
    Prompt,
}

/// Prompt模板配置
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// 系统提示词
    pub system_prompt: String,
    /// 开头的说明性指令
    pub opening_instruction: String,
    /// 结尾的强调性指令
    pub closing_instruction: String,
    /// LLM调用方式
    pub llm_call_mode: LLMCallMode,
}

/// 智能体共享的运行时依赖：LLM与解析后的模型参数
#[derive(Clone)]
pub struct AgentCore {
    pub llm: Arc<dyn LanguageModel>,
    pub settings: AgentSettings,
}

impl AgentCore {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self { llm, settings }
    }
}

/// 基于提示词模板的智能体。实现方提供模板、后处理与失败降级文本，
/// 调用流程由 [`PromptAgent::execute`] 统一完成。
#[async_trait]
pub trait PromptAgent: Send + Sync {
    fn agent_type(&self) -> AgentKind;

    fn core(&self) -> &AgentCore;

    fn prompt_template(&self) -> PromptTemplate;

    /// 写入提示词的上下文最大字符数
    fn context_limit(&self) -> Option<usize> {
        None
    }

    /// 组装用户提示词
    fn build_prompt(&self, query: &str, context: Option<&str>) -> String {
        let template = self.prompt_template();
        let context = match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => match self.context_limit() {
                Some(limit) => truncate_chars(c, limit),
                None => c.to_string(),
            },
            None => EMPTY_CONTEXT.to_string(),
        };

        format!(
            "{}\n\nContext:\n{}\n\nRequest:\n{}\n\n{}",
            template.opening_instruction.trim(),
            context,
            query.trim(),
            template.closing_instruction.trim()
        )
    }

    /// 对模型原始输出进行后处理
    async fn post_process(&self, _query: &str, raw: String) -> String {
        raw
    }

    /// LLM调用失败时返回的降级文本
    fn fallback(&self, error: &anyhow::Error) -> String;

    /// 执行一次完整调用，从不返回错误
    async fn execute(&self, query: &str, context: Option<&str>) -> String {
        let template = self.prompt_template();
        let core = self.core();
        let request = CompletionRequest {
            model: core.settings.model.clone(),
            temperature: core.settings.temperature,
            system_prompt: template.system_prompt,
            user_prompt: self.build_prompt(query, context),
        };

        debug!(
            agent = self.agent_type().display_name(),
            model = %request.model,
            mode = ?template.llm_call_mode,
            "Invoking agent"
        );

        match core.llm.complete(request).await {
            Ok(raw) => self.post_process(query, raw).await,
            Err(e) => {
                warn!(agent = self.agent_type().display_name(), error = %e, "Agent LLM call failed");
                self.fallback(&e)
            }
        }
    }
}
