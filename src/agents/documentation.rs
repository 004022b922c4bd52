use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::prompt_agent::{AgentCore, LLMCallMode, PromptAgent, PromptTemplate};
use super::{AgentError, AgentHandler, AgentKind};
use crate::config::AgentSettings;
use crate::llm::LanguageModel;
use crate::utils::text::truncate_chars;

/// 文档提示词中的上下文上限
pub const DOC_CONTEXT_CHARS: usize = 6000;

/// 返回结果中附带的文档预览长度
pub const DOC_PREVIEW_CHARS: usize = 2000;

/// 文档生成智能体 - 输出结构化markdown，配置了输出目录时落盘
pub struct DocGenerator {
    core: AgentCore,
    output_dir: Option<PathBuf>,
}

impl DocGenerator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        settings: AgentSettings,
        output_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            core: AgentCore::new(llm, settings),
            output_dir,
        }
    }

    /// 写入 `doc_YYYYmmdd_HHMMSS.md`，同一秒内重复生成时追加序号
    async fn save_document(&self, dir: &Path, text: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .context(format!("Failed to create docs directory {:?}", dir))?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut path = dir.join(format!("doc_{}.md", stamp));
        let mut suffix = 1;
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            path = dir.join(format!("doc_{}_{}.md", stamp, suffix));
            suffix += 1;
        }

        let content = format!("# Generated Documentation\n\n{}", text);
        tokio::fs::write(&path, content)
            .await
            .context(format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

#[async_trait]
impl PromptAgent for DocGenerator {
    fn agent_type(&self) -> AgentKind {
        AgentKind::Documentation
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt:
                "You are a senior solution architect and technical writer. Write clean, structured markdown documentation."
                    .to_string(),

            opening_instruction:
                "Write documentation for the request below, based on the codebase context retrieved for it."
                    .to_string(),

            closing_instruction: r#"Structure your output with these sections:
- Overview
- Components or Modules
- APIs or Interfaces (if any)
- Dependencies / Integrations
- Example / Usage
- Recommendations"#
                .to_string(),

            llm_call_mode: LLMCallMode::Prompt,
        }
    }

    fn context_limit(&self) -> Option<usize> {
        Some(DOC_CONTEXT_CHARS)
    }

    async fn post_process(&self, _query: &str, raw: String) -> String {
        let Some(dir) = &self.output_dir else {
            return raw;
        };

        match self.save_document(dir, &raw).await {
            Ok(path) => {
                info!(path = %path.display(), "Documentation saved");
                format!(
                    "Documentation generated successfully: {}\n\n{}",
                    path.display(),
                    truncate_chars(&raw, DOC_PREVIEW_CHARS)
                )
            }
            Err(e) => {
                warn!(error = %e, "Failed to save documentation");
                format!("Documentation generation failed: {:#}", e)
            }
        }
    }

    fn fallback(&self, error: &anyhow::Error) -> String {
        format!("Documentation generation failed: {}", error)
    }
}

#[async_trait]
impl AgentHandler for DocGenerator {
    async fn generate(&self, query: &str, context: Option<&str>) -> Result<String, AgentError> {
        Ok(self.execute(query, context).await)
    }
}
