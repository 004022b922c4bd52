//! LLM接入层 - 对外暴露统一的补全接口，便于在编排器与智能体中替换实现

use anyhow::Result;
use async_trait::async_trait;

pub mod client;

pub use client::LLMClient;

/// 单次补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// 模型标识
    pub model: String,
    /// 采样温度
    pub temperature: f64,
    /// 系统提示词
    pub system_prompt: String,
    /// 用户提示词
    pub user_prompt: String,
}

/// 语言模型抽象，智能体只依赖这个接口
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[cfg(test)]
pub mod testing;
