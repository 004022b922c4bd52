//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LLMConfig;
use crate::llm::{CompletionRequest, LanguageModel};

mod providers;

use providers::ProviderClient;

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { client, config })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        println!("🔄 正在检查模型连接...");
        let request = CompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            system_prompt: "You are a helpful assistant.".to_string(),
            user_prompt: "Hello".to_string(),
        };
        match self.complete(request).await {
            Ok(_) => {
                println!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                eprintln!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        attempt = retries,
                        max_retries,
                        error = %err,
                        "LLM call failed"
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms * retries as u64))
                        .await;
                }
            }
        }
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let agent = self.client.create_agent(
            &request.model,
            &request.system_prompt,
            request.temperature,
            &self.config,
        )?;
        let timeout = Duration::from_secs(self.config.timeout_seconds.max(1));

        info!(
            provider = %self.config.provider,
            model = %request.model,
            prompt_chars = request.user_prompt.chars().count(),
            "Sending completion request"
        );

        self.retry_with_backoff(|| async {
            match tokio::time::timeout(timeout, agent.prompt(&request.user_prompt)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "LLM call timed out after {} seconds",
                    timeout.as_secs()
                )),
            }
        })
        .await
    }
}
