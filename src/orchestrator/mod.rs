//! 编排器：意图识别 -> 构建上下文 -> 执行流水线 -> 持久化
//!
//! [`Orchestrator::run`] 总是返回 [`RunResult`]，任何未处理的错误或panic
//! 都被转换为统一的错误结果。

use anyhow::{Context, Result, bail};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};

use crate::agents::{AgentRegistry, RequirementsAnalyzer};
use crate::config::Config;
use crate::llm::LanguageModel;
use crate::pipeline::executor::panic_message;
use crate::pipeline::{
    ExecutorSettings, IntentDetector, KeywordClassifier, PipelineExecutor, PipelineSelector,
    RunPhase, StatusHandle,
};
use crate::retrieval::{ContextBuilder, VectorIndex};
use crate::storage::ChatStore;

/// 错误结果中使用的智能体名称
pub const ERROR_AGENT: &str = "error";

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub chat_id: Option<i64>,
    /// 逗号拼接的步骤名称
    pub agent: String,
    pub response: String,
}

impl RunResult {
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            chat_id: None,
            agent: ERROR_AGENT.to_string(),
            response: format!("Agent error: {}", message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.chat_id.is_none() && self.agent == ERROR_AGENT
    }
}

/// 编排参数
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub top_k: usize,
    pub status_log_capacity: usize,
    pub snippet_chars: usize,
    pub executor: ExecutorSettings,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            status_log_capacity: config.orchestrator.status_log_capacity,
            snippet_chars: config.orchestrator.snippet_chars,
            executor: ExecutorSettings::from(&config.orchestrator),
        }
    }
}

pub struct Orchestrator {
    detector: Arc<dyn IntentDetector>,
    context_builder: ContextBuilder,
    selector: PipelineSelector,
    store: Arc<dyn ChatStore>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        detector: Arc<dyn IntentDetector>,
        context_builder: ContextBuilder,
        registry: AgentRegistry,
        store: Arc<dyn ChatStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            detector,
            context_builder,
            selector: PipelineSelector::new(registry),
            store,
            settings,
        }
    }

    /// 按配置装配内置智能体与意图识别器
    pub fn from_config(
        config: &Config,
        llm: Arc<dyn LanguageModel>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        let detector: Arc<dyn IntentDetector> = if config.orchestrator.llm_intent_detection {
            Arc::new(RequirementsAnalyzer::new(
                llm.clone(),
                config.agents.requirement_agent.resolve(&config.llm),
            ))
        } else {
            Arc::new(KeywordClassifier)
        };

        Self::new(
            detector,
            ContextBuilder::new(index, config.retrieval.max_context_chars),
            AgentRegistry::from_config(config, llm),
            store,
            OrchestratorSettings::from(config),
        )
    }

    /// 为一次运行创建独立的状态句柄
    pub fn new_status(&self) -> StatusHandle {
        StatusHandle::new(
            self.settings.status_log_capacity,
            self.settings.snippet_chars,
        )
    }

    pub async fn run(&self, input: &str) -> RunResult {
        let status = self.new_status();
        self.run_with_status(input, &status).await
    }

    /// 使用调用方提供的状态句柄执行，调用方可在运行期间轮询
    pub async fn run_with_status(&self, input: &str, status: &StatusHandle) -> RunResult {
        let run_id = status.reset();

        let outcome = AssertUnwindSafe(self.run_pipeline(input, status))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                error!(%run_id, error = %message, "Run failed");
                status.set_phase(RunPhase::Failed);
                RunResult::error(message)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%run_id, error = %message, "Run panicked");
                status.set_phase(RunPhase::Failed);
                RunResult::error(message)
            }
        }
    }

    /// SQLite写入是同步阻塞调用，放到阻塞线程池中执行
    async fn persist(&self, query: &str, agent_name: &str, response: &str) -> Result<i64> {
        let store = self.store.clone();
        let (query, agent_name, response) =
            (query.to_string(), agent_name.to_string(), response.to_string());

        let chat_id = tokio::task::spawn_blocking(move || {
            store.add_chat(&query, &agent_name, &response)
        })
        .await
        .context("Chat persistence task failed")?
        .context("Failed to persist chat")?;
        Ok(chat_id)
    }

    async fn run_pipeline(&self, input: &str, status: &StatusHandle) -> Result<RunResult> {
        if input.trim().is_empty() {
            bail!("query must not be empty");
        }

        status.set_phase(RunPhase::DetectingIntent);
        let assessment = self.detector.detect(input).await;
        info!(intent = %assessment.intent, summary = ?assessment.summary, "Intent detected");

        status.set_phase(RunPhase::BuildingContext);
        let (context, doc_count) = self
            .context_builder
            .build(input, self.settings.top_k)
            .await;
        info!(doc_count, "Context ready");

        let pipeline = self.selector.select(assessment.intent, input)?;
        let agent_name = pipeline.joined_names();

        status.set_strategy(pipeline.strategy);
        status.set_phase(RunPhase::RunningAgents);
        info!(
            strategy = %pipeline.strategy,
            agents = %agent_name,
            synthesis = pipeline.requires_synthesis,
            "Running pipeline"
        );

        let executor = PipelineExecutor::new(self.settings.executor, status.clone());
        let outcome = executor.execute(&pipeline, input, &context).await;

        status.set_phase(RunPhase::Finalizing);
        let chat_id = self.persist(input, &agent_name, &outcome.response).await?;
        info!(chat_id, "Chat saved");

        status.set_phase(RunPhase::Done);
        Ok(RunResult {
            chat_id: Some(chat_id),
            agent: agent_name,
            response: outcome.response,
        })
    }
}
