//! 流水线执行器：并行/顺序执行、综合、拼装与补救重试

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::selector::{PipelineDescriptor, Strategy};
use super::status::{AgentStatus, RunPhase, StatusHandle};
use crate::agents::{AgentError, AgentRef};
use crate::config::OrchestratorConfig;
use crate::utils::text::char_len;
use crate::utils::threads::do_parallel_with_limit;

/// 补救结果以此开头时视为无效
const PARSE_FAILURE_PREFIX: &str = "could not parse";

/// 执行参数
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub refinement_retries: u32,
    pub min_response_chars: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            refinement_retries: 2,
            min_response_chars: 20,
        }
    }
}

impl From<&OrchestratorConfig> for ExecutorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            refinement_retries: config.refinement_retries,
            min_response_chars: config.min_response_chars,
        }
    }
}

/// 单个步骤的输出；失败时 output 为可见的错误文本
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub name: String,
    pub output: String,
    pub error: Option<String>,
}

impl StepOutput {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// 一次流水线执行的结果
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub outputs: Vec<StepOutput>,
    pub response: String,
    pub synthesized: bool,
    /// 补救重试实际调用次数
    pub refinement_attempts: u32,
}

pub struct PipelineExecutor {
    settings: ExecutorSettings,
    status: StatusHandle,
}

impl PipelineExecutor {
    pub fn new(settings: ExecutorSettings, status: StatusHandle) -> Self {
        Self { settings, status }
    }

    /// 执行步骤，按需综合，最后在回复过短时补救
    pub async fn execute(
        &self,
        pipeline: &PipelineDescriptor,
        query: &str,
        context: &str,
    ) -> ExecutionOutcome {
        self.status.register_agents(&pipeline.step_names());

        let outputs = match pipeline.strategy {
            Strategy::Parallel => self.run_parallel(&pipeline.steps, query, context).await,
            Strategy::Sequence => self.run_sequence(&pipeline.steps, query, context).await,
        };

        let (mut response, synthesized) = match (&pipeline.synthesizer, pipeline.requires_synthesis)
        {
            (Some(synthesizer), true) => {
                self.status.set_phase(RunPhase::Synthesizing);
                (
                    self.synthesize(synthesizer, query, context, &outputs).await,
                    true,
                )
            }
            _ => (assemble(&outputs), false),
        };

        let mut refinement_attempts = 0;
        if self.needs_refinement(&response)
            && let Some(last) = pipeline.steps.last()
        {
            info!(
                agent = %last.display_name,
                chars = char_len(response.trim()),
                "Response looks incomplete, attempting refinement"
            );
            let (refined, attempts) = self.refine(last, query, context, &outputs).await;
            refinement_attempts = attempts;
            if let Some(refined) = refined {
                response = refined;
            }
        }

        ExecutionOutcome {
            outputs,
            response,
            synthesized,
            refinement_attempts,
        }
    }

    /// 并发执行所有步骤，结果按声明顺序返回
    pub async fn run_parallel(
        &self,
        steps: &[AgentRef],
        query: &str,
        context: &str,
    ) -> Vec<StepOutput> {
        let query: Arc<str> = Arc::from(query);
        let context: Arc<str> = Arc::from(context);

        let futures: Vec<_> = steps
            .iter()
            .cloned()
            .map(|agent| {
                let query = query.clone();
                let context = context.clone();
                let status = self.status.clone();
                async move {
                    status.update_agent(&agent.display_name, AgentStatus::Running, None, None);
                    let result = invoke_guarded(&agent, &query, &context).await;
                    record_parallel(&status, &agent.display_name, result)
                }
            })
            .collect();

        let results = do_parallel_with_limit(futures, steps.len().max(1)).await;

        results
            .into_iter()
            .zip(steps)
            .map(|(result, agent)| match result {
                Ok(output) => output,
                Err(e) => record_parallel(
                    &self.status,
                    &agent.display_name,
                    Err(join_error_message(e)),
                ),
            })
            .collect()
    }

    /// 按声明顺序逐个执行
    pub async fn run_sequence(
        &self,
        steps: &[AgentRef],
        query: &str,
        context: &str,
    ) -> Vec<StepOutput> {
        let mut outputs = Vec::with_capacity(steps.len());

        for agent in steps {
            let name = &agent.display_name;
            self.status
                .update_agent(name, AgentStatus::Running, None, None);
            debug!(agent = %name, "Running sequence step");

            let output = match invoke_guarded(agent, query, context).await {
                Ok(output) => {
                    self.status
                        .update_agent(name, AgentStatus::Done, Some(&output), None);
                    StepOutput {
                        name: name.clone(),
                        output,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(agent = %name, error = %e, "Sequence step failed");
                    let text = format!("Agent error: {}", e);
                    self.status
                        .update_agent(name, AgentStatus::Error, Some(&text), Some(&e));
                    StepOutput {
                        name: name.clone(),
                        output: text,
                        error: Some(e),
                    }
                }
            };
            outputs.push(output);
        }

        outputs
    }

    /// 把各步骤输出交给综合智能体，失败时退化为简单拼接
    pub async fn synthesize(
        &self,
        synthesizer: &AgentRef,
        query: &str,
        context: &str,
        outputs: &[StepOutput],
    ) -> String {
        let combined = format!(
            "{}\n\nAgent outputs:\n{}",
            context,
            outputs
                .iter()
                .map(|o| format!("=={}==\n{}", o.name, o.output))
                .collect::<Vec<_>>()
                .join("\n\n")
        );

        match invoke_guarded(synthesizer, query, &combined).await {
            Ok(response) => {
                self.status
                    .push_log(&synthesizer.display_name, AgentStatus::Done, &response);
                response
            }
            Err(e) => {
                warn!(agent = %synthesizer.display_name, error = %e, "Synthesis failed, concatenating outputs");
                self.status
                    .push_log(&synthesizer.display_name, AgentStatus::Error, &e);
                join_outputs(outputs)
            }
        }
    }

    fn needs_refinement(&self, response: &str) -> bool {
        let trimmed = response.trim();
        trimmed.is_empty() || char_len(trimmed) < self.settings.min_response_chars
    }

    /// 带着前序输出重新调用最后一个步骤。
    /// 首个非空且不以解析失败标记开头的结果被采纳；否则保留最后一次成功返回的结果（为空时不采用）。
    /// 返回结果和实际调用次数。
    pub async fn refine(
        &self,
        last: &AgentRef,
        query: &str,
        context: &str,
        outputs: &[StepOutput],
    ) -> (Option<String>, u32) {
        let augmented = format!(
            "{}\n\nPrevious agent outputs:\n{}",
            context,
            outputs
                .iter()
                .map(|o| o.output.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        );

        let mut last_attempt: Option<String> = None;
        let mut attempts = 0;
        for attempt in 1..=self.settings.refinement_retries {
            attempts = attempt;
            match invoke_guarded(last, query, &augmented).await {
                Ok(candidate) => {
                    let trimmed = candidate.trim();
                    if !trimmed.is_empty()
                        && !trimmed.to_lowercase().starts_with(PARSE_FAILURE_PREFIX)
                    {
                        self.status
                            .push_log(&last.display_name, AgentStatus::Done, &candidate);
                        return (Some(candidate), attempts);
                    }
                    last_attempt = Some(candidate);
                }
                Err(e) => {
                    debug!(agent = %last.display_name, attempt, error = %e, "Refinement attempt failed");
                }
            }
        }

        (last_attempt.filter(|text| !text.is_empty()), attempts)
    }
}

/// 无综合时的拼装：`[名称]\n输出`，按声明顺序
pub fn assemble(outputs: &[StepOutput]) -> String {
    outputs
        .iter()
        .map(|o| format!("[{}]\n{}", o.name, o.output))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn join_outputs(outputs: &[StepOutput]) -> String {
    outputs
        .iter()
        .map(|o| o.output.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn record_parallel(
    status: &StatusHandle,
    name: &str,
    result: Result<String, String>,
) -> StepOutput {
    match result {
        Ok(output) => {
            status.update_agent(name, AgentStatus::Done, Some(&output), None);
            StepOutput {
                name: name.to_string(),
                output,
                error: None,
            }
        }
        Err(e) => {
            warn!(agent = %name, error = %e, "Parallel step failed");
            let text = format!("Agent {} error: {}", name, e);
            status.update_agent(name, AgentStatus::Error, Some(&text), Some(&e));
            StepOutput {
                name: name.to_string(),
                output: text,
                error: Some(e),
            }
        }
    }
}

/// 调用处理器；调用约定不匹配时去掉上下文重试一次
async fn invoke(agent: &AgentRef, query: &str, context: &str) -> Result<String, AgentError> {
    match agent.handler.generate(query, Some(context)).await {
        Err(AgentError::ContextNotSupported) => {
            debug!(agent = %agent.display_name, "Handler rejected context, retrying without it");
            agent.handler.generate(query, None).await
        }
        other => other,
    }
}

/// 同 [`invoke`]，并把panic转换为错误文本
async fn invoke_guarded(agent: &AgentRef, query: &str, context: &str) -> Result<String, String> {
    match AssertUnwindSafe(invoke(agent, query, context))
        .catch_unwind()
        .await
    {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "agent panicked".to_string()
    }
}

fn join_error_message(error: JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic().as_ref())
    } else {
        error.to_string()
    }
}
