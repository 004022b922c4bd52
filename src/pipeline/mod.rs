//! 意图识别、流水线选择、执行与运行状态

pub mod executor;
pub mod intent;
pub mod selector;
pub mod status;

pub use executor::{ExecutionOutcome, ExecutorSettings, PipelineExecutor, StepOutput};
pub use intent::{Intent, IntentAssessment, IntentDetector, KeywordClassifier};
pub use selector::{PipelineDescriptor, PipelinePlan, PipelineSelector, Strategy};
pub use status::{AgentExecutionRecord, AgentStatus, LogEntry, RunPhase, RunStatus, StatusHandle};
