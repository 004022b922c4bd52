//! 运行状态侧通道
//!
//! 每次运行持有独立的 [`StatusHandle`]，调用方可在执行过程中轮询快照。
//! 状态只用于观察，不影响运行结果。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::selector::Strategy;
use crate::utils::text::truncate_chars;

/// 默认日志容量
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// 默认输出片段长度
pub const DEFAULT_SNIPPET_CHARS: usize = 400;

/// 运行阶段，只能前进；Failed 可从任一未结束阶段进入
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RunPhase {
    Idle,
    DetectingIntent,
    BuildingContext,
    RunningAgents,
    Synthesizing,
    Finalizing,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RunPhase::Idle => "Idle",
            RunPhase::DetectingIntent => "Detecting intent",
            RunPhase::BuildingContext => "Building RAG context",
            RunPhase::RunningAgents => "Running agents",
            RunPhase::Synthesizing => "Synthesizing final response",
            RunPhase::Finalizing => "Finalizing and persisting chat",
            RunPhase::Done => "Done",
            RunPhase::Failed => "Failed",
        };
        write!(f, "{}", text)
    }
}

/// 单个智能体的执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl AgentStatus {
    fn rank(&self) -> u8 {
        match self {
            AgentStatus::Pending => 0,
            AgentStatus::Running => 1,
            AgentStatus::Done | AgentStatus::Error => 2,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Done => "done",
            AgentStatus::Error => "error",
        };
        write!(f, "{}", text)
    }
}

/// 智能体执行记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentExecutionRecord {
    pub name: String,
    pub status: AgentStatus,
    pub output_snippet: String,
    pub error: Option<String>,
}

/// 日志条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub status: AgentStatus,
    pub output_snippet: String,
}

/// 运行状态快照
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub phase: RunPhase,
    pub strategy: Option<Strategy>,
    pub agents: Vec<AgentExecutionRecord>,
    pub logs: VecDeque<LogEntry>,
    pub updated_at: DateTime<Utc>,
}

impl RunStatus {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: RunPhase::Idle,
            strategy: None,
            agents: Vec::new(),
            logs: VecDeque::new(),
            updated_at: Utc::now(),
        }
    }

    /// 阶段的展示文本，执行阶段附带策略
    pub fn phase_text(&self) -> String {
        match (self.phase, self.strategy) {
            (RunPhase::RunningAgents, Some(strategy)) => {
                format!("{} ({})", self.phase, strategy)
            }
            (phase, _) => phase.to_string(),
        }
    }

    pub fn agent(&self, name: &str) -> Option<&AgentExecutionRecord> {
        self.agents.iter().find(|a| a.name == name)
    }
}

/// 运行状态句柄，可跨任务克隆共享
#[derive(Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<RunStatus>>,
    log_capacity: usize,
    snippet_chars: usize,
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY, DEFAULT_SNIPPET_CHARS)
    }
}

impl StatusHandle {
    pub fn new(log_capacity: usize, snippet_chars: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RunStatus::new())),
            log_capacity: log_capacity.max(1),
            snippet_chars,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RunStatus> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunStatus> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 开始新的运行：生成新的 run_id 并清空所有记录
    pub fn reset(&self) -> Uuid {
        let mut status = self.write();
        *status = RunStatus::new();
        status.run_id
    }

    /// 推进阶段，返回是否被接受
    pub fn set_phase(&self, phase: RunPhase) -> bool {
        let mut status = self.write();
        let accepted = if status.phase.is_terminal() {
            false
        } else {
            phase == RunPhase::Failed || phase > status.phase
        };
        if accepted {
            status.phase = phase;
            status.updated_at = Utc::now();
        }
        accepted
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        let mut status = self.write();
        status.strategy = Some(strategy);
        status.updated_at = Utc::now();
    }

    /// 登记一组智能体为 Pending 并各写一条 pending 日志，已存在的不重复添加
    pub fn register_agents(&self, names: &[String]) {
        let mut status = self.write();
        for name in names {
            if status.agent(name).is_none() {
                status.agents.push(AgentExecutionRecord {
                    name: name.clone(),
                    status: AgentStatus::Pending,
                    output_snippet: String::new(),
                    error: None,
                });
                let entry = LogEntry {
                    timestamp: Utc::now(),
                    agent: name.clone(),
                    status: AgentStatus::Pending,
                    output_snippet: String::new(),
                };
                Self::push_entry(&mut status, entry, self.log_capacity);
            }
        }
        status.updated_at = Utc::now();
    }

    /// 更新智能体状态：不存在则追加，倒退的状态变更被忽略。
    /// 被接受的变更同时写入一条日志。
    pub fn update_agent(
        &self,
        name: &str,
        new_status: AgentStatus,
        output: Option<&str>,
        error: Option<&str>,
    ) -> bool {
        let snippet = output
            .map(|o| truncate_chars(o, self.snippet_chars))
            .unwrap_or_default();

        let mut status = self.write();
        let index = match status.agents.iter().position(|a| a.name == name) {
            Some(index) => index,
            None => {
                status.agents.push(AgentExecutionRecord {
                    name: name.to_string(),
                    status: AgentStatus::Pending,
                    output_snippet: String::new(),
                    error: None,
                });
                status.agents.len() - 1
            }
        };

        let record = &mut status.agents[index];
        if new_status.rank() <= record.status.rank() {
            return false;
        }
        record.status = new_status;
        if output.is_some() {
            record.output_snippet = snippet.clone();
        }
        if let Some(error) = error {
            record.error = Some(error.to_string());
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            agent: name.to_string(),
            status: new_status,
            output_snippet: snippet,
        };
        Self::push_entry(&mut status, entry, self.log_capacity);
        true
    }

    /// 追加一条日志，超出容量时淘汰最旧的条目
    pub fn push_log(&self, agent: &str, agent_status: AgentStatus, output: &str) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            status: agent_status,
            output_snippet: truncate_chars(output, self.snippet_chars),
        };
        let mut status = self.write();
        Self::push_entry(&mut status, entry, self.log_capacity);
    }

    fn push_entry(status: &mut RunStatus, entry: LogEntry, capacity: usize) {
        status.logs.push_back(entry);
        while status.logs.len() > capacity {
            status.logs.pop_front();
        }
        status.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> RunStatus {
        self.read().clone()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.read().logs.iter().cloned().collect()
    }

    pub fn phase(&self) -> RunPhase {
        self.read().phase
    }

    pub fn run_id(&self) -> Uuid {
        self.read().run_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_is_monotonic() {
        let status = StatusHandle::default();
        assert!(status.set_phase(RunPhase::DetectingIntent));
        assert!(status.set_phase(RunPhase::RunningAgents));
        assert!(!status.set_phase(RunPhase::BuildingContext));
        assert_eq!(status.phase(), RunPhase::RunningAgents);

        assert!(status.set_phase(RunPhase::Done));
        assert!(!status.set_phase(RunPhase::Failed));
        assert_eq!(status.phase(), RunPhase::Done);
    }

    #[test]
    fn test_failed_reachable_from_any_open_phase() {
        let status = StatusHandle::default();
        status.set_phase(RunPhase::BuildingContext);
        assert!(status.set_phase(RunPhase::Failed));
        assert!(!status.set_phase(RunPhase::Done));
    }

    #[test]
    fn test_phase_text_includes_strategy() {
        let status = StatusHandle::default();
        status.set_phase(RunPhase::RunningAgents);
        status.set_strategy(Strategy::Parallel);
        assert_eq!(status.snapshot().phase_text(), "Running agents (parallel)");

        status.set_phase(RunPhase::Synthesizing);
        assert_eq!(
            status.snapshot().phase_text(),
            "Synthesizing final response"
        );
    }

    #[test]
    fn test_agent_transitions_are_monotonic() {
        let status = StatusHandle::default();
        status.register_agents(&["A".to_string(), "B".to_string()]);
        status.register_agents(&["A".to_string()]);
        assert_eq!(status.snapshot().agents.len(), 2);

        assert!(status.update_agent("A", AgentStatus::Running, None, None));
        assert!(status.update_agent("A", AgentStatus::Done, Some("result"), None));
        assert!(!status.update_agent("A", AgentStatus::Running, None, None));
        assert!(!status.update_agent("A", AgentStatus::Error, None, Some("late")));

        let snapshot = status.snapshot();
        let a = snapshot.agent("A").unwrap();
        assert_eq!(a.status, AgentStatus::Done);
        assert_eq!(a.output_snippet, "result");
        assert!(a.error.is_none());
        assert_eq!(snapshot.agent("B").unwrap().status, AgentStatus::Pending);
    }

    #[test]
    fn test_register_writes_pending_log_per_agent() {
        let status = StatusHandle::default();
        status.register_agents(&["A".to_string(), "B".to_string()]);
        status.register_agents(&["A".to_string()]);
        status.update_agent("A", AgentStatus::Running, None, None);

        let feed: Vec<_> = status
            .logs()
            .into_iter()
            .map(|l| (l.agent, l.status))
            .collect();
        assert_eq!(
            feed,
            vec![
                ("A".to_string(), AgentStatus::Pending),
                ("B".to_string(), AgentStatus::Pending),
                ("A".to_string(), AgentStatus::Running),
            ]
        );
    }

    #[test]
    fn test_update_unknown_agent_appends() {
        let status = StatusHandle::default();
        assert!(status.update_agent("Late", AgentStatus::Error, None, Some("boom")));
        let snapshot = status.snapshot();
        assert_eq!(snapshot.agents.len(), 1);
        assert_eq!(snapshot.agents[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_snippet_is_truncated() {
        let status = StatusHandle::new(10, 5);
        status.update_agent("A", AgentStatus::Done, Some("0123456789"), None);
        assert_eq!(status.snapshot().agents[0].output_snippet, "01234");
        assert_eq!(status.logs()[0].output_snippet, "01234");
    }

    #[test]
    fn test_ring_buffer_keeps_latest_entries() {
        let status = StatusHandle::new(200, 400);
        for i in 0..250 {
            status.push_log(&format!("agent-{}", i), AgentStatus::Done, "out");
        }

        let logs = status.logs();
        assert_eq!(logs.len(), 200);
        assert_eq!(logs[0].agent, "agent-50");
        assert_eq!(logs[199].agent, "agent-249");
        for (offset, entry) in logs.iter().enumerate() {
            assert_eq!(entry.agent, format!("agent-{}", offset + 50));
        }
    }

    #[test]
    fn test_reset_clears_state_and_changes_run_id() {
        let status = StatusHandle::default();
        let first = status.run_id();
        status.set_phase(RunPhase::Done);
        status.update_agent("A", AgentStatus::Done, Some("x"), None);

        let second = status.reset();
        assert_ne!(first, second);
        let snapshot = status.snapshot();
        assert_eq!(snapshot.phase, RunPhase::Idle);
        assert!(snapshot.agents.is_empty());
        assert!(snapshot.logs.is_empty());
        assert!(snapshot.strategy.is_none());
    }

    #[test]
    fn test_handles_are_isolated() {
        let a = StatusHandle::default();
        let b = StatusHandle::default();
        a.set_phase(RunPhase::Done);
        a.push_log("x", AgentStatus::Done, "y");

        assert_eq!(b.phase(), RunPhase::Idle);
        assert!(b.logs().is_empty());
        assert_ne!(a.run_id(), b.run_id());
    }
}
