use crate::{NodeId, Payload, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ExecutionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry of an execution's persisted log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            node_id: None,
            connector: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn for_node(mut self, node_id: impl Into<NodeId>, connector: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self.connector = Some(connector.into());
        self
    }
}

/// Persisted execution record. `logs` and `results` hold serialized JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub results: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl WorkflowExecution {
    /// Fresh `running` record with empty logs and results
    pub fn start(workflow_id: impl Into<WorkflowId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            logs: "[]".to_string(),
            results: "{}".to_string(),
            error_message: None,
        }
    }

    /// Move to a terminal status at `end_time`. Clock skew never yields a negative duration.
    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        error_message: Option<String>,
        end_time: DateTime<Utc>,
    ) {
        let elapsed = (end_time - self.start_time).num_milliseconds().max(0);
        self.status = status;
        self.end_time = Some(end_time);
        self.duration_ms = Some(elapsed as u64);
        self.error_message = error_message;
    }

    pub fn decoded_logs(&self) -> Vec<LogEntry> {
        decode_logs(&self.logs)
    }

    pub fn decoded_results(&self) -> Payload {
        decode_results(&self.results)
    }

    pub fn view(&self) -> ExecutionView {
        ExecutionView {
            id: self.id,
            workflow_id: self.workflow_id.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: self.duration_ms,
            logs: self.decoded_logs(),
            results: self.decoded_results(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Execution record with logs and results decoded, as returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionView {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub logs: Vec<LogEntry>,
    pub results: Payload,
    pub error_message: Option<String>,
}

pub fn encode_logs(entries: &[LogEntry]) -> Result<String, serde_json::Error> {
    serde_json::to_string(entries)
}

pub fn encode_results(results: &Payload) -> Result<String, serde_json::Error> {
    serde_json::to_string(results)
}

/// Empty or unreadable text decodes to an empty list.
pub fn decode_logs(raw: &str) -> Vec<LogEntry> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Discarding unreadable execution logs");
        Vec::new()
    })
}

/// Empty or unreadable text decodes to an empty map.
pub fn decode_results(raw: &str) -> Payload {
    if raw.trim().is_empty() {
        return Payload::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Discarding unreadable execution results");
        Payload::new()
    })
}
