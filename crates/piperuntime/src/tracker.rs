use chrono::Utc;
use pipecore::execution::{encode_logs, encode_results};
use pipecore::{
    ExecutionId, ExecutionStatus, ExecutionView, FlowError, LogEntry, LogLevel, Payload,
    RecordStore, StoreError, WorkflowExecution,
};
use std::sync::Arc;

/// Persists execution records and answers status queries.
///
/// Writes after creation are best-effort: a failing store is reported
/// through `tracing` and never aborts the run.
#[derive(Clone)]
pub struct ExecutionTracker {
    store: Arc<dyn RecordStore>,
}

impl ExecutionTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Create and persist a `running` record for `workflow_id`
    pub async fn create(&self, workflow_id: &str) -> Result<WorkflowExecution, FlowError> {
        let execution = WorkflowExecution::start(workflow_id);
        self.store.insert_execution(&execution).await?;
        tracing::debug!(execution_id = %execution.id, workflow_id, "Execution record created");
        Ok(execution)
    }

    /// Replace the persisted log with `entries`
    pub async fn append_log(&self, execution_id: ExecutionId, entries: &[LogEntry]) {
        let logs = match encode_logs(entries) {
            Ok(logs) => logs,
            Err(e) => {
                tracing::error!(%execution_id, error = %e, "Failed to encode execution logs");
                return;
            }
        };

        let result = async {
            let mut execution = self.store.get_execution(execution_id).await?;
            execution.logs = logs;
            self.store.update_execution(&execution).await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(%execution_id, error = %e, "Failed to persist execution logs");
        }
    }

    /// Move the record to a terminal status, stamping end time and duration.
    ///
    /// Returns the stored record, or `None` when it could not be written.
    pub async fn finalize(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        error_message: Option<String>,
        results: Option<&Payload>,
    ) -> Option<WorkflowExecution> {
        let mut execution = match self.store.get_execution(execution_id).await {
            Ok(execution) => execution,
            Err(e) => {
                tracing::error!(%execution_id, error = %e, "Failed to load execution for update");
                return None;
            }
        };

        execution.finish(status, error_message, Utc::now());
        if let Some(results) = results {
            match encode_results(results) {
                Ok(encoded) => execution.results = encoded,
                Err(e) => {
                    tracing::error!(%execution_id, error = %e, "Failed to encode execution results")
                }
            }
        }

        match self.store.update_execution(&execution).await {
            Ok(()) => Some(execution),
            Err(e) => {
                tracing::error!(%execution_id, error = %e, "Failed to update execution status");
                None
            }
        }
    }

    /// Decoded view of an execution record
    pub async fn get_status(&self, execution_id: ExecutionId) -> Result<ExecutionView, FlowError> {
        match self.store.get_execution(execution_id).await {
            Ok(execution) => Ok(execution.view()),
            Err(StoreError::NotFound { .. }) => {
                Err(FlowError::ExecutionNotFound(execution_id.to_string()))
            }
            Err(e) => Err(FlowError::Store(e)),
        }
    }
}

/// In-progress execution log that is persisted after every entry.
pub struct ExecutionLog {
    tracker: ExecutionTracker,
    execution_id: ExecutionId,
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new(tracker: ExecutionTracker, execution_id: ExecutionId) -> Self {
        Self {
            tracker,
            execution_id,
            entries: Vec::new(),
        }
    }

    pub async fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
        self.tracker
            .append_log(self.execution_id, &self.entries)
            .await;
    }

    pub async fn info(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(LogLevel::Info, message)).await;
    }

    pub async fn warn(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(LogLevel::Warn, message)).await;
    }

    pub async fn error(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(LogLevel::Error, message)).await;
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}
