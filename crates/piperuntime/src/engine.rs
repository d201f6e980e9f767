use crate::config::EngineConfig;
use crate::executor::{GraphExecutor, RunContext, Traversal};
use crate::graph::build_graph;
use crate::registry::ConnectorRegistry;
use crate::tracker::{ExecutionLog, ExecutionTracker};
use chrono::Utc;
use pipecore::{
    ConnectorDescriptor, EventBus, ExecutionEvent, ExecutionId, ExecutionStatus, ExecutionView,
    FlowError, Payload, RecordStore, StoreError, WorkflowExecution, WorkflowId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How an execution was started
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Manual,
    /// The payload is recorded on the execution log but not passed to nodes
    Webhook { payload: Payload },
}

#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub workflow_id: WorkflowId,
    /// Identity of the caller, made available to connectors
    pub caller: Option<String>,
    pub trigger: Trigger,
}

impl ExecuteRequest {
    pub fn manual(workflow_id: impl Into<WorkflowId>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            caller: None,
            trigger: Trigger::Manual,
        }
    }

    pub fn webhook(workflow_id: impl Into<WorkflowId>, payload: Payload) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            caller: None,
            trigger: Trigger::Webhook { payload },
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// Final outcome of a background execution
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    /// Destination outputs keyed by node id
    pub results: Payload,
    pub error: Option<String>,
    /// Nodes in the order they executed
    pub executed: Vec<String>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Returned immediately by [`WorkflowEngine::execute_workflow`]
pub struct ExecutionHandle {
    /// The record as first persisted, with status `running`
    pub execution: WorkflowExecution,
    join: JoinHandle<ExecutionReport>,
    cancellation: CancellationToken,
}

impl ExecutionHandle {
    pub fn id(&self) -> ExecutionId {
        self.execution.id
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Wait for the background task to finish
    pub async fn wait(self) -> ExecutionReport {
        let execution_id = self.execution.id;
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(%execution_id, "Execution task aborted: {}", e);
                ExecutionReport {
                    execution_id,
                    status: ExecutionStatus::Failed,
                    results: Payload::new(),
                    error: Some(format!("execution task aborted: {}", e)),
                    executed: Vec::new(),
                }
            }
        }
    }
}

struct EngineInner {
    registry: Arc<ConnectorRegistry>,
    store: Arc<dyn RecordStore>,
    tracker: ExecutionTracker,
    executor: GraphExecutor,
    events: EventBus,
    running: Mutex<HashMap<ExecutionId, CancellationToken>>,
}

/// Entry point for running workflows in the background.
///
/// Cheap to clone; clones share the registry, store and event bus.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        store: Arc<dyn RecordStore>,
        config: EngineConfig,
    ) -> Self {
        let events = EventBus::new(config.event_buffer_size);
        let executor = GraphExecutor::new(
            registry.clone(),
            store.clone(),
            events.clone(),
            config.node_timeout,
        );

        Self {
            inner: Arc::new(EngineInner {
                registry,
                tracker: ExecutionTracker::new(store.clone()),
                store,
                executor,
                events,
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.store
    }

    /// Create a tracked execution record and run the workflow in a background task.
    ///
    /// Only failing to create the record is reported here; everything else
    /// ends up on the execution record.
    pub async fn execute_workflow(
        &self,
        request: ExecuteRequest,
    ) -> Result<ExecutionHandle, FlowError> {
        let execution = self.inner.tracker.create(&request.workflow_id).await?;
        let cancellation = CancellationToken::new();

        self.inner
            .running
            .lock()
            .await
            .insert(execution.id, cancellation.clone());

        tracing::info!(
            execution_id = %execution.id,
            workflow_id = %request.workflow_id,
            "Workflow execution accepted"
        );

        let inner = self.inner.clone();
        let run = RunContext {
            execution_id: execution.id,
            workflow_id: request.workflow_id.clone(),
            user: request.caller.clone(),
            cancellation: cancellation.clone(),
        };
        let join = tokio::spawn(async move { run_execution(inner, request, run).await });

        Ok(ExecutionHandle {
            execution,
            join,
            cancellation,
        })
    }

    pub async fn get_status(&self, execution_id: ExecutionId) -> Result<ExecutionView, FlowError> {
        self.inner.tracker.get_status(execution_id).await
    }

    /// Request cancellation of a running execution. Returns false when it is not running.
    pub async fn cancel(&self, execution_id: ExecutionId) -> bool {
        match self.inner.running.lock().await.get(&execution_id) {
            Some(token) => {
                tracing::info!(%execution_id, "Cancelling execution");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn running_executions(&self) -> Vec<ExecutionId> {
        self.inner.running.lock().await.keys().copied().collect()
    }

    pub fn connector_catalog(&self) -> Vec<ConnectorDescriptor> {
        self.inner.registry.catalog()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.inner.events.subscribe()
    }
}

async fn run_execution(
    inner: Arc<EngineInner>,
    request: ExecuteRequest,
    run: RunContext,
) -> ExecutionReport {
    let execution_id = run.execution_id;
    let mut log = ExecutionLog::new(inner.tracker.clone(), execution_id);
    let mut traversal = Traversal::default();

    inner.events.emit(ExecutionEvent::ExecutionStarted {
        execution_id,
        workflow_id: run.workflow_id.clone(),
        timestamp: Utc::now(),
    });
    tracing::info!(%execution_id, workflow_id = %run.workflow_id, "Starting workflow execution");
    log.info("Starting workflow execution").await;
    if let Trigger::Webhook { payload } = &request.trigger {
        log.info(format!(
            "Triggered by webhook with {} payload keys",
            payload.len()
        ))
        .await;
    }

    let outcome = drive(&inner, &run, &mut log, &mut traversal).await;

    let (status, error) = match &outcome {
        Ok(()) => {
            tracing::info!(%execution_id, "Workflow execution completed successfully");
            log.info("Workflow execution completed successfully").await;
            (ExecutionStatus::Completed, None)
        }
        Err(e) => {
            tracing::error!(%execution_id, error = %e, "Workflow execution failed");
            log.error(format!("Workflow execution failed: {}", e)).await;
            (ExecutionStatus::Failed, Some(e.to_string()))
        }
    };

    let stored = inner
        .tracker
        .finalize(execution_id, status, error.clone(), Some(&traversal.results))
        .await;

    inner.running.lock().await.remove(&execution_id);

    inner.events.emit(ExecutionEvent::ExecutionFinished {
        execution_id,
        success: outcome.is_ok(),
        duration_ms: stored.and_then(|e| e.duration_ms).unwrap_or(0),
        error: error.clone(),
        timestamp: Utc::now(),
    });

    ExecutionReport {
        execution_id,
        status,
        results: traversal.results,
        error,
        executed: traversal.executed,
    }
}

/// Load the workflow definition, build its graph and walk it.
async fn drive(
    inner: &EngineInner,
    run: &RunContext,
    log: &mut ExecutionLog,
    traversal: &mut Traversal,
) -> Result<(), FlowError> {
    let workflow_id = run.workflow_id.as_str();

    let workflow = match inner.store.get_workflow(workflow_id).await {
        Ok(workflow) => workflow,
        Err(StoreError::NotFound { .. }) => {
            return Err(FlowError::WorkflowNotFound(workflow_id.to_string()))
        }
        Err(e) => return Err(FlowError::Store(e)),
    };
    if !workflow.active {
        return Err(FlowError::WorkflowInactive(workflow_id.to_string()));
    }
    log.info(format!("Workflow loaded: {}", workflow.name)).await;

    let nodes = inner
        .store
        .list_nodes(workflow_id)
        .await
        .map_err(FlowError::NodeLoadFailure)?;
    log.info(format!("Loaded {} nodes", nodes.len())).await;

    let connections = inner
        .store
        .list_connections(workflow_id)
        .await
        .map_err(FlowError::ConnectionLoadFailure)?;
    log.info(format!("Loaded {} connections", connections.len()))
        .await;

    let graph = build_graph(&nodes, &connections)?;
    log.info("Execution graph built").await;

    if run.cancellation.is_cancelled() {
        return Err(FlowError::Cancelled);
    }

    inner.executor.run(&graph, run, log, traversal).await
}
