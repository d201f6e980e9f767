use crate::graph::ExecutionGraph;
use crate::registry::ConnectorRegistry;
use crate::tracker::ExecutionLog;
use chrono::Utc;
use petgraph::graph::NodeIndex;
use pipecore::{
    Connector, ConnectorContext, ConnectorError, EventBus, ExecutionEvent, ExecutionId,
    FlowError, LogEntry, LogLevel, NodeCategory, NodeId, Payload, RecordStore, WorkflowId,
};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Identity and control of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub user: Option<String>,
    pub cancellation: CancellationToken,
}

/// What a traversal produced so far. Survives a failed run.
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    /// Output of every node that finished
    pub outputs: HashMap<NodeId, Payload>,
    /// Destination outputs keyed by node id
    pub results: Payload,
    /// Nodes in the order they executed
    pub executed: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Queued,
    Executing,
    Done,
    Failed,
}

/// Walks an execution graph with a FIFO worklist, one node at a time.
pub struct GraphExecutor {
    registry: Arc<ConnectorRegistry>,
    store: Arc<dyn RecordStore>,
    events: EventBus,
    node_timeout: Option<Duration>,
}

impl GraphExecutor {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        store: Arc<dyn RecordStore>,
        events: EventBus,
        node_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            node_timeout,
        }
    }

    /// Execute every node reachable from the root sources.
    ///
    /// The first error aborts the traversal; whatever finished before it
    /// stays in `traversal`.
    pub async fn run(
        &self,
        graph: &ExecutionGraph,
        run: &RunContext,
        log: &mut ExecutionLog,
        traversal: &mut Traversal,
    ) -> Result<(), FlowError> {
        let mut state = vec![NodeState::Pending; graph.len()];
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        let roots = graph.roots();
        if roots.is_empty() {
            log.warn("No source nodes without inputs; nothing to execute")
                .await;
        }
        for idx in roots {
            state[idx.index()] = NodeState::Queued;
            queue.push_back(idx);
        }

        while let Some(idx) = queue.pop_front() {
            if state[idx.index()] != NodeState::Queued {
                continue;
            }
            if run.cancellation.is_cancelled() {
                return Err(FlowError::Cancelled);
            }

            let node = graph.node(idx);
            let input = self.collect_input(graph, idx, traversal);

            state[idx.index()] = NodeState::Executing;
            match self.execute_node(graph, idx, input, run, log).await {
                Ok(output) => {
                    state[idx.index()] = NodeState::Done;
                    if node.category == NodeCategory::Destination {
                        traversal
                            .results
                            .insert(node.id.clone(), serde_json::Value::Object(output.clone()));
                    }
                    traversal.outputs.insert(node.id.clone(), output);
                    traversal.executed.push(node.id.clone());
                }
                Err(e) => {
                    state[idx.index()] = NodeState::Failed;
                    return Err(e);
                }
            }

            for next in graph.successors(idx) {
                if state[next.index()] != NodeState::Pending {
                    continue;
                }
                let ready = graph
                    .predecessors(next)
                    .iter()
                    .all(|p| state[p.index()] == NodeState::Done);
                if ready {
                    state[next.index()] = NodeState::Queued;
                    queue.push_back(next);
                }
            }
        }

        Ok(())
    }

    /// Roots get an empty map, single-input nodes their predecessor's output,
    /// fan-in nodes a map keyed by predecessor id.
    fn collect_input(&self, graph: &ExecutionGraph, idx: NodeIndex, traversal: &Traversal) -> Payload {
        let preds = graph.predecessors(idx);
        match preds.as_slice() {
            [] => Payload::new(),
            [only] => traversal
                .outputs
                .get(&graph.node(*only).id)
                .cloned()
                .unwrap_or_default(),
            many => many
                .iter()
                .map(|p| {
                    let id = graph.node(*p).id.clone();
                    let output = traversal.outputs.get(&id).cloned().unwrap_or_default();
                    (id, serde_json::Value::Object(output))
                })
                .collect(),
        }
    }

    async fn execute_node(
        &self,
        graph: &ExecutionGraph,
        idx: NodeIndex,
        input: Payload,
        run: &RunContext,
        log: &mut ExecutionLog,
    ) -> Result<Payload, FlowError> {
        let node = graph.node(idx);
        let kind = node.connector_kind.as_str();
        let display = if node.label.is_empty() { node.id.as_str() } else { node.label.as_str() };

        tracing::info!(
            execution_id = %run.execution_id,
            node_id = %node.id,
            connector = kind,
            "Executing node"
        );
        log.push(
            LogEntry::new(LogLevel::Info, format!("Executing node {} ({})", display, kind))
                .for_node(node.id.clone(), kind),
        )
        .await;
        self.events.emit(ExecutionEvent::NodeStarted {
            execution_id: run.execution_id,
            node_id: node.id.clone(),
            connector: kind.to_string(),
            timestamp: Utc::now(),
        });

        let start = Instant::now();
        let result = self.invoke(node.id.as_str(), kind, &node.config, input, run).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                tracing::info!(
                    execution_id = %run.execution_id,
                    node_id = %node.id,
                    duration_ms,
                    "Node executed successfully"
                );
                log.push(
                    LogEntry::new(LogLevel::Info, format!("Node executed successfully: {}", display))
                        .for_node(node.id.clone(), kind),
                )
                .await;
                self.events.emit(ExecutionEvent::NodeCompleted {
                    execution_id: run.execution_id,
                    node_id: node.id.clone(),
                    output_keys: output.keys().cloned().collect(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Ok(output)
            }
            Err(e) => {
                tracing::error!(
                    execution_id = %run.execution_id,
                    node_id = %node.id,
                    error = %e,
                    "Node failed"
                );
                log.push(
                    LogEntry::new(LogLevel::Error, format!("Node failed: {}", e))
                        .for_node(node.id.clone(), kind),
                )
                .await;
                self.events.emit(ExecutionEvent::NodeFailed {
                    execution_id: run.execution_id,
                    node_id: node.id.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    /// Create, configure and execute a fresh connector instance.
    ///
    /// Configure and execute run in their own task, together under the node
    /// deadline and the run's cancellation. A panicking connector fails the node.
    async fn invoke(
        &self,
        node_id: &str,
        kind: &str,
        config: &Payload,
        input: Payload,
        run: &RunContext,
    ) -> Result<Payload, FlowError> {
        let connector = self.registry.create(kind)?;

        let ctx = ConnectorContext::new(
            run.execution_id,
            run.workflow_id.clone(),
            node_id,
            self.store.clone(),
            self.events.create_emitter(run.execution_id, node_id.to_string()),
        )
        .with_user(run.user.clone())
        .with_cancellation(run.cancellation.child_token());

        let mut task = tokio::spawn(configure_and_execute(connector, config.clone(), ctx, input));
        let abort = task.abort_handle();

        let joined = tokio::select! {
            biased;
            _ = run.cancellation.cancelled() => {
                abort.abort();
                return Err(FlowError::Cancelled);
            }
            joined = with_deadline(self.node_timeout, &mut task) => joined,
        };

        let failed = |source: ConnectorError| FlowError::ConnectorExecution {
            node_id: node_id.to_string(),
            source,
        };
        match joined {
            Some(Ok(Ok(output))) => Ok(output),
            Some(Ok(Err(Stage::Configure(source)))) => Err(FlowError::ConnectorConfigure {
                node_id: node_id.to_string(),
                source,
            }),
            Some(Ok(Err(Stage::Execute(source)))) => Err(failed(source)),
            Some(Err(e)) if e.is_panic() => Err(failed(ConnectorError::ExecutionFailed(format!(
                "connector panicked: {}",
                panic_message(&*e.into_panic())
            )))),
            Some(Err(e)) => Err(failed(ConnectorError::ExecutionFailed(format!(
                "connector task aborted: {}",
                e
            )))),
            None => {
                abort.abort();
                let millis = self.node_timeout.map_or(0, |limit| limit.as_millis() as u64);
                Err(failed(ConnectorError::Timeout { millis }))
            }
        }
    }
}

/// Which half of a connector call failed
enum Stage {
    Configure(ConnectorError),
    Execute(ConnectorError),
}

async fn configure_and_execute(
    mut connector: Box<dyn Connector>,
    config: Payload,
    ctx: ConnectorContext,
    input: Payload,
) -> Result<Payload, Stage> {
    connector.configure(config).await.map_err(Stage::Configure)?;
    connector.execute(&ctx, input).await.map_err(Stage::Execute)
}

/// `None` when the deadline passed first
async fn with_deadline<T>(
    limit: Option<Duration>,
    task: &mut JoinHandle<T>,
) -> Option<Result<T, JoinError>> {
    match limit {
        Some(limit) => timeout(limit, task).await.ok(),
        None => Some(task.await),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
