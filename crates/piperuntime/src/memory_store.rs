use async_trait::async_trait;
use pipecore::{
    ConnectionRecord, ExecutionId, NodeRecord, Payload, RecordQuery, RecordStore, StoreError,
    Workflow, WorkflowBundle, WorkflowExecution,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Record store kept in process memory. Used by the CLI, the server and tests.
#[derive(Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    nodes: RwLock<Vec<NodeRecord>>,
    connections: RwLock<Vec<ConnectionRecord>>,
    executions: RwLock<HashMap<ExecutionId, WorkflowExecution>>,
    collections: RwLock<HashMap<String, Vec<Payload>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a workflow with its nodes and connections, replacing an earlier copy
    pub async fn load_bundle(&self, bundle: WorkflowBundle) {
        let workflow_id = bundle.workflow.id.clone();
        {
            let mut nodes = self.nodes.write().await;
            nodes.retain(|n| n.workflow_id != workflow_id);
            nodes.extend(bundle.nodes);
        }
        {
            let mut connections = self.connections.write().await;
            connections.retain(|c| c.workflow_id != workflow_id);
            connections.extend(bundle.connections);
        }
        self.workflows
            .write()
            .await
            .insert(workflow_id, bundle.workflow);
    }

    /// Add a generic record, assigning an `id` when it has none. Returns the id.
    pub async fn insert_record(&self, collection: &str, mut record: Payload) -> String {
        let id = match record.get("id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().simple().to_string();
                record.insert("id".into(), serde_json::Value::String(id.clone()));
                id
            }
        };
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(record);
        id
    }

    pub async fn executions(&self) -> Vec<WorkflowExecution> {
        self.executions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_workflow(&self, id: &str) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("workflows", id))
    }

    async fn list_nodes(&self, workflow_id: &str) -> Result<Vec<NodeRecord>, StoreError> {
        Ok(self
            .nodes
            .read()
            .await
            .iter()
            .filter(|n| n.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn list_connections(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<ConnectionRecord>, StoreError> {
        Ok(self
            .connections
            .read()
            .await
            .iter()
            .filter(|c| c.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        self.executions
            .write()
            .await
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        match executions.get_mut(&execution.id) {
            Some(existing) => {
                *existing = execution.clone();
                Ok(())
            }
            None => Err(not_found("workflow_executions", &execution.id.to_string())),
        }
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<WorkflowExecution, StoreError> {
        self.executions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("workflow_executions", &id.to_string()))
    }

    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<Payload>, StoreError> {
        if query.collection.is_empty() {
            return Err(StoreError::InvalidQuery("collection name is required".into()));
        }

        let collections = self.collections.read().await;
        let mut records: Vec<Payload> = collections
            .get(&query.collection)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if !query.sort.is_empty() {
            records.sort_by(|a, b| {
                for key in &query.sort {
                    let ord = compare_values(a.get(&key.field), b.get(&key.field));
                    let ord = if key.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let page = records.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        })
    }

    async fn get_record(&self, collection: &str, id: &str) -> Result<Payload, StoreError> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|rows| {
                rows.iter()
                    .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(id))
            })
            .cloned()
            .ok_or_else(|| not_found(collection, id))
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

/// Missing and null sort first, then booleans, numbers, strings.
fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> Ordering {
    use serde_json::Value;

    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
