use crate::{
    ConnectionRecord, ExecutionId, NodeRecord, Payload, StoreError, Workflow, WorkflowExecution,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Boundary to the persistent record store.
///
/// The engine reads workflow definitions through it and writes execution
/// records back; connectors use the generic record methods.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_workflow(&self, id: &str) -> Result<Workflow, StoreError>;

    async fn list_nodes(&self, workflow_id: &str) -> Result<Vec<NodeRecord>, StoreError>;

    async fn list_connections(&self, workflow_id: &str)
        -> Result<Vec<ConnectionRecord>, StoreError>;

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    async fn get_execution(&self, id: ExecutionId) -> Result<WorkflowExecution, StoreError>;

    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<Payload>, StoreError>;

    async fn get_record(&self, collection: &str, id: &str) -> Result<Payload, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Generic collection query: equality filters, ownership scope, sort and paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub collection: String,
    #[serde(default)]
    pub filter: BTreeMap<String, serde_json::Value>,
    /// Restrict to records whose `user` field equals this id
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl RecordQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Parse a comma separated sort spec; a leading `-` sorts descending.
    pub fn sorted_by(mut self, spec: &str) -> Self {
        self.sort = parse_sort(spec);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Whether a record satisfies the filter and ownership scope
    pub fn matches(&self, record: &Payload) -> bool {
        if let Some(owner) = &self.owner {
            if record.get("user").and_then(|v| v.as_str()) != Some(owner.as_str()) {
                return false;
            }
        }
        self.filter
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

pub fn parse_sort(spec: &str) -> Vec<SortKey> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "-" && *s != "+")
        .map(|s| match s.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                descending: true,
            },
            None => SortKey {
                field: s.trim_start_matches('+').to_string(),
                descending: false,
            },
        })
        .collect()
}
