use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("workflow is not active: {0}")]
    WorkflowInactive(String),

    #[error("failed to load workflow nodes: {0}")]
    NodeLoadFailure(#[source] StoreError),

    #[error("failed to load workflow connections: {0}")]
    ConnectionLoadFailure(#[source] StoreError),

    #[error("failed to build execution graph: {0}")]
    Graph(#[from] GraphError),

    #[error("unknown connector kind: {0}")]
    UnknownConnectorKind(String),

    #[error("failed to configure connector for node {node_id}: {source}")]
    ConnectorConfigure {
        node_id: String,
        #[source]
        source: ConnectorError,
    },

    #[error("connector execution failed for node {node_id}: {source}")]
    ConnectorExecution {
        node_id: String,
        #[source]
        source: ConnectorError,
    },

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Structural problems found while turning node and connection records into a graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("invalid config for node {node_id}: {reason}")]
    InvalidNodeConfig { node_id: String, reason: String },

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("{side} node {node_id} not found (connection {connection_id})")]
    DanglingEdge {
        connection_id: String,
        node_id: String,
        side: &'static str,
    },

    #[error("workflow must have at least one source node")]
    MissingSource,

    #[error("workflow must have at least one destination node")]
    MissingDestination,

    #[error("workflow graph contains a cycle through node {0}")]
    CyclicGraph(String),
}

#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid config value for '{field}': expected {expected}")]
    InvalidConfig { field: String, expected: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
