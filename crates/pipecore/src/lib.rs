//! Core abstractions for the pipeline engine
//!
//! This crate provides the connector contract, the persisted data model,
//! error types, execution events and the record store boundary that all
//! other crates depend on.

pub mod connector;
mod error;
pub mod events;
pub mod execution;
mod model;
pub mod store;

pub use connector::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorDescriptor, FieldKind,
    NodeCategory, Payload, PayloadExt,
};
pub use error::{ConnectorError, FlowError, GraphError, StoreError};
pub use events::*;
pub use execution::{
    ExecutionId, ExecutionStatus, ExecutionView, LogEntry, LogLevel, WorkflowExecution,
};
pub use model::{ConnectionRecord, NodeId, NodeRecord, Workflow, WorkflowBundle, WorkflowId};
pub use store::{RecordQuery, RecordStore, SortKey};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, FlowError>;
