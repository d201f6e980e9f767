//! Workflow execution runtime
//!
//! This crate provides the engine that runs workflows: the connector
//! registry, graph construction, the worklist executor, execution tracking
//! and the background-task facade.

mod config;
mod engine;
mod executor;
pub mod graph;
pub mod loader;
mod memory_store;
mod registry;
mod tracker;

pub use config::EngineConfig;
pub use engine::{ExecuteRequest, ExecutionHandle, ExecutionReport, Trigger, WorkflowEngine};
pub use executor::{GraphExecutor, RunContext, Traversal};
pub use graph::{build_graph, ExecutionGraph, GraphNode};
pub use memory_store::MemoryStore;
pub use registry::{ConnectorConstructor, ConnectorRegistry};
pub use tracker::{ExecutionLog, ExecutionTracker};
