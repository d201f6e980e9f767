use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use pipecore::{ConnectionRecord, GraphError, NodeCategory, NodeId, NodeRecord, Payload};
use std::collections::HashMap;

/// Node of the in-memory execution graph
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    pub category: NodeCategory,
    pub connector_kind: String,
    pub label: String,
    pub config: Payload,
    /// Predecessor ids in connection order
    pub inputs: Vec<NodeId>,
    /// Successor ids in connection order
    pub outputs: Vec<NodeId>,
}

/// Directed graph built fresh for every execution.
///
/// Nodes live in a petgraph arena in record order; edges carry the
/// connection id they came from.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    graph: DiGraph<GraphNode, String>,
    index: HashMap<NodeId, NodeIndex>,
}

/// Build and validate an execution graph from persisted records.
///
/// Checks run in order: node config and id uniqueness, edge endpoints,
/// presence of a source and a destination, acyclicity.
pub fn build_graph(
    nodes: &[NodeRecord],
    connections: &[ConnectionRecord],
) -> Result<ExecutionGraph, GraphError> {
    let mut graph = DiGraph::with_capacity(nodes.len(), connections.len());
    let mut index = HashMap::with_capacity(nodes.len());

    for record in nodes {
        let config = decode_config(&record.config).map_err(|reason| {
            GraphError::InvalidNodeConfig {
                node_id: record.id.clone(),
                reason,
            }
        })?;

        if index.contains_key(&record.id) {
            return Err(GraphError::DuplicateNode(record.id.clone()));
        }

        let idx = graph.add_node(GraphNode {
            id: record.id.clone(),
            category: record.category,
            connector_kind: record.connector_kind.clone(),
            label: record.label.clone(),
            config,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        index.insert(record.id.clone(), idx);
    }

    for conn in connections {
        let from = *index
            .get(&conn.source_id)
            .ok_or_else(|| GraphError::DanglingEdge {
                connection_id: conn.id.clone(),
                node_id: conn.source_id.clone(),
                side: "source",
            })?;
        let to = *index
            .get(&conn.target_id)
            .ok_or_else(|| GraphError::DanglingEdge {
                connection_id: conn.id.clone(),
                node_id: conn.target_id.clone(),
                side: "target",
            })?;

        graph[from].outputs.push(conn.target_id.clone());
        graph[to].inputs.push(conn.source_id.clone());
        graph.add_edge(from, to, conn.id.clone());
    }

    let has = |category: NodeCategory| graph.node_weights().any(|n| n.category == category);
    if !has(NodeCategory::Source) {
        return Err(GraphError::MissingSource);
    }
    if !has(NodeCategory::Destination) {
        return Err(GraphError::MissingDestination);
    }

    if let Err(cycle) = toposort(&graph, None) {
        return Err(GraphError::CyclicGraph(graph[cycle.node_id()].id.clone()));
    }

    Ok(ExecutionGraph { graph, index })
}

/// Stored config text must be a JSON object. `null` and blank text mean no config.
fn decode_config(raw: &str) -> Result<Payload, String> {
    if raw.trim().is_empty() {
        return Ok(Payload::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(serde_json::Value::Null) => Ok(Payload::new()),
        Ok(other) => Err(format!("expected a JSON object, found {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl ExecutionGraph {
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.index_of(id).map(|idx| &self.graph[idx])
    }

    /// Node indices in record order
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    /// `(source, target)` pairs in connection order
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges: Vec<_> = self.graph.edge_indices().collect();
        edges.sort();
        edges
            .into_iter()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].id.clone(), self.graph[b].id.clone()))
            .collect()
    }

    /// Source nodes without inputs, in record order
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                let node = &self.graph[idx];
                node.category == NodeCategory::Source && node.inputs.is_empty()
            })
            .collect()
    }

    /// Distinct successors in connection order
    pub fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.resolve_distinct(&self.graph[idx].outputs)
    }

    /// Distinct predecessors in connection order
    pub fn predecessors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.resolve_distinct(&self.graph[idx].inputs)
    }

    fn resolve_distinct(&self, ids: &[NodeId]) -> Vec<NodeIndex> {
        let mut seen = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(&idx) = self.index.get(id) {
                if !seen.contains(&idx) {
                    seen.push(idx);
                }
            }
        }
        seen
    }

    /// A valid execution order. Acyclicity was checked at build time.
    pub fn topological_order(&self) -> Vec<NodeId> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|idx| self.graph[idx].id.clone()).collect())
            .unwrap_or_default()
    }
}
