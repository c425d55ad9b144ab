/// Compiled funnel graph
///
/// Converts a wire-level `FunnelDefinition` into the immutable, validated
/// form the execution engine walks: typed nodes indexed by ID, the ordered
/// edge list, and the resolved start node. Structural problems that make
/// execution impossible are hard errors; authoring smells (duplicate
/// handles, unreachable nodes) are collected as warnings so the editor can
/// surface them without blocking a save.

use crate::error::GraphError;
use crate::funnel::types::{
    Edge, FunnelDefinition, Handle, Node, NodeConfig, NodeDef, NodeKind,
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An immutable, validated funnel ready for execution
#[derive(Debug)]
pub struct CompiledFunnel {
    /// Original definition (kept for serialization back to the editor)
    pub definition: FunnelDefinition,
    /// Typed nodes indexed by node ID
    nodes: HashMap<String, Node>,
    /// Edges in insertion order; first match wins on lookup
    edges: Vec<Edge>,
    /// The unique start node ID
    start_node_id: String,
    /// Non-fatal authoring problems found at compile time
    pub warnings: Vec<String>,
}

impl CompiledFunnel {
    /// Compile and validate a funnel definition
    ///
    /// Hard errors: missing/multiple start nodes, edges referencing unknown
    /// node IDs. Warnings: duplicate (source, handle) pairs, nodes
    /// unreachable from start, node data that does not parse as its kind's
    /// config shape (the node degrades to an empty config and the step
    /// executor's failure policy takes over at run time).
    pub fn compile(definition: FunnelDefinition) -> Result<Self, GraphError> {
        tracing::debug!(
            "🏗️ Compiling funnel '{}' ({} nodes, {} edges)",
            definition.id,
            definition.nodes.len(),
            definition.edges.len()
        );

        let mut warnings = Vec::new();
        let mut nodes = HashMap::new();

        for def in &definition.nodes {
            if nodes.contains_key(&def.id) {
                return Err(GraphError::DuplicateNodeId {
                    node_id: def.id.clone(),
                });
            }
            let node = parse_node(def, &mut warnings);
            nodes.insert(def.id.clone(), node);
        }

        // Exactly one start node
        let start_ids: Vec<&String> = nodes
            .values()
            .filter(|n| n.kind == NodeKind::Start)
            .map(|n| &n.id)
            .collect();
        let start_node_id = match start_ids.len() {
            0 => return Err(GraphError::MissingStart),
            1 => start_ids[0].clone(),
            n => return Err(GraphError::MultipleStarts(n)),
        };

        // Dangling edge endpoints are hard errors
        for edge in &definition.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !nodes.contains_key(endpoint) {
                    return Err(GraphError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }

        // Duplicate (source, handle) pairs: first wins, warn about the rest
        let mut seen: HashSet<(String, Handle)> = HashSet::new();
        for edge in &definition.edges {
            let key = (
                edge.source.clone(),
                Handle::from_wire(edge.source_handle.as_deref()),
            );
            if !seen.insert(key.clone()) {
                warnings.push(format!(
                    "node '{}' has multiple outgoing edges for handle '{}'; only the first is used",
                    key.0, key.1
                ));
            }
        }

        // Unreachable nodes are permitted (the editor keeps disconnected
        // fragments around), so they only warn
        for node_id in unreachable_nodes(&nodes, &definition.edges, &start_node_id) {
            tracing::warn!(
                "⚠️ Funnel '{}': node '{}' is unreachable from start",
                definition.id,
                node_id
            );
            warnings.push(format!("node '{}' is unreachable from start", node_id));
        }

        let compiled = Self {
            definition: definition.clone(),
            nodes,
            edges: definition.edges,
            start_node_id,
            warnings,
        };

        tracing::debug!(
            "✅ Compiled funnel '{}' (start: {}, {} warnings)",
            compiled.definition.id,
            compiled.start_node_id,
            compiled.warnings.len()
        );
        Ok(compiled)
    }

    /// The unique entry node of this funnel
    pub fn start_node(&self) -> &Node {
        // Invariant: compile() guarantees the start node exists
        &self.nodes[&self.start_node_id]
    }

    /// Look up a node by ID
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Resolve the outgoing edge of a node for a given handle
    ///
    /// Returns the first edge (insertion order) whose source and handle
    /// match; an absent wire handle and the literal `"default"` are
    /// equivalent. `None` is the normal end-of-branch case, not an error.
    pub fn outgoing_edge(&self, node_id: &str, handle: &Handle) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.source == node_id && handle.matches(e.source_handle.as_deref()))
    }

}

/// Shared handle to a compiled funnel as stored in the registry
pub type SharedFunnel = Arc<CompiledFunnel>;

/// Node IDs that start can never reach (sorted for stable warnings)
fn unreachable_nodes(
    nodes: &HashMap<String, Node>,
    edges: &[Edge],
    start_node_id: &str,
) -> Vec<String> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

    for id in nodes.keys() {
        indices.insert(id.as_str(), graph.add_node(id.as_str()));
    }
    for edge in edges {
        graph.add_edge(indices[edge.source.as_str()], indices[edge.target.as_str()], ());
    }

    let mut reachable = HashSet::new();
    let mut bfs = Bfs::new(&graph, indices[start_node_id]);
    while let Some(idx) = bfs.next(&graph) {
        reachable.insert(graph[idx]);
    }

    let mut unreachable: Vec<String> = nodes
        .keys()
        .filter(|id| !reachable.contains(id.as_str()))
        .cloned()
        .collect();
    unreachable.sort();
    unreachable
}

/// Parse one wire node's data bag into its typed configuration
///
/// A data payload with wrong field types falls back to the kind's default
/// (all-unset) config with a warning; missing required fields are caught by
/// the step executor's failure policy at run time.
fn parse_node(def: &NodeDef, warnings: &mut Vec<String>) -> Node {
    fn parse_or_default<T: Default + serde::de::DeserializeOwned>(
        def: &NodeDef,
        warnings: &mut Vec<String>,
    ) -> T {
        match serde_json::from_value(def.data.clone()) {
            Ok(config) => config,
            Err(e) => {
                warnings.push(format!(
                    "node '{}' ({:?}) has malformed data: {}",
                    def.id, def.kind, e
                ));
                T::default()
            }
        }
    }

    let config = match def.kind {
        NodeKind::Start => NodeConfig::Start,
        NodeKind::Message => NodeConfig::Message(parse_or_default(def, warnings)),
        NodeKind::QuestionText => NodeConfig::QuestionText(parse_or_default(def, warnings)),
        NodeKind::QuestionNumber => NodeConfig::QuestionNumber(parse_or_default(def, warnings)),
        NodeKind::QuestionChoice => NodeConfig::QuestionChoice(parse_or_default(def, warnings)),
        NodeKind::Condition => NodeConfig::Condition(parse_or_default(def, warnings)),
        NodeKind::Delay => NodeConfig::Delay(parse_or_default(def, warnings)),
        NodeKind::VariableOp => NodeConfig::VariableOp(parse_or_default(def, warnings)),
        NodeKind::Notify => NodeConfig::Notify(parse_or_default(def, warnings)),
        NodeKind::Webhook => NodeConfig::Webhook(parse_or_default(def, warnings)),
        NodeKind::Payment => NodeConfig::Payment(parse_or_default(def, warnings)),
        NodeKind::Delivery => NodeConfig::Delivery(parse_or_default(def, warnings)),
        NodeKind::Remarketing => NodeConfig::Remarketing(parse_or_default(def, warnings)),
        NodeKind::End => NodeConfig::End,
    };

    Node {
        id: def.id.clone(),
        kind: def.kind,
        config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(json: serde_json::Value) -> FunnelDefinition {
        serde_json::from_value(json).expect("valid definition JSON")
    }

    #[test]
    fn compiles_editor_wire_format() {
        let def = definition(json!({
            "id": "fn-1",
            "name": "Welcome",
            "schemaVersion": 2,
            "nodes": [
                { "id": "a", "type": "start", "data": {} },
                { "id": "b", "type": "message", "data": { "text": "Hi {{name}}" } },
                { "id": "c", "type": "end", "data": {} }
            ],
            "edges": [
                { "id": "e1", "source": "a", "target": "b" },
                { "id": "e2", "source": "b", "target": "c", "sourceHandle": "default" }
            ]
        }));

        let compiled = CompiledFunnel::compile(def).unwrap();
        assert_eq!(compiled.start_node().id, "a");
        assert!(compiled.warnings.is_empty());

        let node = compiled.node("b").unwrap();
        match &node.config {
            NodeConfig::Message(cfg) => assert_eq!(cfg.text.as_deref(), Some("Hi {{name}}")),
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn missing_start_is_rejected() {
        let def = definition(json!({
            "id": "fn-1", "name": "broken",
            "nodes": [{ "id": "a", "type": "message", "data": {} }],
            "edges": []
        }));
        assert!(matches!(
            CompiledFunnel::compile(def),
            Err(GraphError::MissingStart)
        ));
    }

    #[test]
    fn multiple_starts_are_rejected() {
        let def = definition(json!({
            "id": "fn-1", "name": "broken",
            "nodes": [
                { "id": "a", "type": "start", "data": {} },
                { "id": "b", "type": "start", "data": {} }
            ],
            "edges": []
        }));
        assert!(matches!(
            CompiledFunnel::compile(def),
            Err(GraphError::MultipleStarts(2))
        ));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let def = definition(json!({
            "id": "fn-1", "name": "broken",
            "nodes": [{ "id": "a", "type": "start", "data": {} }],
            "edges": [{ "id": "e1", "source": "a", "target": "ghost" }]
        }));
        match CompiledFunnel::compile(def) {
            Err(GraphError::DanglingEdge { node_id, .. }) => assert_eq!(node_id, "ghost"),
            other => panic!("expected dangling edge error, got {:?}", other),
        }
    }

    #[test]
    fn first_matching_edge_wins_and_duplicates_warn() {
        let def = definition(json!({
            "id": "fn-1", "name": "dup",
            "nodes": [
                { "id": "a", "type": "start", "data": {} },
                { "id": "b", "type": "end", "data": {} },
                { "id": "c", "type": "end", "data": {} }
            ],
            "edges": [
                { "id": "e1", "source": "a", "target": "b" },
                { "id": "e2", "source": "a", "target": "c" }
            ]
        }));
        let compiled = CompiledFunnel::compile(def).unwrap();
        assert_eq!(compiled.warnings.len(), 1);
        let edge = compiled.outgoing_edge("a", &Handle::Default).unwrap();
        assert_eq!(edge.target, "b");
    }

    #[test]
    fn absent_handle_and_default_are_equivalent() {
        let def = definition(json!({
            "id": "fn-1", "name": "handles",
            "nodes": [
                { "id": "a", "type": "start", "data": {} },
                { "id": "b", "type": "condition",
                  "data": { "variable": "x", "operator": "equals", "value": "1" } },
                { "id": "c", "type": "end", "data": {} },
                { "id": "d", "type": "end", "data": {} }
            ],
            "edges": [
                { "id": "e1", "source": "a", "target": "b", "sourceHandle": "default" },
                { "id": "e2", "source": "b", "target": "c", "sourceHandle": "true" },
                { "id": "e3", "source": "b", "target": "d", "sourceHandle": "false" }
            ]
        }));
        let compiled = CompiledFunnel::compile(def).unwrap();
        assert_eq!(compiled.outgoing_edge("a", &Handle::Default).unwrap().target, "b");
        assert_eq!(
            compiled
                .outgoing_edge("b", &Handle::Label("true".into()))
                .unwrap()
                .target,
            "c"
        );
        assert!(compiled.outgoing_edge("b", &Handle::Default).is_none());
        assert!(compiled.outgoing_edge("c", &Handle::Default).is_none());
    }

    #[test]
    fn unreachable_node_is_reported_as_warning() {
        let def = definition(json!({
            "id": "fn-1", "name": "orphaned",
            "nodes": [
                { "id": "a", "type": "start", "data": {} },
                { "id": "b", "type": "end", "data": {} },
                { "id": "island", "type": "message", "data": { "text": "never" } }
            ],
            "edges": [{ "id": "e1", "source": "a", "target": "b" }]
        }));
        let compiled = CompiledFunnel::compile(def).unwrap();
        assert_eq!(compiled.warnings.len(), 1);
        assert!(compiled.warnings[0].contains("island"));
        assert!(compiled.warnings[0].contains("unreachable"));
    }

    #[test]
    fn malformed_node_data_degrades_with_warning() {
        let def = definition(json!({
            "id": "fn-1", "name": "bad-data",
            "nodes": [
                { "id": "a", "type": "start", "data": {} },
                { "id": "b", "type": "delay", "data": { "seconds": "not-a-number" } }
            ],
            "edges": [{ "id": "e1", "source": "a", "target": "b" }]
        }));
        let compiled = CompiledFunnel::compile(def).unwrap();
        assert_eq!(compiled.warnings.len(), 1);
        match &compiled.node("b").unwrap().config {
            NodeConfig::Delay(cfg) => assert!(cfg.seconds.is_none()),
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
