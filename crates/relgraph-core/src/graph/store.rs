//! Relationship graph backed by petgraph::DiGraph.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::config::{Chunk, ChunkKind, RelationshipEdge, RelationshipType, UNKNOWN_EDGE_WEIGHT};

/// Node data stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeData {
    Chunk {
        id: String,
        name: String,
        kind: ChunkKind,
        file: String,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_chunk_id: Option<String>,
        start_line: usize,
        end_line: usize,
    },
    /// Placeholder for a callee name no chunk was resolved for.
    #[serde(rename = "symbol_name")]
    Symbol { id: String, is_target_name: bool },
}

impl NodeData {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        NodeData::Chunk {
            id: chunk.id.clone(),
            name: chunk.name.clone(),
            kind: chunk.kind,
            file: chunk.file.clone(),
            language: chunk.language.clone(),
            parent_chunk_id: chunk.parent_chunk_id.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
        }
    }

    pub fn phantom(name: &str) -> Self {
        NodeData::Symbol {
            id: name.to_string(),
            is_target_name: true,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            NodeData::Chunk { id, .. } | NodeData::Symbol { id, .. } => id,
        }
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, NodeData::Chunk { .. })
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            NodeData::Chunk { file, .. } => Some(file),
            NodeData::Symbol { .. } => None,
        }
    }
}

/// Edge data stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub relationship_type: RelationshipType,
    pub line_number: usize,
    pub confidence: f64,
    pub is_method_call: bool,
    /// Occurrences of this (source, target, type) triple.
    pub weight: u32,
}

impl EdgeData {
    pub fn new(relationship_type: RelationshipType, line_number: usize) -> Self {
        Self {
            relationship_type,
            line_number,
            confidence: 1.0,
            is_method_call: false,
            weight: 1,
        }
    }

    pub fn from_edge(edge: &RelationshipEdge) -> Self {
        Self {
            relationship_type: edge.relationship_type,
            line_number: edge.line_number,
            confidence: edge.confidence,
            is_method_call: edge.is_method_call,
            weight: 1,
        }
    }
}

/// A flat view of one stored edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeView<'g> {
    pub source: &'g str,
    pub target: &'g str,
    pub data: &'g EdgeData,
}

/// Wrapper around petgraph::DiGraph keyed by chunk id or phantom name.
///
/// Nodes are never removed individually, so `NodeIndex` values stay valid
/// until [`GraphStore::clear`].
#[derive(Debug, Default, Clone)]
pub struct GraphStore {
    graph: DiGraph<NodeData, EdgeData>,
    /// O(1) string ID → NodeIndex lookup.
    id_index: HashMap<String, NodeIndex>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a node by string ID.
    fn ensure_node(&mut self, id: &str, data: impl FnOnce() -> NodeData) -> NodeIndex {
        if let Some(&idx) = self.id_index.get(id) {
            idx
        } else {
            let idx = self.graph.add_node(data());
            self.id_index.insert(id.to_string(), idx);
            idx
        }
    }

    // --- Node addition ---

    /// Insert or replace a node. Replacing a phantom with a chunk keeps its
    /// edges.
    pub fn add_node(&mut self, data: NodeData) -> NodeIndex {
        match self.id_index.get(data.id()) {
            Some(&idx) => {
                self.graph[idx] = data;
                idx
            }
            None => {
                let id = data.id().to_string();
                let idx = self.graph.add_node(data);
                self.id_index.insert(id, idx);
                idx
            }
        }
    }

    pub fn add_chunk(&mut self, chunk: &Chunk) -> NodeIndex {
        self.add_node(NodeData::from_chunk(chunk))
    }

    // --- Edge addition ---

    /// Insert an edge. Unknown endpoints become phantom nodes; a repeated
    /// (source, target, type) triple bumps the existing edge's weight.
    pub fn add_edge(&mut self, source: &str, target: &str, data: EdgeData) -> EdgeIndex {
        let from = self.ensure_node(source, || NodeData::phantom(source));
        let to = self.ensure_node(target, || NodeData::phantom(target));

        let existing = self
            .graph
            .edges_connecting(from, to)
            .find(|e| e.weight().relationship_type == data.relationship_type)
            .map(|e| e.id());
        match existing {
            Some(idx) => {
                let edge = &mut self.graph[idx];
                edge.weight += data.weight.max(1);
                edge.confidence = edge.confidence.max(data.confidence);
                edge.is_method_call |= data.is_method_call;
                idx
            }
            None => self.graph.add_edge(from, to, data),
        }
    }

    /// Drop every outgoing edge of `id`. Returns how many were removed.
    pub fn remove_edges_from(&mut self, id: &str) -> usize {
        let Some(&idx) = self.id_index.get(id) else {
            return 0;
        };
        let mut outgoing: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        // remove_edge swaps the last edge into the hole; go high to low.
        outgoing.sort_unstable_by(|a, b| b.cmp(a));
        for edge in &outgoing {
            self.graph.remove_edge(*edge);
        }
        outgoing.len()
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.id_index.clear();
    }

    // --- Lookup ---

    pub fn has_node(&self, id: &str) -> bool {
        self.id_index.contains_key(id)
    }

    pub fn get_node(&self, id: &str) -> Option<&NodeData> {
        self.id_index
            .get(id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.id_index.get(id).copied()
    }

    pub fn node_id(&self, idx: NodeIndex) -> &str {
        self.graph[idx].id()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn chunk_count(&self) -> usize {
        self.graph.node_weights().filter(|n| n.is_chunk()).count()
    }

    pub fn chunk_ids(&self) -> Vec<&str> {
        self.graph
            .node_weights()
            .filter(|n| n.is_chunk())
            .map(NodeData::id)
            .collect()
    }

    pub fn phantom_ids(&self) -> Vec<&str> {
        self.graph
            .node_weights()
            .filter(|n| !n.is_chunk())
            .map(NodeData::id)
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeData> {
        self.graph.node_weights()
    }

    pub fn edges(&self) -> Vec<EdgeView<'_>> {
        self.graph
            .edge_references()
            .map(|e| EdgeView {
                source: self.node_id(e.source()),
                target: self.node_id(e.target()),
                data: e.weight(),
            })
            .collect()
    }

    /// Outgoing edges of one node.
    pub fn edges_from(&self, id: &str) -> Vec<EdgeView<'_>> {
        self.edges_directed(id, Direction::Outgoing)
    }

    /// Incoming edges of one node.
    pub fn edges_to(&self, id: &str) -> Vec<EdgeView<'_>> {
        self.edges_directed(id, Direction::Incoming)
    }

    fn edges_directed(&self, id: &str, direction: Direction) -> Vec<EdgeView<'_>> {
        let Some(&idx) = self.id_index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges_directed(idx, direction).collect();
        // petgraph yields adjacency newest-first; report insertion order.
        edges.sort_by_key(|e| e.id());
        edges
            .into_iter()
            .map(|e| EdgeView {
                source: self.node_id(e.source()),
                target: self.node_id(e.target()),
                data: e.weight(),
            })
            .collect()
    }

    pub(crate) fn graph(&self) -> &DiGraph<NodeData, EdgeData> {
        &self.graph
    }

    // --- Queries ---

    /// Direct predecessors of `id`, any relationship type.
    pub fn get_callers(&self, id: &str) -> Vec<String> {
        self.direct(id, Direction::Incoming)
    }

    /// Direct successors of `id`, any relationship type.
    pub fn get_callees(&self, id: &str) -> Vec<String> {
        self.direct(id, Direction::Outgoing)
    }

    fn direct(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.id_index.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        // petgraph walks adjacency lists newest-first; restore insertion order.
        let mut edges: Vec<_> = self.graph.edges_directed(idx, direction).collect();
        edges.sort_by_key(|e| e.id());
        for edge in edges {
            let other = match direction {
                Direction::Incoming => edge.source(),
                Direction::Outgoing => edge.target(),
            };
            if seen.insert(other) {
                result.push(self.node_id(other).to_string());
            }
        }
        result
    }

    /// Breadth-first neighbourhood of `id` within `max_depth` hops.
    ///
    /// Each relation name is either a relationship type (follow it forward)
    /// or its inverse name such as `called_by` (follow it backward). Unknown
    /// names are ignored. With `edge_weights`, each frontier is expanded in
    /// descending weight of the edge type that reached a node; the reachable
    /// set does not change. The start node is not part of the result.
    pub fn get_neighbors(
        &self,
        id: &str,
        relation_types: &[&str],
        max_depth: usize,
        edge_weights: Option<&HashMap<String, f64>>,
    ) -> Vec<String> {
        let Some(&start) = self.id_index.get(id) else {
            return Vec::new();
        };

        let mut forward = HashSet::new();
        let mut backward = HashSet::new();
        for name in relation_types {
            if let Some(rel) = RelationshipType::from_str_value(name) {
                forward.insert(rel);
            } else if let Some(rel) = RelationshipType::from_inverse_name(name) {
                backward.insert(rel);
            } else {
                log::debug!("Ignoring unknown relation type '{name}'");
            }
        }

        let weight_of = |rel: RelationshipType| -> f64 {
            edge_weights
                .and_then(|w| w.get(rel.as_str()).copied())
                .unwrap_or(UNKNOWN_EDGE_WEIGHT)
        };

        let mut visited = HashSet::from([start]);
        let mut frontier = vec![start];
        let mut result = Vec::new();

        for _ in 0..max_depth {
            let mut candidates: Vec<(NodeIndex, f64)> = Vec::new();
            for &node in &frontier {
                let mut adjacent: Vec<_> = self
                    .graph
                    .edges_directed(node, Direction::Outgoing)
                    .filter(|e| forward.contains(&e.weight().relationship_type))
                    .map(|e| (e.id(), e.target(), e.weight().relationship_type))
                    .chain(
                        self.graph
                            .edges_directed(node, Direction::Incoming)
                            .filter(|e| backward.contains(&e.weight().relationship_type))
                            .map(|e| (e.id(), e.source(), e.weight().relationship_type)),
                    )
                    .collect();
                adjacent.sort_by_key(|(edge, _, _)| *edge);
                candidates.extend(
                    adjacent
                        .into_iter()
                        .map(|(_, other, rel)| (other, weight_of(rel))),
                );
            }
            if edge_weights.is_some() {
                candidates.sort_by(|a, b| {
                    b.1.total_cmp(&a.1)
                        .then_with(|| self.node_id(a.0).cmp(self.node_id(b.0)))
                });
            }

            let mut next = Vec::new();
            for (node, _) in candidates {
                if visited.insert(node) {
                    result.push(self.node_id(node).to_string());
                    next.push(node);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        result
    }
}

/// A [`GraphStore`] shared between one writer and concurrent readers.
#[derive(Debug, Default, Clone)]
pub struct SharedGraph {
    inner: Arc<RwLock<GraphStore>>,
}

impl SharedGraph {
    pub fn new(store: GraphStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Snapshot read access. A panicked writer does not poison readers.
    pub fn read(&self) -> RwLockReadGuard<'_, GraphStore> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, GraphStore> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_edge_weights;

    fn chunk_node(id: &str) -> NodeData {
        NodeData::Chunk {
            id: id.to_string(),
            name: id.to_string(),
            kind: ChunkKind::Function,
            file: "a.py".to_string(),
            language: "python".to_string(),
            parent_chunk_id: None,
            start_line: 1,
            end_line: 2,
        }
    }

    fn calls(store: &mut GraphStore, from: &str, to: &str) {
        store.add_edge(from, to, EdgeData::new(RelationshipType::Calls, 1));
    }

    fn as_set(ids: Vec<String>) -> HashSet<String> {
        ids.into_iter().collect()
    }

    #[test]
    fn add_node_is_idempotent() {
        let mut store = GraphStore::new();
        store.add_node(chunk_node("A"));
        store.add_node(chunk_node("A"));
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn unknown_target_becomes_phantom() {
        let mut store = GraphStore::new();
        store.add_node(chunk_node("A"));
        calls(&mut store, "A", "helper");
        assert_eq!(
            store.get_node("helper"),
            Some(&NodeData::Symbol {
                id: "helper".to_string(),
                is_target_name: true
            })
        );
        assert_eq!(store.phantom_ids(), vec!["helper"]);
        assert_eq!(store.get_callers("helper"), vec!["A"]);
    }

    #[test]
    fn chunk_replaces_phantom_and_keeps_edges() {
        let mut store = GraphStore::new();
        calls(&mut store, "A", "B");
        store.add_node(chunk_node("B"));
        assert!(store.get_node("B").unwrap().is_chunk());
        assert_eq!(store.get_callees("A"), vec!["B"]);
    }

    #[test]
    fn edge_views_follow_insertion_order() {
        let mut store = GraphStore::new();
        for target in ["B", "C", "D"] {
            calls(&mut store, "A", target);
            calls(&mut store, target, "A");
        }
        let out: Vec<&str> = store.edges_from("A").iter().map(|e| e.target).collect();
        assert_eq!(out, vec!["B", "C", "D"]);
        let inc: Vec<&str> = store.edges_to("A").iter().map(|e| e.source).collect();
        assert_eq!(inc, vec!["B", "C", "D"]);
    }

    #[test]
    fn repeated_triple_increments_weight() {
        let mut store = GraphStore::new();
        calls(&mut store, "A", "B");
        calls(&mut store, "A", "B");
        store.add_edge("A", "B", EdgeData::new(RelationshipType::Inherits, 1));
        assert_eq!(store.edge_count(), 2);
        let weights: Vec<u32> = store.edges_from("A").iter().map(|e| e.data.weight).collect();
        assert!(weights.contains(&2));
        assert!(weights.contains(&1));
    }

    #[test]
    fn remove_edges_from_only_outgoing() {
        let mut store = GraphStore::new();
        calls(&mut store, "A", "B");
        calls(&mut store, "A", "C");
        calls(&mut store, "C", "A");
        assert_eq!(store.remove_edges_from("A"), 2);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.get_callers("A"), vec!["C"]);
        assert_eq!(store.remove_edges_from("missing"), 0);
    }

    #[test]
    fn neighbors_forward_and_inverse() {
        let mut store = GraphStore::new();
        calls(&mut store, "A", "B");
        calls(&mut store, "B", "C");

        let around_b = store.get_neighbors("B", &["calls", "called_by"], 1, None);
        assert_eq!(as_set(around_b), as_set(vec!["A".into(), "C".into()]));

        let from_a = store.get_neighbors("A", &["calls", "called_by"], 1, None);
        assert_eq!(from_a, vec!["B"]);

        let from_a = store.get_neighbors("A", &["calls"], 2, None);
        assert_eq!(from_a, vec!["B", "C"]);

        assert!(store.get_neighbors("C", &["calls"], 3, None).is_empty());
        assert!(store.get_neighbors("nope", &["calls"], 3, None).is_empty());
    }

    #[test]
    fn weights_order_discovery_not_reach() {
        let mut store = GraphStore::new();
        store.add_edge("A", "imp", EdgeData::new(RelationshipType::Imports, 1));
        calls(&mut store, "A", "callee");
        let weights = default_edge_weights();

        let plain = store.get_neighbors("A", &["calls", "imports"], 1, None);
        assert_eq!(plain, vec!["imp", "callee"]);
        let weighted = store.get_neighbors("A", &["calls", "imports"], 1, Some(&weights));
        assert_eq!(weighted, vec!["callee", "imp"]);
    }

    #[test]
    fn shared_graph_reads_and_writes() {
        let shared = SharedGraph::new(GraphStore::new());
        shared.write().add_node(chunk_node("A"));
        let reader = shared.clone();
        assert!(reader.read().has_node("A"));
    }
}
