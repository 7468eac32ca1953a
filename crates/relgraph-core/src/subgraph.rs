//! Bounded, topologically ordered subgraph around a set of search results.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::algo::{condensation, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::config::IndexConfig;
use crate::graph::{EdgeView, GraphStore, NodeData};

/// Knobs for [`extract_subgraph`].
#[derive(Debug, Clone)]
pub struct SubgraphOptions {
    pub include_boundary_edges: bool,
    /// Cap on boundary edges per node and direction.
    pub max_boundary_edges: usize,
    /// Emit file paths relative to this directory when set.
    pub project_root: Option<PathBuf>,
}

impl Default for SubgraphOptions {
    fn default() -> Self {
        Self {
            include_boundary_edges: true,
            max_boundary_edges: 3,
            project_root: None,
        }
    }
}

impl SubgraphOptions {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            include_boundary_edges: config.include_boundary_edges,
            max_boundary_edges: config.max_boundary_edges,
            project_root: (!config.repo_path.is_empty()).then(|| PathBuf::from(&config.repo_path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgraphNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    /// False for ego-neighbour context nodes.
    pub is_result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centrality: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgraphEdge {
    pub source: String,
    pub target: String,
    pub relationship_type: String,
    pub line_number: usize,
    pub weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<BoundaryDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunitySummary {
    pub id: usize,
    /// Members of this community present in the subgraph.
    pub member_count: usize,
    /// Most frequent parent directory among member files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Serialisable subgraph document handed to the search layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Subgraph {
    /// Nodes in topological order.
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<SubgraphEdge>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub boundary_edges: Vec<SubgraphEdge>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub communities: Vec<CommunitySummary>,
    pub has_cycles: bool,
}

impl Subgraph {
    /// Node ids in topological order.
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }
}

/// Build the induced subgraph over `result_ids` and `ego_ids`.
///
/// Ids unknown to the store are skipped; an id in both lists counts as a
/// result. Boundary edges are only gathered for result nodes.
pub fn extract_subgraph(
    store: &GraphStore,
    result_ids: &[String],
    ego_ids: &[String],
    centrality: Option<&HashMap<String, f64>>,
    communities: Option<&HashMap<String, usize>>,
    options: &SubgraphOptions,
) -> Subgraph {
    // ---- Node set ----
    let mut members: Vec<(&str, bool)> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let candidates = result_ids
        .iter()
        .map(|id| (id.as_str(), true))
        .chain(ego_ids.iter().map(|id| (id.as_str(), false)));
    for (id, is_result) in candidates {
        if store.has_node(id) && seen.insert(id) {
            members.push((id, is_result));
        }
    }
    if members.is_empty() {
        return Subgraph::default();
    }
    let position: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i))
        .collect();

    // ---- Edges ----
    let to_edge = |e: &EdgeView, direction: Option<BoundaryDirection>| SubgraphEdge {
        source: e.source.to_string(),
        target: e.target.to_string(),
        relationship_type: e.data.relationship_type.to_string(),
        line_number: e.data.line_number,
        weight: e.data.weight,
        direction,
    };

    let mut edges = Vec::new();
    let mut boundary = Vec::new();
    for &(id, is_result) in &members {
        let mut outgoing_boundary = 0;
        for edge in store.edges_from(id) {
            if position.contains_key(edge.target) {
                edges.push(to_edge(&edge, None));
            } else if options.include_boundary_edges
                && is_result
                && outgoing_boundary < options.max_boundary_edges
            {
                boundary.push(to_edge(&edge, Some(BoundaryDirection::Outgoing)));
                outgoing_boundary += 1;
            }
        }
    }
    if options.include_boundary_edges {
        for &(id, is_result) in &members {
            if !is_result {
                continue;
            }
            let incoming = store
                .edges_to(id)
                .into_iter()
                .filter(|e| !position.contains_key(e.source))
                .take(options.max_boundary_edges);
            boundary.extend(incoming.map(|e| to_edge(&e, Some(BoundaryDirection::Incoming))));
        }
    }

    // ---- Topological order ----
    let (order, has_cycles) = topological_order(members.len(), &edges, &position);

    // ---- Nodes ----
    let round = |x: f64| (x * 10_000.0).round() / 10_000.0;
    let root = options.project_root.as_deref();
    let nodes: Vec<SubgraphNode> = order
        .iter()
        .map(|&i| {
            let (id, is_result) = members[i];
            let mut node = SubgraphNode {
                id: id.to_string(),
                name: None,
                kind: None,
                file: None,
                start_line: None,
                end_line: None,
                is_result,
                community: communities.and_then(|c| c.get(id).copied()),
                centrality: centrality.and_then(|c| c.get(id).copied()).map(round),
            };
            if let Some(NodeData::Chunk {
                name,
                kind,
                file,
                start_line,
                end_line,
                ..
            }) = store.get_node(id)
            {
                node.name = Some(name.clone());
                node.kind = Some(kind.to_string());
                node.file = Some(display_path(file, root));
                node.start_line = Some(*start_line);
                node.end_line = Some(*end_line);
            }
            node
        })
        .collect();

    let communities = summarise_communities(&nodes);

    Subgraph {
        nodes,
        edges,
        boundary_edges: boundary,
        communities,
        has_cycles,
    }
}

/// Topological order of member positions. A cyclic subgraph is ordered by
/// its SCC condensation, each component's members kept together in input
/// order.
fn topological_order(
    n: usize,
    edges: &[SubgraphEdge],
    position: &HashMap<&str, usize>,
) -> (Vec<usize>, bool) {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(n, edges.len());
    let indices: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();
    let mut linked = HashSet::new();
    for edge in edges {
        let (s, t) = (position[edge.source.as_str()], position[edge.target.as_str()]);
        if s != t && linked.insert((s, t)) {
            graph.add_edge(indices[s], indices[t], ());
        }
    }

    if let Ok(sorted) = toposort(&graph, None) {
        return (sorted.into_iter().map(|idx| graph[idx]).collect(), false);
    }

    let condensed = condensation(graph, true);
    match toposort(&condensed, None) {
        Ok(sorted) => {
            let order = sorted
                .into_iter()
                .flat_map(|idx| {
                    let mut component = condensed[idx].clone();
                    component.sort_unstable();
                    component
                })
                .collect();
            (order, true)
        }
        // Unreachable: a condensation is acyclic.
        Err(_) => ((0..n).collect(), true),
    }
}

fn summarise_communities(nodes: &[SubgraphNode]) -> Vec<CommunitySummary> {
    let mut by_community: BTreeMap<usize, Vec<&SubgraphNode>> = BTreeMap::new();
    for node in nodes {
        if let Some(c) = node.community {
            by_community.entry(c).or_default().push(node);
        }
    }
    by_community
        .into_iter()
        .map(|(id, members)| CommunitySummary {
            id,
            member_count: members.len(),
            label: most_common_directory(members.iter().filter_map(|n| n.file.as_deref())),
        })
        .collect()
}

/// Most frequent immediate parent directory; ties go to the smallest name.
fn most_common_directory<'a>(files: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for file in files {
        let dir = match file.rfind('/') {
            Some(pos) => &file[..pos],
            None => ".",
        };
        *counts.entry(dir).or_insert(0) += 1;
    }
    let best = counts.values().copied().max()?;
    counts
        .into_iter()
        .find(|(_, count)| *count == best)
        .map(|(dir, _)| dir.rsplit('/').next().unwrap_or(dir).to_string())
}

fn display_path(file: &str, root: Option<&Path>) -> String {
    let path = Path::new(file);
    match root.and_then(|r| path.strip_prefix(r).ok()) {
        Some(rel) => rel.to_string_lossy().replace('\\', "/"),
        None => file.replace('\\', "/"),
    }
}
