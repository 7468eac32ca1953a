//! Traversal, path and centrality queries over a [`GraphStore`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::store::GraphStore;
use crate::config::RelationshipType;
use crate::error::{GraphError, Result};

/// PageRank damping factor.
const PAGERANK_ALPHA: f64 = 0.85;
const PAGERANK_MAX_ITERATIONS: usize = 100;
const PAGERANK_EPSILON: f64 = 1e-10;

/// Supported centrality measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentralityMethod {
    Degree,
    Betweenness,
    Closeness,
    PageRank,
}

impl CentralityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Degree => "degree",
            Self::Betweenness => "betweenness",
            Self::Closeness => "closeness",
            Self::PageRank => "pagerank",
        }
    }
}

impl FromStr for CentralityMethod {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "degree" => Ok(Self::Degree),
            "betweenness" => Ok(Self::Betweenness),
            "closeness" => Ok(Self::Closeness),
            "pagerank" => Ok(Self::PageRank),
            other => Err(GraphError::UnsupportedOperation(format!(
                "unknown centrality method '{other}'"
            ))),
        }
    }
}

impl GraphStore {
    /// Shortest directed path by hop count, following only `edge_types`
    /// when given. `None` when either end is unknown, the target is
    /// unreachable or further than `max_hops`.
    pub fn find_path(
        &self,
        source: &str,
        target: &str,
        max_hops: usize,
        edge_types: Option<&[&str]>,
    ) -> Option<Vec<String>> {
        let start = self.node_index(source)?;
        let goal = self.node_index(target)?;
        if start == goal {
            return Some(vec![source.to_string()]);
        }

        let allowed: Option<HashSet<RelationshipType>> = edge_types.map(|types| {
            types
                .iter()
                .filter_map(|t| RelationshipType::from_str_value(t))
                .collect()
        });
        let graph = self.graph();

        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut visited = HashSet::from([start]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            let mut edges: Vec<_> = graph
                .edges_directed(node, Direction::Outgoing)
                .filter(|e| {
                    allowed
                        .as_ref()
                        .map_or(true, |a| a.contains(&e.weight().relationship_type))
                })
                .collect();
            edges.sort_by_key(|e| e.id());
            for edge in edges {
                let next = edge.target();
                if !visited.insert(next) {
                    continue;
                }
                parent.insert(next, node);
                if next == goal {
                    let mut path = vec![goal];
                    let mut current = goal;
                    while let Some(&prev) = parent.get(&current) {
                        path.push(prev);
                        current = prev;
                    }
                    path.reverse();
                    return Some(path.into_iter().map(|i| self.node_id(i).to_string()).collect());
                }
                queue.push_back((next, depth + 1));
            }
        }
        None
    }

    /// Transitive callers grouped by distance: element `i` holds the nodes
    /// first reached at depth `i + 1`.
    pub fn find_all_callers(&self, id: &str, max_depth: usize) -> Vec<Vec<String>> {
        self.call_levels(id, max_depth, Direction::Incoming)
    }

    /// Transitive callees grouped by distance.
    pub fn find_all_callees(&self, id: &str, max_depth: usize) -> Vec<Vec<String>> {
        self.call_levels(id, max_depth, Direction::Outgoing)
    }

    fn call_levels(&self, id: &str, max_depth: usize, direction: Direction) -> Vec<Vec<String>> {
        let Some(start) = self.node_index(id) else {
            return Vec::new();
        };
        let graph = self.graph();
        let mut visited = HashSet::from([start]);
        let mut frontier = vec![start];
        let mut levels = Vec::new();

        for _ in 0..max_depth {
            let mut next = Vec::new();
            for &node in &frontier {
                let mut edges: Vec<_> = graph
                    .edges_directed(node, direction)
                    .filter(|e| e.weight().relationship_type == RelationshipType::Calls)
                    .collect();
                edges.sort_by_key(|e| e.id());
                for edge in edges {
                    let other = match direction {
                        Direction::Incoming => edge.source(),
                        Direction::Outgoing => edge.target(),
                    };
                    if visited.insert(other) {
                        next.push(other);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            levels.push(next.iter().map(|&i| self.node_id(i).to_string()).collect());
            frontier = next;
        }
        levels
    }

    /// Chunk nodes nothing points at.
    pub fn find_entry_points(&self) -> Vec<String> {
        self.chunks_without(Direction::Incoming)
    }

    /// Chunk nodes that point at nothing.
    pub fn find_leaf_functions(&self) -> Vec<String> {
        self.chunks_without(Direction::Outgoing)
    }

    fn chunks_without(&self, direction: Direction) -> Vec<String> {
        let graph = self.graph();
        let mut ids: Vec<String> = graph
            .node_indices()
            .filter(|&idx| graph[idx].is_chunk())
            .filter(|&idx| graph.edges_directed(idx, direction).next().is_none())
            .map(|idx| self.node_id(idx).to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Centrality score of every node. `method` is one of `degree`,
    /// `betweenness`, `closeness` or `pagerank`.
    pub fn compute_centrality(&self, method: &str) -> Result<HashMap<String, f64>> {
        let method: CentralityMethod = method.parse()?;
        let adjacency = Adjacency::from_store(self);
        let scores = match method {
            CentralityMethod::Degree => adjacency.degree(),
            CentralityMethod::Betweenness => adjacency.betweenness(),
            CentralityMethod::Closeness => adjacency.closeness(),
            CentralityMethod::PageRank => adjacency.pagerank(),
        };
        Ok(self
            .graph()
            .node_indices()
            .zip(scores)
            .map(|(idx, score)| (self.node_id(idx).to_string(), score))
            .collect())
    }
}

/// Simple directed adjacency: parallel edges of different types between the
/// same pair count once; self-loops are dropped.
struct Adjacency {
    out: Vec<Vec<usize>>,
    inc: Vec<Vec<usize>>,
}

impl Adjacency {
    fn from_store(store: &GraphStore) -> Self {
        let graph = store.graph();
        let n = graph.node_count();
        let mut out = vec![Vec::new(); n];
        let mut inc = vec![Vec::new(); n];
        let mut seen = HashSet::new();
        for edge in graph.edge_references() {
            let (s, t) = (edge.source().index(), edge.target().index());
            if s != t && seen.insert((s, t)) {
                out[s].push(t);
                inc[t].push(s);
            }
        }
        Self { out, inc }
    }

    fn len(&self) -> usize {
        self.out.len()
    }

    fn degree(&self) -> Vec<f64> {
        let n = self.len();
        if n <= 1 {
            return vec![1.0; n];
        }
        let scale = 1.0 / (n - 1) as f64;
        (0..n)
            .map(|v| (self.out[v].len() + self.inc[v].len()) as f64 * scale)
            .collect()
    }

    /// Brandes' algorithm, normalised by `(n - 1)(n - 2)`.
    fn betweenness(&self) -> Vec<f64> {
        let n = self.len();
        let mut centrality = vec![0.0; n];
        for s in 0..n {
            let mut stack = Vec::with_capacity(n);
            let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0_f64; n];
            let mut dist = vec![-1_i64; n];
            sigma[s] = 1.0;
            dist[s] = 0;
            let mut queue = VecDeque::from([s]);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for &w in &self.out[v] {
                    if dist[w] < 0 {
                        dist[w] = dist[v] + 1;
                        queue.push_back(w);
                    }
                    if dist[w] == dist[v] + 1 {
                        sigma[w] += sigma[v];
                        preds[w].push(v);
                    }
                }
            }
            let mut delta = vec![0.0_f64; n];
            while let Some(w) = stack.pop() {
                for &v in &preds[w] {
                    delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
                }
                if w != s {
                    centrality[w] += delta[w];
                }
            }
        }
        if n > 2 {
            let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
            for c in &mut centrality {
                *c *= scale;
            }
        }
        centrality
    }

    /// Closeness over incoming distances, scaled by the reachable fraction
    /// so partially connected graphs stay comparable.
    fn closeness(&self) -> Vec<f64> {
        let n = self.len();
        (0..n)
            .map(|u| {
                let mut dist = vec![usize::MAX; n];
                dist[u] = 0;
                let mut queue = VecDeque::from([u]);
                let mut total = 0usize;
                let mut reached = 0usize;
                while let Some(v) = queue.pop_front() {
                    for &w in &self.inc[v] {
                        if dist[w] == usize::MAX {
                            dist[w] = dist[v] + 1;
                            total += dist[w];
                            reached += 1;
                            queue.push_back(w);
                        }
                    }
                }
                if total == 0 || n <= 1 {
                    return 0.0;
                }
                let r = reached as f64;
                (r / total as f64) * (r / (n - 1) as f64)
            })
            .collect()
    }

    /// Power iteration with dangling mass spread uniformly.
    fn pagerank(&self) -> Vec<f64> {
        let n = self.len();
        if n == 0 {
            return Vec::new();
        }
        let uniform = 1.0 / n as f64;
        let mut ranks = vec![uniform; n];
        let mut next = vec![0.0; n];

        for _ in 0..PAGERANK_MAX_ITERATIONS {
            let dangling: f64 = (0..n)
                .filter(|&v| self.out[v].is_empty())
                .map(|v| ranks[v])
                .sum();
            for v in 0..n {
                let incoming: f64 = self.inc[v]
                    .iter()
                    .map(|&p| ranks[p] / self.out[p].len() as f64)
                    .sum();
                next[v] = (1.0 - PAGERANK_ALPHA) * uniform
                    + PAGERANK_ALPHA * incoming
                    + PAGERANK_ALPHA * dangling * uniform;
            }
            let change: f64 = ranks.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
            std::mem::swap(&mut ranks, &mut next);
            if change < PAGERANK_EPSILON * n as f64 {
                break;
            }
        }
        ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::EdgeData;

    fn store_with(edges: &[(&str, &str)]) -> GraphStore {
        let mut store = GraphStore::new();
        for (from, to) in edges {
            store.add_edge(from, to, EdgeData::new(RelationshipType::Calls, 1));
        }
        store
    }

    #[test]
    fn path_to_self_and_unreachable() {
        let store = store_with(&[("A", "B"), ("B", "C")]);
        assert_eq!(store.find_path("A", "A", 3, None), Some(vec!["A".to_string()]));
        assert_eq!(store.find_path("C", "A", 3, None), None);
        assert_eq!(store.find_path("A", "missing", 3, None), None);
    }

    #[test]
    fn path_respects_hop_budget_and_type_filter() {
        let mut store = store_with(&[("A", "B"), ("B", "C")]);
        store.add_edge("A", "C", EdgeData::new(RelationshipType::Imports, 1));

        assert_eq!(
            store.find_path("A", "C", 5, None),
            Some(vec!["A".to_string(), "C".to_string()])
        );
        assert_eq!(
            store.find_path("A", "C", 5, Some(&["calls"])),
            Some(vec!["A".to_string(), "B".to_string(), "C".to_string()])
        );
        assert_eq!(store.find_path("A", "C", 1, Some(&["calls"])), None);
    }

    #[test]
    fn caller_levels_are_not_cumulative() {
        let store = store_with(&[("A", "B"), ("B", "C"), ("C", "A"), ("D", "C")]);
        let levels = store.find_all_callers("C", 5);
        assert_eq!(levels.len(), 2);
        let mut first = levels[0].clone();
        first.sort();
        assert_eq!(first, vec!["B", "D"]);
        assert_eq!(levels[1], vec!["A"]);

        assert_eq!(store.find_all_callees("A", 1), vec![vec!["B".to_string()]]);
    }

    #[test]
    fn unknown_centrality_method() {
        let store = store_with(&[("A", "B")]);
        let err = store.compute_centrality("eigenvector").unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedOperation(_)));
    }

    #[test]
    fn betweenness_of_chain_middle() {
        let store = store_with(&[("A", "B"), ("B", "C")]);
        let scores = store.compute_centrality("betweenness").unwrap();
        assert!((scores["B"] - 0.5).abs() < 1e-9);
        assert_eq!(scores["A"], 0.0);
    }

    #[test]
    fn pagerank_sums_to_one() {
        let store = store_with(&[("A", "B"), ("B", "C"), ("C", "A"), ("D", "A")]);
        let scores = store.compute_centrality("pagerank").unwrap();
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(scores["A"] > scores["D"]);
    }

    #[test]
    fn degree_and_closeness() {
        let store = store_with(&[("A", "B"), ("C", "B")]);
        let degree = store.compute_centrality("degree").unwrap();
        assert!((degree["B"] - 1.0).abs() < 1e-9);
        let closeness = store.compute_centrality("closeness").unwrap();
        assert!((closeness["B"] - 1.0).abs() < 1e-9);
        assert_eq!(closeness["A"], 0.0);
    }
}
