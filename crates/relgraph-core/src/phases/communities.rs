//! Community detection via the Louvain algorithm.
//!
//! Runs over an undirected projection of the relationship graph that keeps
//! only chunk nodes. Phantom nodes are collapsed: every pair of chunks that
//! reference the same unresolved name gets a synthetic edge.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::{GraphError, Result};
use crate::graph::GraphStore;

/// Outcome of one detection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommunityResult {
    /// chunk id -> community id
    pub assignments: HashMap<String, usize>,
    pub modularity: f64,
}

/// Size summary of a community map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommunityStats {
    pub count: usize,
    pub avg_size: f64,
    pub largest: usize,
    pub smallest: usize,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Detect communities, logging failures and returning an empty result
/// instead of propagating them.
pub fn run_communities_phase(store: &GraphStore, resolution: f64, seed: u64) -> CommunityResult {
    match detect_communities(store, resolution, seed) {
        Ok(result) => {
            log::info!(
                "Detected {} communities (modularity {:.4})",
                community_stats(&result.assignments).count,
                result.modularity
            );
            result
        }
        Err(e) => {
            log::warn!("Community detection failed: {e}");
            CommunityResult::default()
        }
    }
}

/// Louvain modularity maximisation over the chunk projection of `store`.
///
/// Community ids are numbered by each community's smallest member id, so the
/// same graph, resolution and seed always give the same map.
pub fn detect_communities(store: &GraphStore, resolution: f64, seed: u64) -> Result<CommunityResult> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(GraphError::AlgorithmFailure(format!(
            "resolution must be a positive number, got {resolution}"
        )));
    }

    let adj = project(store);
    if adj.nodes.is_empty() {
        return Ok(CommunityResult::default());
    }

    let groups = louvain(&adj, resolution, seed);
    let modularity = modularity(&adj, &groups, resolution);
    if !modularity.is_finite() {
        return Err(GraphError::AlgorithmFailure(
            "modularity did not converge to a finite value".to_string(),
        ));
    }

    let mut communities: Vec<Vec<&str>> = groups
        .iter()
        .map(|group| {
            let mut members: Vec<&str> = group.iter().map(|&i| adj.nodes[i].as_str()).collect();
            members.sort_unstable();
            members
        })
        .collect();
    communities.sort_by(|a, b| a[0].cmp(b[0]));

    let assignments = communities
        .iter()
        .enumerate()
        .flat_map(|(id, members)| members.iter().map(move |m| (m.to_string(), id)))
        .collect();

    Ok(CommunityResult {
        assignments,
        modularity,
    })
}

/// Count and size summary of a community map.
pub fn community_stats(assignments: &HashMap<String, usize>) -> CommunityStats {
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for community in assignments.values() {
        *sizes.entry(*community).or_insert(0) += 1;
    }
    if sizes.is_empty() {
        return CommunityStats::default();
    }
    CommunityStats {
        count: sizes.len(),
        avg_size: assignments.len() as f64 / sizes.len() as f64,
        largest: sizes.values().copied().max().unwrap_or(0),
        smallest: sizes.values().copied().min().unwrap_or(0),
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn project(store: &GraphStore) -> AdjList {
    let mut adj = AdjList::new();

    let mut chunk_ids = store.chunk_ids();
    chunk_ids.sort_unstable();
    for id in &chunk_ids {
        adj.ensure_node(id);
    }

    // Direct chunk-to-chunk edges, weighted by occurrence count.
    for edge in store.edges() {
        if edge.source == edge.target {
            continue;
        }
        if adj.node_map.contains_key(edge.source) && adj.node_map.contains_key(edge.target) {
            adj.add_edge(edge.source, edge.target, f64::from(edge.data.weight));
        }
    }

    // Co-reference collapse through phantom nodes.
    let mut phantoms = store.phantom_ids();
    phantoms.sort_unstable();
    for phantom in phantoms {
        let mut callers: Vec<String> = store
            .get_callers(phantom)
            .into_iter()
            .filter(|id| adj.node_map.contains_key(id.as_str()))
            .collect();
        callers.sort_unstable();
        callers.dedup();
        for (i, a) in callers.iter().enumerate() {
            for b in &callers[i + 1..] {
                adj.add_edge(a, b, 1.0);
            }
        }
    }

    adj
}

// ---------------------------------------------------------------------------
// Adjacency list for undirected weighted graph
// ---------------------------------------------------------------------------

struct AdjList {
    /// node_id -> index
    node_map: HashMap<String, usize>,
    /// index -> node_id
    nodes: Vec<String>,
    /// adjacency: index -> Vec<(neighbour_index, weight)>
    adj: Vec<Vec<(usize, f64)>>,
}

impl AdjList {
    fn new() -> Self {
        Self {
            node_map: HashMap::new(),
            nodes: Vec::new(),
            adj: Vec::new(),
        }
    }

    fn ensure_node(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.node_map.get(id) {
            idx
        } else {
            let idx = self.nodes.len();
            self.node_map.insert(id.to_string(), idx);
            self.nodes.push(id.to_string());
            self.adj.push(Vec::new());
            idx
        }
    }

    fn add_edge(&mut self, a: &str, b: &str, weight: f64) {
        let ai = self.ensure_node(a);
        let bi = self.ensure_node(b);
        add_weight(&mut self.adj[ai], bi, weight);
        add_weight(&mut self.adj[bi], ai, weight);
    }

    fn total_weight(&self) -> f64 {
        let total: f64 = self.adj.iter().flatten().map(|&(_, w)| w).sum();
        total / 2.0 // Each edge counted twice
    }
}

fn add_weight(neighbours: &mut Vec<(usize, f64)>, to: usize, weight: f64) {
    if let Some(entry) = neighbours.iter_mut().find(|(n, _)| *n == to) {
        entry.1 += weight;
    } else {
        neighbours.push((to, weight));
    }
}

// ---------------------------------------------------------------------------
// Louvain algorithm
// ---------------------------------------------------------------------------

/// Run Louvain with multi-level aggregation:
///   Phase 1: local node moves to maximise modularity gain, nodes visited in
///             a seeded random order
///   Phase 2: contract the graph (communities become super-nodes; internal
///             weight is kept as a self-loop)
///
/// Returns groups of original node indices.
fn louvain(adj: &AdjList, resolution: f64, seed: u64) -> Vec<Vec<usize>> {
    let n = adj.nodes.len();
    let m = adj.total_weight();
    if m == 0.0 {
        // No edges: each node is its own community
        return (0..n).map(|i| vec![i]).collect();
    }
    let m2 = m * 2.0; // constant across all levels
    let mut rng = StdRng::seed_from_u64(seed);

    // groups[i] = original-graph node indices belonging to current super-node i
    let mut groups: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut cur_adj: Vec<Vec<(usize, f64)>> = adj.adj.clone();
    let mut cur_n = n;

    loop {
        if cur_n < 2 {
            break;
        }

        // Weighted degree, self-loops included
        let degree: Vec<f64> = (0..cur_n)
            .map(|i| cur_adj[i].iter().map(|&(_, w)| w).sum())
            .collect();

        // ---- Phase 1: local node moves ----
        let mut community: Vec<usize> = (0..cur_n).collect();
        let mut sigma_tot: Vec<f64> = degree.clone();
        let mut order: Vec<usize> = (0..cur_n).collect();
        order.shuffle(&mut rng);
        let mut any_moved = false;

        let mut improved = true;
        let mut iters = 0;
        while improved && iters < 100 {
            improved = false;
            iters += 1;

            for &i in &order {
                let ci = community[i];
                let ki = degree[i];

                let mut comm_weights: BTreeMap<usize, f64> = BTreeMap::new();
                for &(j, w) in &cur_adj[i] {
                    if j == i {
                        continue;
                    }
                    *comm_weights.entry(community[j]).or_insert(0.0) += w;
                }

                let ki_in = comm_weights.get(&ci).copied().unwrap_or(0.0);

                // Temporarily remove i from its community
                sigma_tot[ci] -= ki;

                let mut best_comm = ci;
                let mut best_gain = 0.0;
                let loss = ki_in - resolution * sigma_tot[ci] * ki / m2;

                for (&cj, &kj_in) in &comm_weights {
                    let gain = kj_in - resolution * sigma_tot[cj] * ki / m2;
                    let delta = gain - loss;
                    if delta > best_gain || (delta == best_gain && cj < best_comm) {
                        best_gain = delta;
                        best_comm = cj;
                    }
                }

                if best_gain <= 0.0 {
                    best_comm = ci;
                }

                community[i] = best_comm;
                sigma_tot[best_comm] += ki;

                if best_comm != ci {
                    improved = true;
                    any_moved = true;
                }
            }
        }

        if !any_moved {
            break;
        }

        // Compact community labels to 0..new_n, in node order
        let mut label_map: HashMap<usize, usize> = HashMap::new();
        for &c in &community {
            let next = label_map.len();
            label_map.entry(c).or_insert(next);
        }
        let mapped: Vec<usize> = community.iter().map(|c| label_map[c]).collect();
        let new_n = label_map.len();

        if new_n == cur_n {
            break;
        }

        let mut new_groups: Vec<Vec<usize>> = vec![Vec::new(); new_n];
        for (i, &c) in mapped.iter().enumerate() {
            new_groups[c].extend_from_slice(&groups[i]);
        }
        groups = new_groups;

        // ---- Phase 2: contract graph ----
        let mut new_adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); new_n];
        for i in 0..cur_n {
            let ci = mapped[i];
            for &(j, w) in &cur_adj[i] {
                add_weight(&mut new_adj[ci], mapped[j], w);
            }
        }

        cur_adj = new_adj;
        cur_n = new_n;
    }

    groups
}

/// Newman modularity of a partition, with resolution.
fn modularity(adj: &AdjList, groups: &[Vec<usize>], resolution: f64) -> f64 {
    let m = adj.total_weight();
    if m == 0.0 {
        return 0.0;
    }
    let mut community_of = vec![0usize; adj.nodes.len()];
    for (c, group) in groups.iter().enumerate() {
        for &node in group {
            community_of[node] = c;
        }
    }
    let mut internal = vec![0.0; groups.len()];
    let mut degree = vec![0.0; groups.len()];
    for (i, neighbours) in adj.adj.iter().enumerate() {
        for &(j, w) in neighbours {
            degree[community_of[i]] += w;
            if community_of[i] == community_of[j] {
                internal[community_of[i]] += w;
            }
        }
    }
    internal
        .iter()
        .zip(&degree)
        .map(|(&l, &d)| l / (2.0 * m) - resolution * (d / (2.0 * m)).powi(2))
        .sum()
}
