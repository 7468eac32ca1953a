//! Sequential phase orchestrator with timing.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::config::{Chunk, IndexConfig, COMMUNITY_FILE_NAME, GRAPH_FILE_NAME};
use crate::error::Result;
use crate::graph::{save_communities, GraphStore};
use crate::phases;
use crate::phases::communities::{community_stats, CommunityStats};
use crate::phases::relationships::RelationshipStats;

/// Phase labels for progress reporting.
const PHASE_LABELS: &[(&str, &str)] = &[
    ("chunking", "Chunking source files"),
    ("relationships", "Extracting relationships"),
    ("communities", "Detecting communities"),
    ("persist", "Saving graph"),
];

/// Progress callback type: (phase_name, label).
pub type ProgressCallback = Box<dyn FnMut(&str, &str)>;

/// Type alias for phase function closures to keep signatures readable.
type PhaseFn = Box<dyn FnOnce(&IndexConfig, &mut PipelineState) -> Result<()>>;

/// Everything the phases build up.
#[derive(Default)]
struct PipelineState {
    chunks: Vec<Chunk>,
    store: GraphStore,
    relationships: RelationshipStats,
    communities: HashMap<String, usize>,
    modularity: f64,
    graph_path: Option<PathBuf>,
    communities_path: Option<PathBuf>,
}

/// Summary counters of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub files: usize,
    pub chunks: usize,
    pub nodes: usize,
    pub edges: usize,
    pub phantoms: usize,
    pub resolved_targets: usize,
    pub failed_chunks: usize,
    pub communities: CommunityStats,
    pub modularity: f64,
}

/// Serialisable report of an indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub repo_path: String,
    pub indexed_at: String,
    pub stats: IndexStats,
    /// Seconds per phase.
    pub timings: BTreeMap<String, f64>,
    pub total_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communities_path: Option<String>,
}

/// What an indexing run produced.
pub struct IndexOutput {
    pub store: GraphStore,
    pub communities: HashMap<String, usize>,
    pub report: IndexReport,
}

/// Execute the indexing pipeline: chunk, extract, cluster, persist.
///
/// Persisting only happens when `config.output_dir` is set.
pub fn run_pipeline(
    config: &IndexConfig,
    mut progress_callback: Option<ProgressCallback>,
) -> Result<IndexOutput> {
    let mut state = PipelineState::default();
    let mut timings: BTreeMap<String, f64> = BTreeMap::new();
    let total_start = Instant::now();

    let phase_fns: Vec<(&str, PhaseFn)> = vec![
        (
            "chunking",
            Box::new(|config, state| {
                state.chunks = phases::chunking::run_chunking_phase(config);
                Ok(())
            }),
        ),
        (
            "relationships",
            Box::new(|config, state| {
                state.relationships = phases::relationships::run_relationships_phase(
                    &state.chunks,
                    &mut state.store,
                    config.threads,
                );
                Ok(())
            }),
        ),
        (
            "communities",
            Box::new(|config, state| {
                if config.detect_communities {
                    let result = phases::communities::run_communities_phase(
                        &state.store,
                        config.resolution,
                        config.seed,
                    );
                    state.communities = result.assignments;
                    state.modularity = result.modularity;
                }
                Ok(())
            }),
        ),
        (
            "persist",
            Box::new(|config, state| {
                let Some(dir) = config.output_dir.as_deref() else {
                    return Ok(());
                };
                let dir = Path::new(dir);
                let graph_path = dir.join(GRAPH_FILE_NAME);
                state.store.save(&graph_path)?;
                state.graph_path = Some(graph_path);
                if config.detect_communities {
                    let communities_path = dir.join(COMMUNITY_FILE_NAME);
                    save_communities(&communities_path, &state.communities)?;
                    state.communities_path = Some(communities_path);
                }
                Ok(())
            }),
        ),
    ];

    for (name, phase_fn) in phase_fns {
        // Report progress
        if let Some(ref mut cb) = progress_callback {
            let label = PHASE_LABELS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, l)| *l)
                .unwrap_or(name);
            cb(name, label);
        }

        let start = Instant::now();
        phase_fn(config, &mut state)?;
        let elapsed = start.elapsed().as_secs_f64();
        log::info!("Phase {name} finished in {:.1}ms", elapsed * 1000.0);
        timings.insert(name.to_string(), elapsed);
    }

    let total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
    let report = build_report(config, &state, timings, total_ms);
    Ok(IndexOutput {
        store: state.store,
        communities: state.communities,
        report,
    })
}

fn build_report(
    config: &IndexConfig,
    state: &PipelineState,
    timings: BTreeMap<String, f64>,
    total_ms: f64,
) -> IndexReport {
    let mut files: Vec<&str> = state.chunks.iter().map(|c| c.file.as_str()).collect();
    files.sort_unstable();
    files.dedup();

    let path_string = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().to_string());

    IndexReport {
        repo_path: config.repo_path.clone(),
        indexed_at: Utc::now().to_rfc3339(),
        stats: IndexStats {
            files: files.len(),
            chunks: state.chunks.len(),
            nodes: state.store.node_count(),
            edges: state.store.edge_count(),
            phantoms: state.store.phantom_ids().len(),
            resolved_targets: state.relationships.resolved_targets,
            failed_chunks: state.relationships.failed_chunks,
            communities: community_stats(&state.communities),
            modularity: state.modularity,
        },
        timings,
        total_ms,
        graph_path: path_string(&state.graph_path),
        communities_path: path_string(&state.communities_path),
    }
}
