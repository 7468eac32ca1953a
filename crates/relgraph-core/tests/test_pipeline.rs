//! Pipeline orchestration and end-to-end tests.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use pretty_assertions::assert_eq;
use relgraph_core::config::{IndexConfig, COMMUNITY_FILE_NAME, GRAPH_FILE_NAME};
use relgraph_core::graph::{load_communities, GraphStore};
use relgraph_core::pipeline::{run_pipeline, ProgressCallback};

#[test]
fn pipeline_reports_phases_in_order() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let callback: ProgressCallback = {
        let seen = Rc::clone(&seen);
        Box::new(move |phase, label| {
            seen.borrow_mut().push((phase.to_string(), label.to_string()));
        })
    };
    let output = run_pipeline(&fixture_config("python_simple"), Some(callback)).unwrap();

    let phases: Vec<String> = seen.borrow().iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(phases, vec!["chunking", "relationships", "communities", "persist"]);
    assert!(seen.borrow().iter().all(|(_, label)| !label.is_empty()));
    let timed: Vec<&String> = output.report.timings.keys().collect();
    assert_eq!(timed, vec!["chunking", "communities", "persist", "relationships"]);
}

#[test]
fn pipeline_stats() {
    let output = index_fixture("python_simple");
    let stats = &output.report.stats;
    assert_eq!(stats.files, 3);
    assert_eq!(stats.chunks, 12);
    assert_eq!(stats.nodes, 16);
    assert_eq!(stats.phantoms, 4);
    assert_eq!(stats.edges, output.store.edge_count());
    assert_eq!(stats.failed_chunks, 0);
    assert!(stats.resolved_targets > 0);
    assert!(stats.communities.count >= 3);
    assert!(output.report.graph_path.is_none());
}

#[test]
fn pipeline_persists_graph_and_communities() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig {
        output_dir: Some(dir.path().to_string_lossy().to_string()),
        ..fixture_config("python_simple")
    };
    let output = run_pipeline(&config, None).unwrap();

    let graph_path = dir.path().join(GRAPH_FILE_NAME);
    assert_eq!(
        output.report.graph_path.as_deref(),
        Some(&*graph_path.to_string_lossy())
    );
    let loaded = GraphStore::from_file(&graph_path).unwrap();
    assert_eq!(loaded.node_count(), output.store.node_count());
    assert_eq!(loaded.edge_count(), output.store.edge_count());
    assert_eq!(loaded.get_callees(MAIN), vec![SERVICE_CLASS, RUN]);

    let communities = load_communities(&dir.path().join(COMMUNITY_FILE_NAME)).unwrap();
    assert_eq!(communities, output.communities);
}

#[test]
fn communities_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig {
        output_dir: Some(dir.path().to_string_lossy().to_string()),
        detect_communities: false,
        ..fixture_config("python_simple")
    };
    let output = run_pipeline(&config, None).unwrap();
    assert!(output.communities.is_empty());
    assert_eq!(output.report.stats.communities.count, 0);
    assert!(output.report.communities_path.is_none());
    assert!(!dir.path().join(COMMUNITY_FILE_NAME).exists());
}

#[test]
fn pipeline_is_deterministic() {
    let a = index_fixture("python_simple");
    let b = index_fixture("python_simple");
    assert_eq!(a.communities, b.communities);
    assert_eq!(a.store.chunk_ids(), b.store.chunk_ids());
    assert_eq!(a.store.phantom_ids(), b.store.phantom_ids());
    for id in a.store.chunk_ids() {
        assert_eq!(a.store.get_callees(id), b.store.get_callees(id), "{id}");
    }
}

#[test]
fn report_serialises() {
    let output = index_fixture("python_simple");
    let json = serde_json::to_value(&output.report).unwrap();
    assert_eq!(json["stats"]["chunks"], 12);
    assert!(json["indexed_at"].as_str().is_some());
    assert!(json.get("graph_path").is_none());
}

#[test]
fn empty_repository_indexes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = IndexConfig {
        repo_path: dir.path().to_string_lossy().to_string(),
        ..IndexConfig::default()
    };
    let output = run_pipeline(&config, None).unwrap();
    assert_eq!(output.store.node_count(), 0);
    assert!(output.communities.is_empty());
    assert_eq!(output.report.stats.modularity, 0.0);
}
