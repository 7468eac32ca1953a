//! Traversal and centrality over the indexed fixture.

mod common;

use std::collections::HashSet;

use common::*;
use pretty_assertions::assert_eq;
use relgraph_core::config::default_edge_weights;
use relgraph_core::graph::GraphStore;
use relgraph_core::GraphError;

fn fixture_store() -> GraphStore {
    index_fixture("python_simple").store
}

// ===========================================================================
// Graph shape
// ===========================================================================

#[test]
fn fixture_graph_shape() {
    let store = fixture_store();
    assert_eq!(store.chunk_count(), 12);
    assert_eq!(
        store.phantom_ids(),
        vec!["print", "super", "app.handlers.ErrorHandler", "ValueError"]
    );
    assert_eq!(store.node_count(), 16);
}

#[test]
fn direct_callers_and_callees() {
    let store = fixture_store();
    assert_eq!(store.get_callers(LOG_ERROR), vec![HANDLER_CLASS, HANDLE]);
    assert_eq!(store.get_callees(MAIN), vec![SERVICE_CLASS, RUN]);
    assert_eq!(store.get_callees(USER_CLASS), vec![BASE_CLASS, BASE_SAVE, "super"]);
    assert!(store.get_callers("nope").is_empty());
}

// ===========================================================================
// Path finding
// ===========================================================================

#[test]
fn shortest_path_prefers_earliest_edges() {
    let store = fixture_store();
    assert_eq!(
        store.find_path(MAIN, LOG_ERROR, 5, None),
        Some(vec![
            MAIN.to_string(),
            SERVICE_CLASS.to_string(),
            HANDLER_CLASS.to_string(),
            LOG_ERROR.to_string(),
        ])
    );
}

#[test]
fn path_respects_hops_and_types() {
    let store = fixture_store();
    assert_eq!(store.find_path(MAIN, LOG_ERROR, 2, None), None);
    assert_eq!(store.find_path(MAIN, LOG_ERROR, 5, Some(&["imports"][..])), None);
    assert_eq!(store.find_path(LOG_ERROR, MAIN, 10, None), None);
    assert_eq!(store.find_path(MAIN, MAIN, 0, None), Some(vec![MAIN.to_string()]));
    assert_eq!(
        store.find_path(USER_CLASS, BASE_CLASS, 3, Some(&["inherits"][..])),
        Some(vec![USER_CLASS.to_string(), BASE_CLASS.to_string()])
    );
}

#[test]
fn transitive_callers_by_level() {
    let store = fixture_store();
    assert_eq!(
        store.find_all_callers(LOG_ERROR, 5),
        vec![
            vec![HANDLER_CLASS.to_string(), HANDLE.to_string()],
            vec![SERVICE_CLASS.to_string(), RUN.to_string()],
            vec![MAIN.to_string()],
        ]
    );
    assert_eq!(store.find_all_callers(LOG_ERROR, 1).len(), 1);
}

#[test]
fn transitive_callees_by_level() {
    let store = fixture_store();
    let levels = store.find_all_callees(MAIN, 3);
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0], vec![SERVICE_CLASS, RUN]);
    assert_eq!(levels[1], vec![WORK, HANDLER_CLASS, HANDLE, "ValueError"]);
    assert_eq!(levels[2], vec![LOG_ERROR]);
}

#[test]
fn entry_points_and_leaves() {
    let store = fixture_store();
    assert_eq!(
        store.find_entry_points(),
        vec![USER_CLASS, USER_SAVE, SERVICE_MODULE, MAIN]
    );
    assert_eq!(store.find_leaf_functions(), vec![BASE_CLASS, BASE_SAVE]);
}

// ===========================================================================
// Neighbourhoods
// ===========================================================================

#[test]
fn neighbours_forward_and_inverse() {
    let store = fixture_store();
    assert_eq!(
        store.get_neighbors(RUN, &["calls"], 1, None),
        vec![WORK, HANDLER_CLASS, HANDLE]
    );
    assert_eq!(store.get_neighbors(RUN, &["called_by"], 3, None), vec![MAIN]);
    assert_eq!(store.get_neighbors(RUN, &["caught_by"], 1, None), Vec::<String>::new());
    assert_eq!(store.get_neighbors(RUN, &["catches"], 1, None), vec!["ValueError"]);
    assert!(store.get_neighbors(RUN, &["bogus"], 2, None).is_empty());
}

#[test]
fn weighting_reorders_but_keeps_the_reachable_set() {
    let store = fixture_store();
    let relations = ["calls", "called_by", "catches"];
    let weights = default_edge_weights();
    let plain = store.get_neighbors(RUN, &relations, 2, None);
    let weighted = store.get_neighbors(RUN, &relations, 2, Some(&weights));

    let a: HashSet<&String> = plain.iter().collect();
    let b: HashSet<&String> = weighted.iter().collect();
    assert_eq!(a, b);
    assert!(!plain.contains(&RUN.to_string()));
    // The catches edge weighs less than every calls edge.
    assert_eq!(weighted[3], MAIN);
    assert_eq!(weighted[4], "ValueError");
}

// ===========================================================================
// Centrality
// ===========================================================================

#[test]
fn every_node_gets_a_score() {
    let store = fixture_store();
    for method in ["degree", "betweenness", "closeness", "pagerank"] {
        let scores = store.compute_centrality(method).unwrap();
        assert_eq!(scores.len(), store.node_count(), "{method}");
        assert!(scores.values().all(|s| s.is_finite() && *s >= 0.0), "{method}");
    }
}

#[test]
fn degree_counts_distinct_neighbours() {
    let scores = fixture_store().compute_centrality("degree").unwrap();
    assert!((scores[SERVICE_CLASS] - 5.0 / 15.0).abs() < 1e-9);
    assert!((scores[RUN] - 5.0 / 15.0).abs() < 1e-9);
    assert!((scores[BASE_SAVE] - 2.0 / 15.0).abs() < 1e-9);
}

#[test]
fn sources_have_no_closeness_or_betweenness() {
    let store = fixture_store();
    let closeness = store.compute_centrality("closeness").unwrap();
    let betweenness = store.compute_centrality("betweenness").unwrap();
    assert_eq!(closeness[MAIN], 0.0);
    assert_eq!(betweenness[MAIN], 0.0);
    assert!(closeness[LOG_ERROR] > 0.0);
    assert!(betweenness[HANDLER_CLASS] > 0.0);
}

#[test]
fn pagerank_is_a_distribution() {
    let scores = fixture_store().compute_centrality("pagerank").unwrap();
    let total: f64 = scores.values().sum();
    assert!((total - 1.0).abs() < 1e-6);
    assert!(scores[LOG_ERROR] > scores[MAIN]);
}

#[test]
fn unknown_centrality_is_unsupported() {
    let err = fixture_store().compute_centrality("eigenvector").unwrap_err();
    assert!(matches!(err, GraphError::UnsupportedOperation(_)));
}
