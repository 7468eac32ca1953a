//! Subgraph extraction integration tests.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use relgraph_core::config::{IndexConfig, RelationshipType};
use relgraph_core::graph::{EdgeData, GraphStore};
use relgraph_core::subgraph::{extract_subgraph, BoundaryDirection, SubgraphOptions};

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn call_chain_is_topologically_ordered() {
    let output = index_fixture("python_simple");
    let sub = extract_subgraph(
        &output.store,
        &ids(&[HANDLE, RUN]),
        &ids(&[LOG_ERROR]),
        None,
        None,
        &SubgraphOptions::default(),
    );
    assert_eq!(sub.order(), vec![RUN, HANDLE, LOG_ERROR]);
    assert!(!sub.has_cycles);
    let internal: Vec<(&str, &str)> = sub
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(internal, vec![(HANDLE, LOG_ERROR), (RUN, HANDLE)]);
    assert_eq!(sub.nodes.iter().filter(|n| n.is_result).count(), 2);
}

#[test]
fn boundary_edges_are_capped_per_node() {
    let output = index_fixture("python_simple");
    let results = ids(&[RUN, HANDLE]);
    let ego = ids(&[LOG_ERROR]);

    let sub = extract_subgraph(&output.store, &results, &ego, None, None, &SubgraphOptions::default());
    let outgoing = |sub: &relgraph_core::subgraph::Subgraph| {
        sub.boundary_edges
            .iter()
            .filter(|e| e.direction == Some(BoundaryDirection::Outgoing))
            .count()
    };
    // run leaves the subgraph through Service.work, ValueError and ErrorHandler.
    assert_eq!(outgoing(&sub), 3);
    // main calls run; the Service class calls handle.
    assert_eq!(sub.boundary_edges.len(), 5);

    let capped = SubgraphOptions {
        max_boundary_edges: 1,
        ..SubgraphOptions::default()
    };
    let sub = extract_subgraph(&output.store, &results, &ego, None, None, &capped);
    assert_eq!(outgoing(&sub), 1);
    assert_eq!(sub.boundary_edges.len(), 3);
    // The cap keeps the earliest extracted edges, not the latest.
    let first_out = sub
        .boundary_edges
        .iter()
        .find(|e| e.direction == Some(BoundaryDirection::Outgoing))
        .unwrap();
    assert_eq!((first_out.source.as_str(), first_out.target.as_str()), (RUN, WORK));
    assert!(sub
        .boundary_edges
        .iter()
        .all(|e| results.contains(&e.source) || results.contains(&e.target)));

    let config = IndexConfig {
        include_boundary_edges: false,
        ..IndexConfig::default()
    };
    let sub = extract_subgraph(&output.store, &results, &ego, None, None, &SubgraphOptions::from_config(&config));
    assert!(sub.boundary_edges.is_empty());
}

#[test]
fn nodes_carry_chunk_metadata_and_annotations() {
    let output = index_fixture("python_simple");
    let scores = output.store.compute_centrality("pagerank").unwrap();
    let sub = extract_subgraph(
        &output.store,
        &ids(&[RUN]),
        &ids(&["ValueError", "not-in-graph"]),
        Some(&scores),
        Some(&output.communities),
        &SubgraphOptions::default(),
    );
    assert_eq!(sub.nodes.len(), 2);

    let run = sub.nodes.iter().find(|n| n.id == RUN).unwrap();
    assert_eq!(run.name.as_deref(), Some("run"));
    assert_eq!(run.kind.as_deref(), Some("method"));
    assert_eq!(run.file.as_deref(), Some("app/service.py"));
    assert_eq!((run.start_line, run.end_line), (Some(5), Some(10)));
    assert_eq!(run.community, Some(output.communities[RUN]));
    assert!(run.centrality.is_some());

    let phantom = sub.nodes.iter().find(|n| n.id == "ValueError").unwrap();
    assert!(!phantom.is_result);
    assert_eq!(phantom.file, None);
    assert_eq!(phantom.community, None);

    assert_eq!(sub.communities.len(), 1);
    assert_eq!(sub.communities[0].member_count, 1);
    assert_eq!(sub.communities[0].label.as_deref(), Some("app"));
    assert_eq!(sub.edges[0].relationship_type, "catches");
}

#[test]
fn cycles_keep_components_together() {
    let mut store = GraphStore::new();
    for (s, t) in [("c", "a"), ("a", "b"), ("b", "a")] {
        store.add_edge(s, t, EdgeData::new(RelationshipType::Calls, 1));
    }
    let sub = extract_subgraph(
        &store,
        &ids(&["a", "b", "c"]),
        &[],
        None,
        None,
        &SubgraphOptions::default(),
    );
    assert!(sub.has_cycles);
    assert_eq!(sub.order(), vec!["c", "a", "b"]);
}

#[test]
fn serialises_without_empty_sections() {
    let mut store = GraphStore::new();
    store.add_edge("a", "b", EdgeData::new(RelationshipType::Imports, 3));
    let sub = extract_subgraph(
        &store,
        &ids(&["a", "b"]),
        &[],
        None,
        None,
        &SubgraphOptions::default(),
    );
    let json = serde_json::to_value(&sub).unwrap();
    assert!(json.get("boundary_edges").is_none());
    assert!(json.get("communities").is_none());
    assert_eq!(json["edges"][0]["relationship_type"], "imports");
    assert_eq!(json["edges"][0]["line_number"], 3);
    assert_eq!(json["has_cycles"], false);
}
