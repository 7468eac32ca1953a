//! JSON persistence for the graph and the community map.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::store::{EdgeData, GraphStore, NodeData};
use crate::config::RelationshipType;
use crate::error::Result;

#[derive(Debug, Serialize, Deserialize)]
struct GraphDocument {
    directed: bool,
    nodes: Vec<NodeData>,
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EdgeRecord {
    source: String,
    target: String,
    /// Older documents call this attribute `type`.
    #[serde(alias = "type")]
    relationship_type: RelationshipType,
    #[serde(default)]
    line_number: usize,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    is_method_call: bool,
    #[serde(default = "default_weight")]
    weight: u32,
}

fn default_confidence() -> f64 {
    1.0
}

fn default_weight() -> u32 {
    1
}

impl GraphStore {
    /// Write the whole graph as JSON. The document is written beside `path`
    /// first and renamed into place, so a failed save leaves the previous
    /// file intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let document = GraphDocument {
            directed: true,
            nodes: self.nodes().cloned().collect(),
            edges: self
                .edges()
                .into_iter()
                .map(|e| EdgeRecord {
                    source: e.source.to_string(),
                    target: e.target.to_string(),
                    relationship_type: e.data.relationship_type,
                    line_number: e.data.line_number,
                    confidence: e.data.confidence,
                    is_method_call: e.data.is_method_call,
                    weight: e.data.weight,
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&document)?;
        write_atomic(path, &json)?;
        log::debug!(
            "Saved graph ({} nodes, {} edges) to {}",
            self.node_count(),
            self.edge_count(),
            path.display()
        );
        Ok(())
    }

    /// Replace the contents of this store with the document at `path`.
    /// On failure the store is left empty.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.clear();
        let document = match read_document(path) {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Failed to load graph from {}: {e}", path.display());
                return Err(e);
            }
        };
        for node in document.nodes {
            self.add_node(node);
        }
        for edge in document.edges {
            self.add_edge(
                &edge.source,
                &edge.target,
                EdgeData {
                    relationship_type: edge.relationship_type,
                    line_number: edge.line_number,
                    confidence: edge.confidence,
                    is_method_call: edge.is_method_call,
                    weight: edge.weight,
                },
            );
        }
        Ok(())
    }

    /// Convenience constructor around [`GraphStore::load`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut store = Self::new();
        store.load(path)?;
        Ok(store)
    }
}

fn read_document(path: &Path) -> Result<GraphDocument> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Persist a chunk id → community id map.
pub fn save_communities(path: &Path, communities: &HashMap<String, usize>) -> Result<()> {
    let ordered: BTreeMap<&str, usize> = communities
        .iter()
        .map(|(id, community)| (id.as_str(), *community))
        .collect();
    write_atomic(path, &serde_json::to_string_pretty(&ordered)?)
}

pub fn load_communities(path: &Path) -> Result<HashMap<String, usize>> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    if let Err(e) = fs::write(&tmp, contents).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
