//! Core data types and configuration for relationship graph indexing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Kind of chunk produced by the chunker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Module,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Module => "module",
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "method" => Some(Self::Method),
            "class" => Some(Self::Class),
            "module" => Some(Self::Module),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a relationship edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Calls,
    Inherits,
    Implements,
    Overrides,
    UsesType,
    Instantiates,
    Imports,
    Decorates,
    Raises,
    Catches,
}

/// Inverse names that do not follow the `<type>_by` rule.
const IRREGULAR_INVERSES: &[(RelationshipType, &str)] = &[
    (RelationshipType::Overrides, "overridden_by"),
    (RelationshipType::Catches, "caught_by"),
    (RelationshipType::UsesType, "type_used_by"),
];

impl RelationshipType {
    pub const ALL: [RelationshipType; 10] = [
        Self::Calls,
        Self::Inherits,
        Self::Implements,
        Self::Overrides,
        Self::UsesType,
        Self::Instantiates,
        Self::Imports,
        Self::Decorates,
        Self::Raises,
        Self::Catches,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Inherits => "inherits",
            Self::Implements => "implements",
            Self::Overrides => "overrides",
            Self::UsesType => "uses_type",
            Self::Instantiates => "instantiates",
            Self::Imports => "imports",
            Self::Decorates => "decorates",
            Self::Raises => "raises",
            Self::Catches => "catches",
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Name used to traverse this relationship backwards (`calls` -> `called_by`).
    pub fn inverse_name(&self) -> String {
        if let Some((_, name)) = IRREGULAR_INVERSES.iter().find(|(t, _)| t == self) {
            return (*name).to_string();
        }
        let base = self.as_str();
        // calls -> called_by, imports -> imported_by, raises -> raised_by
        let stem = base.strip_suffix('s').unwrap_or(base);
        let stem = stem.strip_suffix('e').unwrap_or(stem);
        format!("{stem}ed_by")
    }

    /// Resolve an inverse name back to its forward relationship.
    pub fn from_inverse_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.inverse_name() == s)
    }

    /// Default traversal weight for this relationship type.
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::Calls => 1.0,
            Self::Inherits | Self::Overrides => 0.95,
            Self::Implements => 0.9,
            Self::Instantiates => 0.85,
            Self::UsesType => 0.8,
            // Low so incidental coupling does not flood traversal results.
            Self::Imports => 0.3,
            Self::Decorates | Self::Raises | Self::Catches => UNKNOWN_EDGE_WEIGHT,
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight applied to edge types missing from a weight table.
pub const UNKNOWN_EDGE_WEIGHT: f64 = 0.5;

/// Default traversal weight table keyed by relationship name.
pub fn default_edge_weights() -> HashMap<String, f64> {
    RelationshipType::ALL
        .into_iter()
        .map(|t| (t.as_str().to_string(), t.default_weight()))
        .collect()
}

/// A chunk handed over by the chunker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub name: String,
    pub kind: ChunkKind,
    /// Path relative to the project root, forward slashes.
    pub file: String,
    /// Absolute path of the source file, used to key the per-file cache.
    pub abs_path: PathBuf,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Name of the enclosing class for methods.
    pub parent_name: Option<String>,
    pub parent_chunk_id: Option<String>,
    pub content: String,
}

/// Build a chunk id: `<relative_path>:<start>-<end>:<kind>[:<parent>.<name>|:<name>]`.
pub fn chunk_id(
    rel_path: &str,
    start_line: usize,
    end_line: usize,
    kind: ChunkKind,
    parent: Option<&str>,
    name: Option<&str>,
) -> String {
    let path = rel_path.replace('\\', "/");
    let mut id = format!("{path}:{start_line}-{end_line}:{kind}");
    match (parent, name) {
        (Some(p), Some(n)) => {
            id.push(':');
            id.push_str(p);
            id.push('.');
            id.push_str(n);
        }
        (None, Some(n)) => {
            id.push(':');
            id.push_str(n);
        }
        _ => {}
    }
    id
}

/// A typed relationship emitted by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source_id: String,
    /// Chunk id or unresolved symbol name.
    pub target: String,
    pub relationship_type: RelationshipType,
    pub line_number: usize,
    pub confidence: f64,
    pub is_method_call: bool,
}

/// Configuration for an indexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub repo_path: String,
    pub output_dir: Option<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Worker threads for chunk extraction; 0 uses the rayon default.
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_true")]
    pub detect_communities: bool,
    #[serde(default = "default_true")]
    pub include_boundary_edges: bool,
    #[serde(default = "default_max_boundary_edges")]
    pub max_boundary_edges: usize,
    #[serde(default = "default_edge_weights")]
    pub edge_weights: HashMap<String, f64>,
}

fn default_max_file_size() -> u64 {
    1_000_000
}
fn default_resolution() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    42
}
fn default_true() -> bool {
    true
}
fn default_max_boundary_edges() -> usize {
    3
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            repo_path: String::new(),
            output_dir: None,
            exclude_patterns: Vec::new(),
            max_file_size: default_max_file_size(),
            resolution: default_resolution(),
            seed: default_seed(),
            threads: 0,
            detect_communities: true,
            include_boundary_edges: true,
            max_boundary_edges: default_max_boundary_edges(),
            edge_weights: default_edge_weights(),
        }
    }
}

impl IndexConfig {
    /// Read a JSON config file; absent keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// File name of the persisted graph document inside the output directory.
pub const GRAPH_FILE_NAME: &str = "relationship_graph.json";
/// File name of the persisted community map inside the output directory.
pub const COMMUNITY_FILE_NAME: &str = "communities.json";
