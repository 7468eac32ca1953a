//! relgraph core: code relationship graph engine.
//!
//! Resolves calls, inheritance, type usage and imports extracted from parsed
//! source into a typed directed graph, and supports multi-hop traversal,
//! cycle-safe topological subgraph extraction and community detection.

pub mod config;
pub mod error;
pub mod graph;
pub mod languages;
pub mod phases;
pub mod pipeline;
pub mod resolve;
pub mod subgraph;

pub use error::{GraphError, Result};
