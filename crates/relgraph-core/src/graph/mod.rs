//! Relationship graph: storage, persistence, queries and target lookup.

pub mod persist;
pub mod query;
pub mod store;
pub mod symbol_index;

pub use persist::{load_communities, save_communities};
pub use query::CentralityMethod;
pub use store::{EdgeData, EdgeView, GraphStore, NodeData, SharedGraph};
pub use symbol_index::SymbolIndex;
