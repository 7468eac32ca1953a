//! Indexing phases, run in order by the pipeline.

pub mod chunking;
pub mod communities;
pub mod relationships;
