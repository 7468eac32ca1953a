use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    /// A single chunk could not be parsed. Callers skip the chunk.
    #[error("Failed to parse chunk {chunk_id}: {reason}")]
    ParseFailure { chunk_id: String, reason: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Graph I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Graph serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Community detection failed: {0}")]
    AlgorithmFailure(String),
}
