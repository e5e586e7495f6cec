//! Errors raised while building or streaming a blockchain.

use std::path::PathBuf;

/// Result type for chain operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors that can occur while building or streaming a chain
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// A caller-supplied value was rejected (bad file, timing, repeat count)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is inconsistent with the chain's current state
    #[error("Logic error: {0}")]
    Logic(String),

    /// Reading a sample file failed while streaming
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChainError {
    /// Configuration errors are caller mistakes and never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ChainError::InvalidArgument(_) | ChainError::Logic(_))
    }
}
