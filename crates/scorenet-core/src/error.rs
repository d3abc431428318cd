//! Error types for scorenet

use thiserror::Error;

/// Main error type for scorenet operations.
///
/// Nothing in the engine is retried: any error aborts the current
/// propagation cycle and the caller must treat the run as unusable.
#[derive(Debug, Error)]
pub enum ScorenetError {
    /// Error while constructing the node graph
    #[error("Graph construction error: {0}")]
    Graph(String),

    /// Caller broke a node contract (e.g. double insert of the same tuple)
    #[error("Node contract violation: {0}")]
    NodeContract(String),

    /// A group/index key changed its hash while indexed.
    ///
    /// Only raised when the network was built with key assertions enabled;
    /// in production mode the corruption goes undetected.
    #[error("Key hash changed while indexed at node {node}: {key}")]
    KeyHashDrift {
        /// Debug rendering of the offending key
        key: String,
        /// Identity of the node that held the key
        node: usize,
    },

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for scorenet operations
pub type Result<T> = std::result::Result<T, ScorenetError>;
