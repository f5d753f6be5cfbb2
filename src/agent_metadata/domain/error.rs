//! Error types for agent metadata domain validation.

use thiserror::Error;

/// Errors returned while constructing agent metadata domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentMetadataDomainError {
    /// The agent identity is empty after trimming.
    #[error("agent identity must not be empty")]
    EmptyAgentId,

    /// The agent identity is not a `spiffe://<trust-domain>/...` URI.
    #[error("agent identity '{0}' is not a valid spiffe:// URI")]
    InvalidAgentId(String),

    /// The same agent appears more than once in a single batch.
    #[error("agent '{0}' is listed more than once")]
    DuplicateAgentInBatch(String),

    /// The cluster UID is empty after trimming.
    #[error("cluster UID must not be empty")]
    EmptyClusterUid,

    /// The cluster name is empty after trimming.
    #[error("cluster name must not be empty")]
    EmptyClusterName,

    /// The plugin name is empty after trimming.
    #[error("plugin name must not be empty")]
    EmptyPluginName,

    /// A selector entry is empty after trimming.
    #[error("selector at index {0} must not be empty")]
    EmptySelector(usize),
}
