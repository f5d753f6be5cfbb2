//! Validated cluster display name.

use super::AgentMetadataDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable cluster name. Unique across clusters but mutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterName(String);

impl ClusterName {
    /// Creates a validated cluster name.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataDomainError::EmptyClusterName`] when the value
    /// is empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, AgentMetadataDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AgentMetadataDomainError::EmptyClusterName);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClusterName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
