//! Identifier types for agents and clusters.

use super::AgentMetadataDomainError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

const SPIFFE_SCHEME: &str = "spiffe://";

/// Identity of an agent, usually a SPIFFE URI such as
/// `spiffe://example.org/spire/agent/k8s/node-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Creates an agent identity from any non-empty string.
    ///
    /// The input is trimmed. Use [`AgentId::spiffe`] when the identity must
    /// be a SPIFFE URI.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataDomainError::EmptyAgentId`] for blank input.
    pub fn new(value: impl Into<String>) -> Result<Self, AgentMetadataDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AgentMetadataDomainError::EmptyAgentId);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates an agent identity that must use the `spiffe://` scheme with a
    /// non-empty trust domain.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataDomainError::EmptyAgentId`] for blank input or
    /// [`AgentMetadataDomainError::InvalidAgentId`] when the value is not a
    /// SPIFFE URI.
    pub fn spiffe(value: impl Into<String>) -> Result<Self, AgentMetadataDomainError> {
        let agent = Self::new(value)?;
        if agent.is_spiffe() {
            Ok(agent)
        } else {
            Err(AgentMetadataDomainError::InvalidAgentId(agent.into_inner()))
        }
    }

    /// Reports whether the identity is a `spiffe://` URI with a trust domain.
    #[must_use]
    pub fn is_spiffe(&self) -> bool {
        self.0
            .strip_prefix(SPIFFE_SCHEME)
            .and_then(|path| path.split('/').next())
            .is_some_and(|domain| !domain.is_empty() && !domain.contains(char::is_whitespace))
    }

    /// Validates a batch of identities, rejecting repeated entries.
    ///
    /// Input order is preserved.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure, or
    /// [`AgentMetadataDomainError::DuplicateAgentInBatch`] when an identity
    /// appears twice.
    pub fn parse_batch<I, S>(values: I) -> Result<Vec<Self>, AgentMetadataDomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut agents = Vec::new();
        for value in values {
            let agent = Self::new(value)?;
            if !seen.insert(agent.clone()) {
                return Err(AgentMetadataDomainError::DuplicateAgentInBatch(
                    agent.into_inner(),
                ));
            }
            agents.push(agent);
        }
        Ok(agents)
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the owned identity string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable unique identifier of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterUid(String);

impl ClusterUid {
    /// Creates a cluster UID from an existing value.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataDomainError::EmptyClusterUid`] when the value is
    /// empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, AgentMetadataDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AgentMetadataDomainError::EmptyClusterUid);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Generates a fresh random UID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the UID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClusterUid {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ClusterUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
