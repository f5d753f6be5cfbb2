//! Store port for agent, selector and cluster metadata.

use crate::agent_metadata::domain::{
    AgentId, AgentInfo, AgentInfoList, AgentMetadataRequest, AgentSelectors, ClusterInfo,
    ClusterInfoList, ClusterName, ClusterUid,
};
use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Conflict raised when a cluster UID or name is already taken.
pub const CLUSTER_ALREADY_EXISTS: &str = "cluster already exists";
/// Conflict raised when a mutation targets an unknown cluster UID.
pub const CLUSTER_DOES_NOT_EXIST: &str = "cluster does not exist";
/// Conflict raised when an agent is already a member of some cluster.
pub const AGENT_ALREADY_ASSIGNED: &str = "agent already assigned to another cluster";
/// Lookup failure for an unknown agent.
pub const AGENT_DOES_NOT_EXIST: &str = "agent does not exist";
/// Lookup failure for an agent without a cluster.
pub const AGENT_HAS_NO_CLUSTER: &str = "agent has no cluster";
/// Lookup failure for an agent without recorded selectors.
pub const SELECTORS_DO_NOT_EXIST: &str = "agent selectors do not exist";

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Agent and cluster metadata persistence contract.
///
/// Operations that touch more than one row run inside a single transaction
/// and either commit every step or roll back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Creates the agent or replaces its plugin association.
    async fn create_agent_entry(&self, agent: &AgentInfo) -> StoreResult<()>;

    /// Returns every known agent with its plugin.
    async fn get_agent_selectors(&self) -> StoreResult<AgentInfoList>;

    /// Returns the plugin association of one agent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the agent is unknown.
    async fn get_agent_plugin_info(&self, agent: &AgentId) -> StoreResult<AgentInfo>;

    /// Records the plugin and selectors attested for an agent, creating the
    /// agent when needed.
    async fn set_agent_selectors(&self, selectors: &AgentSelectors) -> StoreResult<()>;

    /// Returns the selectors recorded for an agent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing was recorded.
    async fn get_agent_selector_entry(&self, agent: &AgentId) -> StoreResult<AgentSelectors>;

    /// Returns every cluster with its member agents, ordered by name.
    async fn get_clusters(&self) -> StoreResult<ClusterInfoList>;

    /// Creates a cluster and assigns its agents atomically.
    ///
    /// Returns the cluster as stored, including its creation time, read back
    /// inside the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the UID or name is taken or an
    /// agent already belongs to another cluster.
    async fn create_cluster_entry(&self, cluster: &ClusterInfo) -> StoreResult<ClusterInfo>;

    /// Overwrites cluster metadata and replaces its agents atomically.
    ///
    /// Returns the cluster as stored after the edit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the cluster does not exist, the
    /// new name is taken, or an agent belongs to another cluster.
    async fn edit_cluster_entry(&self, cluster: &ClusterInfo) -> StoreResult<ClusterInfo>;

    /// Deletes a cluster and its memberships atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the cluster does not exist.
    async fn delete_cluster_entry(&self, uid: &ClusterUid) -> StoreResult<()>;

    /// Returns the name of the cluster an agent belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the agent has no cluster.
    async fn get_agent_cluster_name(&self, agent: &AgentId) -> StoreResult<ClusterName>;

    /// Returns the agents assigned to a cluster, ordered by identity.
    async fn get_cluster_agents(&self, uid: &ClusterUid) -> StoreResult<Vec<AgentId>>;

    /// Returns agents with plugin and cluster name, filtered by the request.
    async fn get_agents_metadata(
        &self,
        request: &AgentMetadataRequest,
    ) -> StoreResult<AgentInfoList>;
}

/// Outcome of rolling back a transaction after a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStatus {
    /// The transaction was rolled back.
    Succeeded,
    /// The rollback itself failed; the store may hold partial changes.
    Failed(String),
}

impl RollbackStatus {
    /// Returns `true` when the rollback completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("[Successful rollback upon error]"),
            Self::Failed(reason) => write!(f, "[Unsuccessful rollback [{reason}] upon error]"),
        }
    }
}

/// Errors returned by store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A statement could not be prepared or executed.
    #[error("statement failed [{sql}]: {cause}")]
    Statement {
        /// SQL text of the failed statement.
        sql: String,
        /// Underlying driver error.
        #[source]
        cause: Arc<dyn StdError + Send + Sync>,
    },

    /// A business rule was violated: duplicate create, mutation of a missing
    /// cluster, or double assignment of an agent.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A read targeted an entity that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// No connection could be obtained or the blocking task failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted data: {0}")]
    InvalidPersistedData(Arc<dyn StdError + Send + Sync>),

    /// The rollback handler was invoked without a cause.
    #[error("rollback handler called upon no error: {0}")]
    RollbackWithoutCause(RollbackStatus),

    /// Any other failure, annotated with the rollback outcome.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Wraps a driver error together with the SQL that caused it.
    pub fn statement(
        sql: impl Into<String>,
        err: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Statement {
            sql: sql.into(),
            cause: Arc::new(err),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Wraps a data-quality error from persisted rows.
    pub fn invalid_persisted_data(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Returns `true` for [`StoreError::Conflict`].
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` for [`StoreError::Statement`].
    #[must_use]
    pub const fn is_statement(&self) -> bool {
        matches!(self, Self::Statement { .. })
    }

    /// Returns the conflict message, if this is a conflict.
    #[must_use]
    pub fn conflict_message(&self) -> Option<&str> {
        match self {
            Self::Conflict(message) => Some(message),
            _ => None,
        }
    }

    /// Re-wraps the error so its message also reports the rollback outcome.
    ///
    /// Statement errors keep their SQL text, conflicts and lookups keep their
    /// kind; every other variant collapses into [`StoreError::Other`].
    #[must_use]
    pub fn with_rollback_status(self, status: &RollbackStatus) -> Self {
        match self {
            Self::Statement { sql, cause } => Self::Statement {
                sql,
                cause: Arc::new(RollbackAnnotated {
                    cause,
                    status: status.clone(),
                }),
            },
            Self::Conflict(message) => Self::Conflict(format!("{message}: {status}")),
            Self::NotFound(message) => Self::NotFound(format!("{message}: {status}")),
            other => Self::Other(format!("{other}: {status}")),
        }
    }
}

#[derive(Debug)]
struct RollbackAnnotated {
    cause: Arc<dyn StdError + Send + Sync>,
    status: RollbackStatus,
}

impl fmt::Display for RollbackAnnotated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cause, self.status)
    }
}

impl StdError for RollbackAnnotated {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}
