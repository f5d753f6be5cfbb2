//! Service layer validating requests before they reach the metadata store.

use crate::agent_metadata::{
    domain::{
        AgentId, AgentInfo, AgentInfoList, AgentMetadataDomainError, AgentMetadataRequest,
        AgentSelectors, ClusterInfo, ClusterInfoList, ClusterName, ClusterUid,
    },
    ports::{AgentStore, StoreError},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Request payload for registering an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAgentRequest {
    spiffeid: String,
    plugin: Option<String>,
}

impl RegisterAgentRequest {
    /// Creates a request for the given SPIFFE ID.
    #[must_use]
    pub fn new(spiffeid: impl Into<String>) -> Self {
        Self {
            spiffeid: spiffeid.into(),
            plugin: None,
        }
    }

    /// Sets the plugin associated with the agent.
    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }
}

/// Request payload for creating or editing a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterRequest {
    uid: Option<String>,
    name: String,
    domain_name: String,
    managed_by: String,
    platform_type: String,
    agents: Vec<String>,
}

impl ClusterRequest {
    /// Creates a request for a cluster with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the cluster UID. Required for edits; generated on create when
    /// absent.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Sets the trust domain name.
    #[must_use]
    pub fn with_domain_name(mut self, domain_name: impl Into<String>) -> Self {
        self.domain_name = domain_name.into();
        self
    }

    /// Sets the managing authority.
    #[must_use]
    pub fn with_managed_by(mut self, managed_by: impl Into<String>) -> Self {
        self.managed_by = managed_by.into();
        self
    }

    /// Sets the platform type.
    #[must_use]
    pub fn with_platform_type(mut self, platform_type: impl Into<String>) -> Self {
        self.platform_type = platform_type.into();
        self
    }

    /// Sets the member agents by SPIFFE ID.
    #[must_use]
    pub fn with_agents(mut self, agents: impl IntoIterator<Item = String>) -> Self {
        self.agents = agents.into_iter().collect();
        self
    }

    fn into_cluster(self, uid: ClusterUid) -> Result<ClusterInfo, AgentMetadataDomainError> {
        let name = ClusterName::new(self.name)?;
        let agents = AgentId::parse_batch(self.agents)?;
        Ok(ClusterInfo::new(uid, name)
            .with_domain_name(self.domain_name)
            .with_managed_by(self.managed_by)
            .with_platform_type(self.platform_type)
            .with_agents(agents))
    }
}

/// Service-level errors for metadata operations.
#[derive(Debug, Error)]
pub enum AgentMetadataServiceError {
    /// Request validation failed.
    #[error(transparent)]
    Domain(#[from] AgentMetadataDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for metadata service operations.
pub type AgentMetadataServiceResult<T> = Result<T, AgentMetadataServiceError>;

/// Agent and cluster metadata orchestration service.
#[derive(Clone)]
pub struct AgentMetadataService<S>
where
    S: AgentStore,
{
    store: Arc<S>,
}

impl<S> AgentMetadataService<S>
where
    S: AgentStore,
{
    /// Creates a service over the given store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Registers an agent or replaces its plugin association.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError`] when the identity is blank or
    /// the store rejects the write.
    pub async fn register_agent(
        &self,
        request: RegisterAgentRequest,
    ) -> AgentMetadataServiceResult<AgentInfo> {
        let agent = AgentInfo::new(AgentId::new(request.spiffeid)?).with_plugin(request.plugin);
        self.store.create_agent_entry(&agent).await?;
        debug!(agent = %agent.spiffeid(), "agent registered");
        Ok(agent)
    }

    /// Returns the plugin association of an agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError`] when the identity is blank or
    /// the agent is unknown.
    pub async fn agent_plugin(&self, spiffeid: &str) -> AgentMetadataServiceResult<AgentInfo> {
        let agent = AgentId::new(spiffeid)?;
        Ok(self.store.get_agent_plugin_info(&agent).await?)
    }

    /// Lists every known agent with its plugin.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError::Store`] when the lookup fails.
    pub async fn list_agents(&self) -> AgentMetadataServiceResult<AgentInfoList> {
        Ok(self.store.get_agent_selectors().await?)
    }

    /// Records the selectors attested for an agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError`] when validation fails or the
    /// store rejects the write.
    pub async fn record_selectors(
        &self,
        spiffeid: &str,
        plugin: &str,
        selectors: impl IntoIterator<Item = String> + Send,
    ) -> AgentMetadataServiceResult<AgentSelectors> {
        let entry = AgentSelectors::new(AgentId::new(spiffeid)?, plugin, selectors)?;
        self.store.set_agent_selectors(&entry).await?;
        debug!(
            agent = %entry.spiffeid(),
            plugin = entry.plugin(),
            selectors = entry.selectors().len(),
            "agent selectors recorded"
        );
        Ok(entry)
    }

    /// Returns the selectors recorded for an agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError`] when the identity is blank or
    /// nothing was recorded.
    pub async fn agent_selectors(
        &self,
        spiffeid: &str,
    ) -> AgentMetadataServiceResult<AgentSelectors> {
        let agent = AgentId::new(spiffeid)?;
        Ok(self.store.get_agent_selector_entry(&agent).await?)
    }

    /// Creates a cluster with its agents and returns the stored record.
    ///
    /// A UID is generated when the request carries none.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError::Domain`] for invalid input and
    /// [`AgentMetadataServiceError::Store`] for conflicts and store failures.
    pub async fn create_cluster(
        &self,
        request: ClusterRequest,
    ) -> AgentMetadataServiceResult<ClusterInfo> {
        let uid = request
            .uid
            .as_deref()
            .map_or_else(|| Ok(ClusterUid::generate()), ClusterUid::new)?;
        let cluster = request.into_cluster(uid)?;
        let stored = self.store.create_cluster_entry(&cluster).await?;
        info!(uid = %stored.uid(), name = %stored.name(), "cluster created");
        Ok(stored)
    }

    /// Overwrites a cluster's metadata and replaces its agents.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError::Domain`] when the UID is missing
    /// or input is invalid, and [`AgentMetadataServiceError::Store`] for
    /// conflicts and store failures.
    pub async fn edit_cluster(
        &self,
        request: ClusterRequest,
    ) -> AgentMetadataServiceResult<ClusterInfo> {
        let uid = ClusterUid::new(request.uid.as_deref().unwrap_or_default())?;
        let cluster = request.into_cluster(uid)?;
        let stored = self.store.edit_cluster_entry(&cluster).await?;
        info!(uid = %stored.uid(), name = %stored.name(), "cluster edited");
        Ok(stored)
    }

    /// Deletes a cluster and its memberships.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError`] when the UID is empty or the
    /// cluster does not exist.
    pub async fn delete_cluster(&self, uid: &str) -> AgentMetadataServiceResult<()> {
        let cluster_uid = ClusterUid::new(uid)?;
        self.store.delete_cluster_entry(&cluster_uid).await?;
        info!(uid = %cluster_uid, "cluster deleted");
        Ok(())
    }

    /// Lists every cluster with its agents.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError::Store`] when the lookup fails.
    pub async fn list_clusters(&self) -> AgentMetadataServiceResult<ClusterInfoList> {
        Ok(self.store.get_clusters().await?)
    }

    /// Returns the agents assigned to a cluster.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError`] when the UID is empty or the
    /// lookup fails.
    pub async fn cluster_agents(&self, uid: &str) -> AgentMetadataServiceResult<Vec<AgentId>> {
        let cluster_uid = ClusterUid::new(uid)?;
        Ok(self.store.get_cluster_agents(&cluster_uid).await?)
    }

    /// Returns the name of the cluster an agent belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError`] when the identity is blank or
    /// the agent has no cluster.
    pub async fn agent_cluster(&self, spiffeid: &str) -> AgentMetadataServiceResult<ClusterName> {
        let agent = AgentId::new(spiffeid)?;
        Ok(self.store.get_agent_cluster_name(&agent).await?)
    }

    /// Returns agents with their plugin and cluster name.
    ///
    /// An empty filter selects every agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentMetadataServiceError`] when a filter entry is invalid or
    /// the lookup fails.
    pub async fn agents_metadata<I, V>(
        &self,
        spiffeids: I,
    ) -> AgentMetadataServiceResult<AgentInfoList>
    where
        I: IntoIterator<Item = V> + Send,
        V: Into<String>,
    {
        let agents = spiffeids
            .into_iter()
            .map(AgentId::new)
            .collect::<Result<Vec<_>, _>>()?;
        let request = AgentMetadataRequest::new(agents);
        Ok(self.store.get_agents_metadata(&request).await?)
    }
}
