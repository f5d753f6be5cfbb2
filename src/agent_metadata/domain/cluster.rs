//! Cluster payloads exchanged with the store.

use super::{AgentId, ClusterName, ClusterUid};
use serde::{Deserialize, Serialize};

/// `chrono` format of cluster creation timestamps, e.g. `Jan 02 2006 15:04:05`.
pub const CREATION_TIME_FORMAT: &str = "%b %d %Y %H:%M:%S";

/// Cluster metadata together with its member agents.
///
/// `creation_time` is assigned by the store on insert and is ignored on
/// create and edit requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    uid: ClusterUid,
    name: ClusterName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creation_time: Option<String>,
    #[serde(default)]
    domain_name: String,
    #[serde(default)]
    managed_by: String,
    #[serde(default)]
    platform_type: String,
    #[serde(default)]
    agents_list: Vec<AgentId>,
}

/// Parameter object for reconstructing a persisted cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedClusterData {
    /// Persisted cluster UID.
    pub uid: ClusterUid,
    /// Persisted cluster name.
    pub name: ClusterName,
    /// Creation timestamp as stored.
    pub creation_time: String,
    /// Persisted domain name.
    pub domain_name: String,
    /// Persisted managing authority.
    pub managed_by: String,
    /// Persisted platform type.
    pub platform_type: String,
    /// Member agents.
    pub agents: Vec<AgentId>,
}

impl ClusterInfo {
    /// Creates cluster metadata with empty descriptive fields and no agents.
    #[must_use]
    pub const fn new(uid: ClusterUid, name: ClusterName) -> Self {
        Self {
            uid,
            name,
            creation_time: None,
            domain_name: String::new(),
            managed_by: String::new(),
            platform_type: String::new(),
            agents_list: Vec::new(),
        }
    }

    /// Reconstructs cluster metadata from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedClusterData) -> Self {
        Self {
            uid: data.uid,
            name: data.name,
            creation_time: Some(data.creation_time),
            domain_name: data.domain_name,
            managed_by: data.managed_by,
            platform_type: data.platform_type,
            agents_list: data.agents,
        }
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

    /// Replaces the member agents.
    #[must_use]
    pub fn with_agents(mut self, agents: Vec<AgentId>) -> Self {
        self.agents_list = agents;
        self
    }

    /// Returns the cluster UID.
    #[must_use]
    pub const fn uid(&self) -> &ClusterUid {
        &self.uid
    }

    /// Returns the cluster name.
    #[must_use]
    pub const fn name(&self) -> &ClusterName {
        &self.name
    }

    /// Returns the stored creation timestamp, if known.
    #[must_use]
    pub fn creation_time(&self) -> Option<&str> {
        self.creation_time.as_deref()
    }

    /// Returns the trust domain name.
    #[must_use]
    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    /// Returns the managing authority.
    #[must_use]
    pub fn managed_by(&self) -> &str {
        &self.managed_by
    }

    /// Returns the platform type.
    #[must_use]
    pub fn platform_type(&self) -> &str {
        &self.platform_type
    }

    /// Returns the member agents.
    #[must_use]
    pub fn agents(&self) -> &[AgentId] {
        &self.agents_list
    }
}

/// Ordered list of clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfoList {
    clusters: Vec<ClusterInfo>,
}

impl ClusterInfoList {
    /// Wraps a list of clusters.
    #[must_use]
    pub const fn new(clusters: Vec<ClusterInfo>) -> Self {
        Self { clusters }
    }

    /// Returns the clusters.
    #[must_use]
    pub fn clusters(&self) -> &[ClusterInfo] {
        &self.clusters
    }

    /// Consumes the list, returning the clusters.
    #[must_use]
    pub fn into_clusters(self) -> Vec<ClusterInfo> {
        self.clusters
    }

    /// Finds a cluster by UID.
    #[must_use]
    pub fn find(&self, uid: &ClusterUid) -> Option<&ClusterInfo> {
        self.clusters.iter().find(|cluster| cluster.uid() == uid)
    }

    /// Returns the number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Returns `true` when there are no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
