//! Agent payloads exchanged with the store.

use super::{AgentId, ClusterName};
use serde::{Deserialize, Serialize};

/// Agent record with its optional plugin and cluster association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    spiffeid: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster: Option<ClusterName>,
}

impl AgentInfo {
    /// Creates an agent record with no plugin and no cluster.
    #[must_use]
    pub const fn new(spiffeid: AgentId) -> Self {
        Self {
            spiffeid,
            plugin: None,
            cluster: None,
        }
    }

    /// Sets the plugin associated with the agent.
    #[must_use]
    pub fn with_plugin(mut self, plugin: Option<String>) -> Self {
        self.plugin = plugin;
        self
    }

    /// Sets the cluster the agent belongs to.
    #[must_use]
    pub fn with_cluster(mut self, cluster: Option<ClusterName>) -> Self {
        self.cluster = cluster;
        self
    }

    /// Returns the agent identity.
    #[must_use]
    pub const fn spiffeid(&self) -> &AgentId {
        &self.spiffeid
    }

    /// Returns the plugin name, if any.
    #[must_use]
    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// Returns the cluster name, if the agent is assigned to one.
    #[must_use]
    pub const fn cluster(&self) -> Option<&ClusterName> {
        self.cluster.as_ref()
    }
}

/// Ordered list of agent records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfoList {
    agents: Vec<AgentInfo>,
}

impl AgentInfoList {
    /// Wraps a list of agent records.
    #[must_use]
    pub const fn new(agents: Vec<AgentInfo>) -> Self {
        Self { agents }
    }

    /// Returns the agent records.
    #[must_use]
    pub fn agents(&self) -> &[AgentInfo] {
        &self.agents
    }

    /// Consumes the list, returning the agent records.
    #[must_use]
    pub fn into_agents(self) -> Vec<AgentInfo> {
        self.agents
    }

    /// Returns the number of agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns `true` when the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Filter for agent metadata queries. An empty filter selects every agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetadataRequest {
    #[serde(default)]
    agents: Vec<AgentId>,
}

impl AgentMetadataRequest {
    /// Creates a request restricted to the given agents.
    #[must_use]
    pub const fn new(agents: Vec<AgentId>) -> Self {
        Self { agents }
    }

    /// Creates a request selecting every agent.
    #[must_use]
    pub const fn all() -> Self {
        Self { agents: Vec::new() }
    }

    /// Returns the requested agents.
    #[must_use]
    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// Returns `true` when the request selects every agent.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.agents.is_empty()
    }
}
