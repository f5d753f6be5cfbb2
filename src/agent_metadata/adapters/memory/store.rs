//! In-memory agent metadata store.
//!
//! Mirrors the constraint semantics of the `SQLite` store. Multi-step writes
//! run against a copy of the state that replaces the original only when
//! every step succeeds.

use crate::agent_metadata::domain::{
    AgentId, AgentInfo, AgentInfoList, AgentMetadataRequest, AgentSelectors, CREATION_TIME_FORMAT,
    ClusterInfo, ClusterInfoList, ClusterName, ClusterUid, PersistedClusterData,
};
use crate::agent_metadata::ports::{
    AGENT_ALREADY_ASSIGNED, AGENT_DOES_NOT_EXIST, AGENT_HAS_NO_CLUSTER, AgentStore,
    CLUSTER_ALREADY_EXISTS, CLUSTER_DOES_NOT_EXIST, SELECTORS_DO_NOT_EXIST, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory agent metadata store.
#[derive(Clone)]
pub struct InMemoryAgentStore {
    state: Arc<RwLock<MemoryState>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    agents: BTreeMap<AgentId, Option<String>>,
    selectors: HashMap<AgentId, AgentSelectors>,
    clusters: HashMap<ClusterUid, StoredCluster>,
    memberships: HashMap<AgentId, ClusterUid>,
}

#[derive(Debug, Clone)]
struct StoredCluster {
    name: ClusterName,
    creation_time: String,
    domain_name: String,
    managed_by: String,
    platform_type: String,
}

impl fmt::Debug for InMemoryAgentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryAgentStore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryAgentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAgentStore {
    /// Creates an empty store stamping clusters with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            clock: Arc::new(DefaultClock),
        }
    }

    /// Replaces the clock used for cluster creation timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> StoreResult<T>) -> StoreResult<T> {
        let state = self.state.read().map_err(|err| lock_error(&err))?;
        f(&state)
    }

    /// Applies `f` to a copy of the state, publishing it only on success.
    fn transact<T>(
        &self,
        f: impl FnOnce(&mut MemoryState, &dyn Clock) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = self.state.write().map_err(|err| lock_error(&err))?;
        let mut draft = state.clone();
        let value = f(&mut draft, self.clock.as_ref())?;
        *state = draft;
        Ok(value)
    }
}

fn lock_error(err: &impl fmt::Display) -> StoreError {
    StoreError::Other(format!("state lock poisoned: {err}"))
}

impl MemoryState {
    fn insert_cluster(&mut self, cluster: &ClusterInfo, clock: &dyn Clock) -> StoreResult<()> {
        if self.clusters.contains_key(cluster.uid()) || self.name_taken(cluster.name(), None) {
            return Err(StoreError::conflict(CLUSTER_ALREADY_EXISTS));
        }
        self.clusters.insert(
            cluster.uid().clone(),
            StoredCluster {
                name: cluster.name().clone(),
                creation_time: clock.utc().format(CREATION_TIME_FORMAT).to_string(),
                domain_name: cluster.domain_name().to_owned(),
                managed_by: cluster.managed_by().to_owned(),
                platform_type: cluster.platform_type().to_owned(),
            },
        );
        Ok(())
    }

    fn update_cluster(&mut self, cluster: &ClusterInfo) -> StoreResult<()> {
        if !self.clusters.contains_key(cluster.uid()) {
            return Err(StoreError::conflict(CLUSTER_DOES_NOT_EXIST));
        }
        if self.name_taken(cluster.name(), Some(cluster.uid())) {
            return Err(StoreError::conflict(CLUSTER_ALREADY_EXISTS));
        }
        let stored = self
            .clusters
            .get_mut(cluster.uid())
            .ok_or_else(|| StoreError::conflict(CLUSTER_DOES_NOT_EXIST))?;
        stored.name = cluster.name().clone();
        stored.domain_name = cluster.domain_name().to_owned();
        stored.managed_by = cluster.managed_by().to_owned();
        stored.platform_type = cluster.platform_type().to_owned();
        Ok(())
    }

    fn delete_cluster(&mut self, uid: &ClusterUid) -> StoreResult<()> {
        self.remove_members(uid);
        self.clusters
            .remove(uid)
            .map(|_| ())
            .ok_or_else(|| StoreError::conflict(CLUSTER_DOES_NOT_EXIST))
    }

    fn add_agents(&mut self, uid: &ClusterUid, agents: &[AgentId]) -> StoreResult<()> {
        if agents.is_empty() {
            return Ok(());
        }
        for agent in agents {
            self.agents.entry(agent.clone()).or_insert(None);
        }
        if !self.clusters.contains_key(uid) {
            return Err(StoreError::Other(format!(
                "membership insert failed: unknown cluster {uid}"
            )));
        }
        for agent in agents {
            if self.memberships.contains_key(agent) {
                return Err(StoreError::conflict(AGENT_ALREADY_ASSIGNED));
            }
            self.memberships.insert(agent.clone(), uid.clone());
        }
        Ok(())
    }

    fn remove_members(&mut self, uid: &ClusterUid) {
        self.memberships.retain(|_, cluster| *cluster != *uid);
    }

    fn name_taken(&self, name: &ClusterName, except: Option<&ClusterUid>) -> bool {
        self.clusters
            .iter()
            .any(|(uid, stored)| &stored.name == name && Some(uid) != except)
    }

    fn cluster_members(&self, uid: &ClusterUid) -> Vec<AgentId> {
        let mut members: Vec<AgentId> = self
            .memberships
            .iter()
            .filter(|(_, cluster)| *cluster == uid)
            .map(|(agent, _)| agent.clone())
            .collect();
        members.sort();
        members
    }

    fn cluster_info(&self, uid: &ClusterUid, stored: &StoredCluster) -> ClusterInfo {
        ClusterInfo::from_persisted(PersistedClusterData {
            uid: uid.clone(),
            name: stored.name.clone(),
            creation_time: stored.creation_time.clone(),
            domain_name: stored.domain_name.clone(),
            managed_by: stored.managed_by.clone(),
            platform_type: stored.platform_type.clone(),
            agents: self.cluster_members(uid),
        })
    }

    fn load_cluster(&self, uid: &ClusterUid) -> StoreResult<ClusterInfo> {
        self.clusters
            .get(uid)
            .map(|stored| self.cluster_info(uid, stored))
            .ok_or_else(|| StoreError::not_found(CLUSTER_DOES_NOT_EXIST))
    }

    fn cluster_name_of(&self, agent: &AgentId) -> Option<&ClusterName> {
        self.memberships
            .get(agent)
            .and_then(|uid| self.clusters.get(uid))
            .map(|stored| &stored.name)
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn create_agent_entry(&self, agent: &AgentInfo) -> StoreResult<()> {
        self.transact(|state, _| {
            state
                .agents
                .insert(agent.spiffeid().clone(), agent.plugin().map(ToOwned::to_owned));
            Ok(())
        })
    }

    async fn get_agent_selectors(&self) -> StoreResult<AgentInfoList> {
        self.read(|state| {
            Ok(AgentInfoList::new(
                state
                    .agents
                    .iter()
                    .map(|(agent, plugin)| {
                        AgentInfo::new(agent.clone()).with_plugin(plugin.clone())
                    })
                    .collect(),
            ))
        })
    }

    async fn get_agent_plugin_info(&self, agent: &AgentId) -> StoreResult<AgentInfo> {
        self.read(|state| {
            state
                .agents
                .get(agent)
                .map(|plugin| AgentInfo::new(agent.clone()).with_plugin(plugin.clone()))
                .ok_or_else(|| StoreError::not_found(AGENT_DOES_NOT_EXIST))
        })
    }

    async fn set_agent_selectors(&self, selectors: &AgentSelectors) -> StoreResult<()> {
        self.transact(|state, _| {
            state.agents.entry(selectors.spiffeid().clone()).or_insert(None);
            state
                .selectors
                .insert(selectors.spiffeid().clone(), selectors.clone());
            Ok(())
        })
    }

    async fn get_agent_selector_entry(&self, agent: &AgentId) -> StoreResult<AgentSelectors> {
        self.read(|state| {
            state
                .selectors
                .get(agent)
                .cloned()
                .ok_or_else(|| StoreError::not_found(SELECTORS_DO_NOT_EXIST))
        })
    }

    async fn get_clusters(&self) -> StoreResult<ClusterInfoList> {
        self.read(|state| {
            let mut clusters: Vec<ClusterInfo> = state
                .clusters
                .iter()
                .map(|(uid, stored)| state.cluster_info(uid, stored))
                .collect();
            clusters.sort_by(|left, right| left.name().cmp(right.name()));
            Ok(ClusterInfoList::new(clusters))
        })
    }

    async fn create_cluster_entry(&self, cluster: &ClusterInfo) -> StoreResult<ClusterInfo> {
        self.transact(|state, clock| {
            state.insert_cluster(cluster, clock)?;
            state.add_agents(cluster.uid(), cluster.agents())?;
            state.load_cluster(cluster.uid())
        })
    }

    async fn edit_cluster_entry(&self, cluster: &ClusterInfo) -> StoreResult<ClusterInfo> {
        self.transact(|state, _| {
            state.update_cluster(cluster)?;
            state.remove_members(cluster.uid());
            state.add_agents(cluster.uid(), cluster.agents())?;
            state.load_cluster(cluster.uid())
        })
    }

    async fn delete_cluster_entry(&self, uid: &ClusterUid) -> StoreResult<()> {
        self.transact(|state, _| state.delete_cluster(uid))
    }

    async fn get_agent_cluster_name(&self, agent: &AgentId) -> StoreResult<ClusterName> {
        self.read(|state| {
            state
                .cluster_name_of(agent)
                .cloned()
                .ok_or_else(|| StoreError::not_found(AGENT_HAS_NO_CLUSTER))
        })
    }

    async fn get_cluster_agents(&self, uid: &ClusterUid) -> StoreResult<Vec<AgentId>> {
        self.read(|state| Ok(state.cluster_members(uid)))
    }

    async fn get_agents_metadata(
        &self,
        request: &AgentMetadataRequest,
    ) -> StoreResult<AgentInfoList> {
        self.read(|state| {
            Ok(AgentInfoList::new(
                state
                    .agents
                    .iter()
                    .filter(|(agent, _)| {
                        request.is_unfiltered() || request.agents().contains(*agent)
                    })
                    .map(|(agent, plugin)| {
                        AgentInfo::new(agent.clone())
                            .with_plugin(plugin.clone())
                            .with_cluster(state.cluster_name_of(agent).cloned())
                    })
                    .collect(),
            ))
        })
    }
}
