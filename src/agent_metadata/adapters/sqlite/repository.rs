//! `SQLite` implementation of the agent metadata store.

use super::config::{SqlitePool, StoreConfig, apply_schema, build_pool};
use super::models::{ClusterRow, parse_agent};
use super::schema::{agent_selectors, agents, cluster_memberships, clusters};
use super::transaction::{ClusterTransaction, statement_sql};
use crate::agent_metadata::domain::{
    AgentId, AgentInfo, AgentInfoList, AgentMetadataRequest, AgentSelectors, ClusterInfo,
    ClusterInfoList, ClusterName, ClusterUid,
};
use crate::agent_metadata::ports::{
    AGENT_DOES_NOT_EXIST, AGENT_HAS_NO_CLUSTER, AgentStore, SELECTORS_DO_NOT_EXIST, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::{Sqlite, SqliteConnection};
use mockable::{Clock, DefaultClock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Agent metadata store backed by a pooled `SQLite` database.
#[derive(Clone)]
pub struct SqliteAgentStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl fmt::Debug for SqliteAgentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteAgentStore")
            .field("pool", &self.pool.state())
            .finish_non_exhaustive()
    }
}

impl SqliteAgentStore {
    /// Opens the configured database and creates missing tables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the pool cannot be built and
    /// [`StoreError::Statement`] when the schema cannot be applied.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let pool = build_pool(config)?;
        let mut connection = pool
            .get()
            .map_err(|err| StoreError::connection(err.to_string()))?;
        apply_schema(&mut connection)?;
        info!(database = config.database_url(), "agent metadata store opened");
        Ok(Self::new(pool))
    }

    /// Creates a store over an existing pool whose schema is already in
    /// place. Creation timestamps come from the system clock.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(DefaultClock),
        }
    }

    /// Replaces the clock used for cluster creation timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection, &dyn Clock) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let clock = Arc::clone(&self.clock);
        tokio::task::spawn_blocking(move || {
            let mut connection = pool
                .get()
                .map_err(|err| StoreError::connection(err.to_string()))?;
            f(&mut connection, clock.as_ref())
        })
        .await
        .map_err(|err| StoreError::connection(format!("task join error: {err}")))?
    }
}

#[async_trait]
impl AgentStore for SqliteAgentStore {
    async fn create_agent_entry(&self, agent: &AgentInfo) -> StoreResult<()> {
        let spiffeid = agent.spiffeid().clone();
        let plugin = agent.plugin().map(ToOwned::to_owned);

        self.run_blocking(move |connection, clock| {
            let mut tx = ClusterTransaction::begin(connection, clock)?;
            let result = tx.upsert_agent(&spiffeid, plugin.as_deref());
            tx.finish(result)
        })
        .await
    }

    async fn get_agent_selectors(&self) -> StoreResult<AgentInfoList> {
        self.run_blocking(|connection, _| {
            let query = agents::table
                .select((agents::spiffeid, agents::plugin))
                .order(agents::spiffeid.asc());
            let sql = statement_sql(&query);
            let rows = query
                .load::<(String, Option<String>)>(connection)
                .map_err(|err| StoreError::statement(sql, err))?;

            rows.into_iter()
                .map(|(spiffeid, plugin)| {
                    Ok(AgentInfo::new(parse_agent(spiffeid)?).with_plugin(plugin))
                })
                .collect::<StoreResult<Vec<_>>>()
                .map(AgentInfoList::new)
        })
        .await
    }

    async fn get_agent_plugin_info(&self, agent: &AgentId) -> StoreResult<AgentInfo> {
        let spiffeid = agent.clone();

        self.run_blocking(move |connection, _| {
            let query = agents::table
                .filter(agents::spiffeid.eq(spiffeid.as_str()))
                .select(agents::plugin);
            let sql = statement_sql(&query);
            let plugin = query
                .first::<Option<String>>(connection)
                .optional()
                .map_err(|err| StoreError::statement(sql, err))?
                .ok_or_else(|| StoreError::not_found(AGENT_DOES_NOT_EXIST))?;
            Ok(AgentInfo::new(spiffeid).with_plugin(plugin))
        })
        .await
    }

    async fn set_agent_selectors(&self, selectors: &AgentSelectors) -> StoreResult<()> {
        let entry = selectors.clone();

        self.run_blocking(move |connection, clock| {
            let mut tx = ClusterTransaction::begin(connection, clock)?;
            let result = tx.replace_agent_selectors(&entry);
            tx.finish(result)
        })
        .await
    }

    async fn get_agent_selector_entry(&self, agent: &AgentId) -> StoreResult<AgentSelectors> {
        let spiffeid = agent.clone();

        self.run_blocking(move |connection, _| {
            let query = agent_selectors::table
                .inner_join(agents::table)
                .filter(agents::spiffeid.eq(spiffeid.as_str()))
                .select((agent_selectors::plugin, agent_selectors::selectors));
            let sql = statement_sql(&query);
            let (plugin, encoded) = query
                .first::<(String, String)>(connection)
                .optional()
                .map_err(|err| StoreError::statement(sql, err))?
                .ok_or_else(|| StoreError::not_found(SELECTORS_DO_NOT_EXIST))?;

            let entries: Vec<String> =
                serde_json::from_str(&encoded).map_err(StoreError::invalid_persisted_data)?;
            AgentSelectors::new(spiffeid, plugin, entries)
                .map_err(StoreError::invalid_persisted_data)
        })
        .await
    }

    async fn get_clusters(&self) -> StoreResult<ClusterInfoList> {
        self.run_blocking(|connection, _| {
            let cluster_query = clusters::table
                .select(ClusterRow::as_select())
                .order(clusters::name.asc());
            let cluster_sql = statement_sql(&cluster_query);
            let rows = cluster_query
                .load::<ClusterRow>(connection)
                .map_err(|err| StoreError::statement(cluster_sql, err))?;

            let member_query = cluster_memberships::table
                .inner_join(agents::table)
                .select((cluster_memberships::cluster_id, agents::spiffeid))
                .order(agents::spiffeid.asc());
            let member_sql = statement_sql(&member_query);
            let members = member_query
                .load::<(i32, String)>(connection)
                .map_err(|err| StoreError::statement(member_sql, err))?;

            let mut agents_by_cluster: HashMap<i32, Vec<AgentId>> = HashMap::new();
            for (cluster_id, spiffeid) in members {
                agents_by_cluster
                    .entry(cluster_id)
                    .or_default()
                    .push(parse_agent(spiffeid)?);
            }

            rows.into_iter()
                .map(|row| {
                    let assigned = agents_by_cluster.remove(&row.id).unwrap_or_default();
                    row.into_cluster(assigned)
                })
                .collect::<StoreResult<Vec<_>>>()
                .map(ClusterInfoList::new)
        })
        .await
    }

    async fn create_cluster_entry(&self, cluster: &ClusterInfo) -> StoreResult<ClusterInfo> {
        let record = cluster.clone();

        self.run_blocking(move |connection, clock| {
            let mut tx = ClusterTransaction::begin(connection, clock)?;
            let result = tx
                .insert_cluster_metadata(&record)
                .and_then(|()| tx.add_agent_batch_to_cluster(record.uid(), record.agents()))
                .and_then(|()| tx.load_cluster(record.uid()));
            let stored = tx.finish(result)?;

            info!(
                uid = %stored.uid(),
                name = %stored.name(),
                agents = stored.agents().len(),
                "cluster created"
            );
            Ok(stored)
        })
        .await
    }

    async fn edit_cluster_entry(&self, cluster: &ClusterInfo) -> StoreResult<ClusterInfo> {
        let record = cluster.clone();

        self.run_blocking(move |connection, clock| {
            let mut tx = ClusterTransaction::begin(connection, clock)?;
            let result = tx
                .update_cluster_metadata(&record)
                .and_then(|()| tx.delete_cluster_agents(record.uid()))
                .and_then(|()| tx.add_agent_batch_to_cluster(record.uid(), record.agents()))
                .and_then(|()| tx.load_cluster(record.uid()));
            let stored = tx.finish(result)?;

            info!(
                uid = %stored.uid(),
                name = %stored.name(),
                agents = stored.agents().len(),
                "cluster edited"
            );
            Ok(stored)
        })
        .await
    }

    async fn delete_cluster_entry(&self, uid: &ClusterUid) -> StoreResult<()> {
        let cluster_uid = uid.clone();

        self.run_blocking(move |connection, clock| {
            let mut tx = ClusterTransaction::begin(connection, clock)?;
            let result = tx
                .delete_cluster_agents(&cluster_uid)
                .and_then(|()| tx.delete_cluster_metadata(&cluster_uid));
            tx.finish(result)?;

            info!(uid = %cluster_uid, "cluster deleted");
            Ok(())
        })
        .await
    }

    async fn get_agent_cluster_name(&self, agent: &AgentId) -> StoreResult<ClusterName> {
        let spiffeid = agent.clone();

        self.run_blocking(move |connection, _| {
            let query = cluster_memberships::table
                .inner_join(agents::table)
                .inner_join(clusters::table)
                .filter(agents::spiffeid.eq(spiffeid.as_str()))
                .select(clusters::name);
            let sql = statement_sql(&query);
            let name = query
                .first::<String>(connection)
                .optional()
                .map_err(|err| StoreError::statement(sql, err))?
                .ok_or_else(|| StoreError::not_found(AGENT_HAS_NO_CLUSTER))?;
            ClusterName::new(name).map_err(StoreError::invalid_persisted_data)
        })
        .await
    }

    async fn get_cluster_agents(&self, uid: &ClusterUid) -> StoreResult<Vec<AgentId>> {
        let cluster_uid = uid.clone();

        self.run_blocking(move |connection, _| {
            let query = cluster_memberships::table
                .inner_join(agents::table)
                .inner_join(clusters::table)
                .filter(clusters::uid.eq(cluster_uid.as_str()))
                .select(agents::spiffeid)
                .order(agents::spiffeid.asc());
            let sql = statement_sql(&query);
            query
                .load::<String>(connection)
                .map_err(|err| StoreError::statement(sql, err))?
                .into_iter()
                .map(parse_agent)
                .collect()
        })
        .await
    }

    async fn get_agents_metadata(
        &self,
        request: &AgentMetadataRequest,
    ) -> StoreResult<AgentInfoList> {
        let wanted: Vec<String> = request
            .agents()
            .iter()
            .map(|agent| agent.as_str().to_owned())
            .collect();

        self.run_blocking(move |connection, _| {
            let mut query = agents::table
                .left_join(
                    cluster_memberships::table.on(cluster_memberships::agent_id.eq(agents::id)),
                )
                .left_join(clusters::table.on(clusters::id.eq(cluster_memberships::cluster_id)))
                .select((agents::spiffeid, agents::plugin, clusters::name.nullable()))
                .order(agents::spiffeid.asc())
                .into_boxed::<Sqlite>();
            if !wanted.is_empty() {
                query = query.filter(agents::spiffeid.eq_any(wanted));
            }
            let sql = statement_sql(&query);
            let rows = query
                .load::<(String, Option<String>, Option<String>)>(connection)
                .map_err(|err| StoreError::statement(sql, err))?;

            rows.into_iter()
                .map(|(spiffeid, plugin, cluster)| {
                    let cluster_name = cluster
                        .map(ClusterName::new)
                        .transpose()
                        .map_err(StoreError::invalid_persisted_data)?;
                    Ok(AgentInfo::new(parse_agent(spiffeid)?)
                        .with_plugin(plugin)
                        .with_cluster(cluster_name))
                })
                .collect::<StoreResult<Vec<_>>>()
                .map(AgentInfoList::new)
        })
        .await
    }
}
