//! Transaction helper for multi-step agent and cluster writes.
//!
//! A [`ClusterTransaction`] exclusively borrows one connection for the
//! lifetime of one transaction. Every operation translates unique-constraint
//! violations into [`StoreError::Conflict`] and every other driver failure
//! into [`StoreError::Statement`] carrying the SQL that failed. The recorded
//! SQL keeps its `?` placeholders; bound values never appear in errors.

use super::models::{ClusterRow, NewAgentRow, NewAgentSelectorsRow, NewClusterRow, parse_agent};
use super::schema::{agent_selectors, agents, cluster_memberships, clusters};
use crate::agent_metadata::domain::{
    AgentId, AgentSelectors, CREATION_TIME_FORMAT, ClusterInfo, ClusterUid,
};
use crate::agent_metadata::ports::{
    AGENT_ALREADY_ASSIGNED, CLUSTER_ALREADY_EXISTS, CLUSTER_DOES_NOT_EXIST, RollbackStatus,
    StoreError, StoreResult,
};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::query_builder::{QueryBuilder, QueryFragment};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteConnection, SqliteQueryBuilder};
use diesel::upsert::excluded;
use mockable::Clock;
use std::fmt;
use tracing::{debug, warn};

type Manager = AnsiTransactionManager;

const BEGIN_SQL: &str = "BEGIN";
const COMMIT_SQL: &str = "COMMIT";

const INSERT_AGENTS_PREFIX: &str = "INSERT OR IGNORE INTO agents (spiffeid, plugin) VALUES ";
const INSERT_AGENTS_ROW: &str = "(?, NULL)";
const INSERT_MEMBERSHIPS_PREFIX: &str =
    "INSERT OR ABORT INTO cluster_memberships (agent_id, cluster_id) VALUES ";
const INSERT_MEMBERSHIPS_ROW: &str = "((SELECT id FROM agents WHERE spiffeid = ?), \
     (SELECT id FROM clusters WHERE uid = ?))";

/// One open transaction over a pooled `SQLite` connection.
///
/// End it with [`commit`](Self::commit), [`rollback`](Self::rollback) or
/// [`finish`](Self::finish). A transaction dropped while still open is
/// rolled back.
pub struct ClusterTransaction<'a> {
    connection: &'a mut SqliteConnection,
    clock: &'a dyn Clock,
    open: bool,
}

impl fmt::Debug for ClusterTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterTransaction")
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl<'a> ClusterTransaction<'a> {
    /// Starts a transaction on `connection`.
    ///
    /// `clock` supplies cluster creation timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Statement`] when `BEGIN` fails, for example
    /// because the connection already has a transaction open.
    pub fn begin(
        connection: &'a mut SqliteConnection,
        clock: &'a dyn Clock,
    ) -> StoreResult<Self> {
        Manager::begin_transaction(connection)
            .map_err(|err| StoreError::statement(BEGIN_SQL, err))?;
        debug!("transaction started");
        Ok(Self {
            connection,
            clock,
            open: true,
        })
    }

    /// Inserts cluster metadata, stamping the creation time from the clock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the UID or name is already
    /// taken and [`StoreError::Statement`] for any other failure.
    pub fn insert_cluster_metadata(&mut self, cluster: &ClusterInfo) -> StoreResult<()> {
        let row = NewClusterRow {
            uid: cluster.uid().as_str(),
            name: cluster.name().as_str(),
            created_at: self.clock.utc().format(CREATION_TIME_FORMAT).to_string(),
            domain_name: cluster.domain_name(),
            managed_by: cluster.managed_by(),
            platform_type: cluster.platform_type(),
        };
        let query = diesel::insert_into(clusters::table).values(&row);
        let sql = statement_sql(&query);
        debug!(uid = %cluster.uid(), name = %cluster.name(), "inserting cluster metadata");

        query
            .execute(&mut *self.connection)
            .map_err(|err| translate(&sql, err, CLUSTER_ALREADY_EXISTS))?;
        Ok(())
    }

    /// Overwrites every mutable field of the cluster located by UID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the new name is taken or no
    /// cluster has the UID, and [`StoreError::Statement`] otherwise.
    pub fn update_cluster_metadata(&mut self, cluster: &ClusterInfo) -> StoreResult<()> {
        let target = clusters::table.filter(clusters::uid.eq(cluster.uid().as_str()));
        let query = diesel::update(target).set((
            clusters::name.eq(cluster.name().as_str()),
            clusters::domain_name.eq(cluster.domain_name()),
            clusters::managed_by.eq(cluster.managed_by()),
            clusters::platform_type.eq(cluster.platform_type()),
        ));
        let sql = statement_sql(&query);
        debug!(uid = %cluster.uid(), name = %cluster.name(), "updating cluster metadata");

        let updated = query
            .execute(&mut *self.connection)
            .map_err(|err| translate(&sql, err, CLUSTER_ALREADY_EXISTS))?;
        if updated == 0 {
            return Err(StoreError::conflict(CLUSTER_DOES_NOT_EXIST));
        }
        Ok(())
    }

    /// Deletes the cluster with the given UID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when no cluster has the UID and
    /// [`StoreError::Statement`] when the delete fails.
    pub fn delete_cluster_metadata(&mut self, uid: &ClusterUid) -> StoreResult<()> {
        let query = diesel::delete(clusters::table.filter(clusters::uid.eq(uid.as_str())));
        let sql = statement_sql(&query);
        debug!(uid = %uid, "deleting cluster metadata");

        let deleted = query
            .execute(&mut *self.connection)
            .map_err(|err| StoreError::statement(sql, err))?;
        if deleted == 0 {
            return Err(StoreError::conflict(CLUSTER_DOES_NOT_EXIST));
        }
        Ok(())
    }

    /// Assigns agents to a cluster, creating unknown agents on the way.
    ///
    /// Agents are inserted with one multi-row `INSERT OR IGNORE`; the
    /// memberships with one multi-row insert that resolves agents by
    /// identity and the cluster by UID. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when an agent already belongs to a
    /// cluster and [`StoreError::Statement`] for any other failure,
    /// including an unknown cluster UID.
    pub fn add_agent_batch_to_cluster(
        &mut self,
        uid: &ClusterUid,
        agent_ids: &[AgentId],
    ) -> StoreResult<()> {
        if agent_ids.is_empty() {
            debug!(uid = %uid, "empty agent batch, nothing to assign");
            return Ok(());
        }
        debug!(uid = %uid, agents = agent_ids.len(), "assigning agent batch to cluster");

        let agents_sql = batch_statement(INSERT_AGENTS_PREFIX, INSERT_AGENTS_ROW, agent_ids.len());
        let agents_query = agent_ids.iter().fold(
            diesel::sql_query(agents_sql.as_str()).into_boxed::<Sqlite>(),
            |query, agent| query.bind::<Text, _>(agent.as_str().to_owned()),
        );
        agents_query
            .execute(&mut *self.connection)
            .map_err(|err| StoreError::statement(agents_sql.as_str(), err))?;

        let memberships_sql = batch_statement(
            INSERT_MEMBERSHIPS_PREFIX,
            INSERT_MEMBERSHIPS_ROW,
            agent_ids.len(),
        );
        let memberships_query = agent_ids.iter().fold(
            diesel::sql_query(memberships_sql.as_str()).into_boxed::<Sqlite>(),
            |query, agent| {
                query
                    .bind::<Text, _>(agent.as_str().to_owned())
                    .bind::<Text, _>(uid.as_str().to_owned())
            },
        );
        memberships_query
            .execute(&mut *self.connection)
            .map_err(|err| translate(&memberships_sql, err, AGENT_ALREADY_ASSIGNED))?;
        Ok(())
    }

    /// Removes every membership of the cluster with the given UID.
    ///
    /// Deleting from a cluster without members is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Statement`] when the delete fails.
    pub fn delete_cluster_agents(&mut self, uid: &ClusterUid) -> StoreResult<()> {
        let cluster_ids = clusters::table
            .filter(clusters::uid.eq(uid.as_str()))
            .select(clusters::id);
        let query = diesel::delete(
            cluster_memberships::table.filter(cluster_memberships::cluster_id.eq_any(cluster_ids)),
        );
        let sql = statement_sql(&query);

        let removed = query
            .execute(&mut *self.connection)
            .map_err(|err| StoreError::statement(sql, err))?;
        debug!(uid = %uid, removed, "removed cluster memberships");
        Ok(())
    }

    /// Reads back a cluster and its members as this transaction sees them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no cluster has the UID and
    /// [`StoreError::Statement`] when a lookup fails.
    pub fn load_cluster(&mut self, uid: &ClusterUid) -> StoreResult<ClusterInfo> {
        let cluster_query = clusters::table
            .filter(clusters::uid.eq(uid.as_str()))
            .select(ClusterRow::as_select());
        let cluster_sql = statement_sql(&cluster_query);
        let row = cluster_query
            .first::<ClusterRow>(&mut *self.connection)
            .optional()
            .map_err(|err| StoreError::statement(cluster_sql, err))?
            .ok_or_else(|| StoreError::not_found(CLUSTER_DOES_NOT_EXIST))?;

        let member_query = cluster_memberships::table
            .inner_join(agents::table)
            .filter(cluster_memberships::cluster_id.eq(row.id))
            .select(agents::spiffeid)
            .order(agents::spiffeid.asc());
        let member_sql = statement_sql(&member_query);
        let members = member_query
            .load::<String>(&mut *self.connection)
            .map_err(|err| StoreError::statement(member_sql, err))?
            .into_iter()
            .map(parse_agent)
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(uid = %uid, agents = members.len(), "loaded cluster");
        row.into_cluster(members)
    }

    /// Creates the agent or replaces its plugin, keeping its row identity so
    /// cluster memberships survive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Statement`] when the upsert fails.
    pub fn upsert_agent(&mut self, agent: &AgentId, plugin: Option<&str>) -> StoreResult<()> {
        let row = NewAgentRow {
            spiffeid: agent.as_str(),
            plugin,
        };
        let query = diesel::insert_into(agents::table)
            .values(&row)
            .on_conflict(agents::spiffeid)
            .do_update()
            .set(agents::plugin.eq(excluded(agents::plugin)));
        let sql = statement_sql(&query);
        debug!(agent = %agent, "upserting agent");

        query
            .execute(&mut *self.connection)
            .map_err(|err| StoreError::statement(sql, err))?;
        Ok(())
    }

    /// Records the plugin and selectors of an agent, replacing earlier ones.
    ///
    /// Unknown agents are created without a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Statement`] when a statement fails.
    pub fn replace_agent_selectors(&mut self, selectors: &AgentSelectors) -> StoreResult<()> {
        let agent = selectors.spiffeid();
        let ensure_agent = diesel::insert_or_ignore_into(agents::table).values(NewAgentRow {
            spiffeid: agent.as_str(),
            plugin: None,
        });
        let ensure_sql = statement_sql(&ensure_agent);
        ensure_agent
            .execute(&mut *self.connection)
            .map_err(|err| StoreError::statement(ensure_sql, err))?;

        let lookup = agents::table
            .filter(agents::spiffeid.eq(agent.as_str()))
            .select(agents::id);
        let lookup_sql = statement_sql(&lookup);
        let agent_id = lookup
            .first::<i32>(&mut *self.connection)
            .map_err(|err| StoreError::statement(lookup_sql, err))?;

        let encoded = serde_json::to_string(selectors.selectors())
            .map_err(|err| StoreError::Other(format!("selector encoding failed: {err}")))?;
        let row = NewAgentSelectorsRow {
            agent_id,
            plugin: selectors.plugin(),
            selectors: encoded,
        };
        let query = diesel::insert_into(agent_selectors::table)
            .values(&row)
            .on_conflict(agent_selectors::agent_id)
            .do_update()
            .set((
                agent_selectors::plugin.eq(excluded(agent_selectors::plugin)),
                agent_selectors::selectors.eq(excluded(agent_selectors::selectors)),
            ));
        let sql = statement_sql(&query);
        debug!(agent = %agent, plugin = selectors.plugin(), "replacing agent selectors");

        query
            .execute(&mut *self.connection)
            .map_err(|err| StoreError::statement(sql, err))?;
        Ok(())
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Statement`] with `COMMIT` as its SQL when the
    /// commit fails.
    pub fn commit(mut self) -> StoreResult<()> {
        self.open = false;
        Manager::commit_transaction(&mut *self.connection)
            .map_err(|err| StoreError::statement(COMMIT_SQL, err))?;
        debug!("transaction committed");
        Ok(())
    }

    /// Rolls the transaction back and annotates `cause` with the outcome.
    ///
    /// Calling this without a cause is a programming error: the transaction
    /// is still rolled back, and [`StoreError::RollbackWithoutCause`] is
    /// returned.
    #[must_use]
    pub fn rollback(mut self, cause: Option<StoreError>) -> StoreError {
        self.open = false;
        let status = Manager::rollback_transaction(&mut *self.connection).map_or_else(
            |err| RollbackStatus::Failed(err.to_string()),
            |()| RollbackStatus::Succeeded,
        );

        cause.map_or_else(
            || {
                warn!(rollback = %status, "rollback handler called without an error");
                StoreError::RollbackWithoutCause(status.clone())
            },
            |err| {
                warn!(error = %err, rollback = %status, "transaction rolled back");
                err.with_rollback_status(&status)
            },
        )
    }

    /// Commits on success and rolls back on failure.
    ///
    /// # Errors
    ///
    /// Returns the annotated cause after a rollback, or the commit failure.
    pub fn finish<T>(self, result: StoreResult<T>) -> StoreResult<T> {
        match result {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => Err(self.rollback(Some(err))),
        }
    }
}

impl Drop for ClusterTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            let rolled_back = Manager::rollback_transaction(&mut *self.connection).is_ok();
            warn!(rolled_back, "transaction dropped while open");
        }
    }
}

fn translate(sql: &str, err: DieselError, conflict: &str) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StoreError::conflict(conflict)
        }
        _ => StoreError::statement(sql, err),
    }
}

/// Renders the SQL of `query` with placeholders in place of bound values.
pub(super) fn statement_sql<Q>(query: &Q) -> String
where
    Q: QueryFragment<Sqlite>,
{
    let mut builder = SqliteQueryBuilder::new();
    query.to_sql(&mut builder, &Sqlite).map_or_else(
        |err| format!("<unrenderable statement: {err}>"),
        |()| builder.finish(),
    )
}

/// Builds `prefix` followed by `rows` comma-separated copies of `row`.
fn batch_statement(prefix: &str, row: &str, rows: usize) -> String {
    let values = std::iter::repeat_n(row, rows).collect::<Vec<_>>().join(", ");
    format!("{prefix}{values}")
}
