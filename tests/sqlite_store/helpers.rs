//! Shared test helpers for `SQLite` integration tests.

use agentdb::agent_metadata::{
    adapters::sqlite::{SqliteAgentStore, StoreConfig},
    domain::{AgentId, ClusterInfo, ClusterName, ClusterUid},
};
use chrono::{DateTime, Local, TimeZone, Utc};
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel::sqlite::SqliteConnection;
use mockable::Clock;
use rstest::fixture;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Creation timestamp rendered from [`fixed_instant`].
pub const FIXED_CREATION_TIME: &str = "Jan 02 2026 15:04:05";

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The instant every test clock reports.
#[must_use]
pub fn fixed_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 2, 15, 4, 5)
        .single()
        .expect("valid fixed instant")
}

/// Provides a [`FixedClock`] for test fixtures.
#[fixture]
pub fn clock() -> FixedClock {
    FixedClock(fixed_instant())
}

/// Installs a test log subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .unwrap_or_default();
}

/// Opens a fresh in-memory store with the schema applied.
#[fixture]
pub fn store(clock: FixedClock) -> SqliteAgentStore {
    init_tracing();
    SqliteAgentStore::open(&StoreConfig::in_memory())
        .expect("in-memory store should open")
        .with_clock(Arc::new(clock))
}

/// Builds an agent identity under `spiffe://example.org/`.
#[must_use]
pub fn agent(name: &str) -> AgentId {
    AgentId::new(format!("spiffe://example.org/agent/{name}")).expect("valid SPIFFE ID")
}

/// Builds cluster metadata with the given members.
#[must_use]
pub fn cluster(uid: &str, name: &str, agents: &[&str]) -> ClusterInfo {
    ClusterInfo::new(
        ClusterUid::new(uid).expect("valid cluster uid"),
        ClusterName::new(name).expect("valid cluster name"),
    )
    .with_domain_name("example.org")
    .with_managed_by("platform-team")
    .with_platform_type("kubernetes")
    .with_agents(agents.iter().map(|entry| agent(entry)).collect())
}

/// Builds a validated cluster UID.
#[must_use]
pub fn uid(value: &str) -> ClusterUid {
    ClusterUid::new(value).expect("valid cluster uid")
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Row counts of every metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCounts {
    /// Rows in `agents`.
    pub agents: i64,
    /// Rows in `clusters`.
    pub clusters: i64,
    /// Rows in `cluster_memberships`.
    pub memberships: i64,
    /// Rows in `agent_selectors`.
    pub selectors: i64,
}

fn count_rows(connection: &mut SqliteConnection, table: &str) -> eyre::Result<i64> {
    let row = diesel::sql_query(format!("SELECT COUNT(*) AS count FROM {table}"))
        .get_result::<CountRow>(connection)?;
    Ok(row.count)
}

/// Counts rows using an open connection.
///
/// # Errors
///
/// Returns an error when a count query fails.
pub fn row_counts_on(connection: &mut SqliteConnection) -> eyre::Result<RowCounts> {
    Ok(RowCounts {
        agents: count_rows(connection, "agents")?,
        clusters: count_rows(connection, "clusters")?,
        memberships: count_rows(connection, "cluster_memberships")?,
        selectors: count_rows(connection, "agent_selectors")?,
    })
}

/// Counts rows through the store's pool.
///
/// The pooled connection is released before returning so the store can use
/// it again.
///
/// # Errors
///
/// Returns an error when no connection is available or a count fails.
pub fn row_counts(store: &SqliteAgentStore) -> eyre::Result<RowCounts> {
    let mut connection = store.pool().get()?;
    row_counts_on(&mut connection)
}
