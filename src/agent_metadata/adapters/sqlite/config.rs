//! Connection pool configuration and schema bootstrap for `SQLite`.

use crate::agent_metadata::ports::{StoreError, StoreResult};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// `SQLite` connection pool type used by the metadata store.
pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const IN_MEMORY_URL: &str = ":memory:";
const DEFAULT_DATABASE_URL: &str = "agentdb.sqlite3";
const DEFAULT_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA_SQL: &str =
    include_str!("../../../../migrations/2026-10-17-000000_create_agent_metadata/up.sql");

/// Settings for opening a metadata store.
///
/// Deserializes from configuration files; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    database_url: String,
    max_connections: u32,
    busy_timeout_ms: u64,
    foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for the database file at `database_url`.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Creates a configuration for a private in-memory database.
    ///
    /// Every `SQLite` connection to `:memory:` sees its own database, so the
    /// pool is limited to a single connection.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            database_url: IN_MEMORY_URL.to_owned(),
            max_connections: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum number of pooled connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Sets how long a connection waits on a locked database.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables foreign key enforcement.
    #[must_use]
    pub const fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Returns the database URL or file path.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Returns the maximum number of pooled connections.
    #[must_use]
    pub const fn max_connections(&self) -> u32 {
        self.max_connections
    }

    /// Returns the busy timeout.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Returns `true` when foreign keys are enforced.
    #[must_use]
    pub const fn foreign_keys(&self) -> bool {
        self.foreign_keys
    }

    /// Returns `true` for an in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database_url == IN_MEMORY_URL
    }
}

/// Per-connection pragmas applied when the pool hands out a connection.
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout_ms: u64,
    foreign_keys: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, connection: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let foreign_keys = if self.foreign_keys { "ON" } else { "OFF" };
        connection
            .batch_execute(&format!(
                "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = {foreign_keys};",
                self.busy_timeout_ms
            ))
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Builds a connection pool for the configured database.
///
/// # Errors
///
/// Returns [`StoreError::Connection`] when the pool cannot open its
/// connections.
pub fn build_pool(config: &StoreConfig) -> StoreResult<SqlitePool> {
    let manager = ConnectionManager::<SqliteConnection>::new(config.database_url());
    let pragmas = ConnectionPragmas {
        busy_timeout_ms: config.busy_timeout_ms,
        foreign_keys: config.foreign_keys,
    };

    let mut builder = Pool::builder()
        .max_size(config.max_connections())
        .connection_customizer(Box::new(pragmas));
    if config.is_in_memory() {
        // Recycling the only connection would discard the database.
        builder = builder.idle_timeout(None).max_lifetime(None);
    }

    debug!(
        database = config.database_url(),
        max_connections = config.max_connections(),
        "building sqlite connection pool"
    );
    builder
        .build(manager)
        .map_err(|err| StoreError::connection(err.to_string()))
}

/// Creates the metadata tables when they do not exist yet.
///
/// # Errors
///
/// Returns [`StoreError::Statement`] when the schema script fails.
pub fn apply_schema(connection: &mut SqliteConnection) -> StoreResult<()> {
    connection
        .batch_execute(SCHEMA_SQL)
        .map_err(|err| StoreError::statement(SCHEMA_SQL, err))
}
