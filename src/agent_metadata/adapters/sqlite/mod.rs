//! `SQLite` adapters for agent and cluster metadata persistence.

mod config;
mod models;
mod repository;
mod schema;
mod transaction;

pub use config::{SqlitePool, StoreConfig, apply_schema, build_pool};
pub use repository::SqliteAgentStore;
pub use transaction::ClusterTransaction;
