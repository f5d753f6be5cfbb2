//! In-memory adapters for agent metadata tests.

mod store;

pub use store::InMemoryAgentStore;
