//! Port contracts for agent and cluster metadata persistence.
//!
//! Ports define infrastructure-agnostic interfaces used by the metadata
//! service.

pub mod store;

#[cfg(test)]
pub use store::MockAgentStore;
pub use store::{
    AGENT_ALREADY_ASSIGNED, AGENT_DOES_NOT_EXIST, AGENT_HAS_NO_CLUSTER, AgentStore,
    CLUSTER_ALREADY_EXISTS, CLUSTER_DOES_NOT_EXIST, RollbackStatus, SELECTORS_DO_NOT_EXIST,
    StoreError, StoreResult,
};
