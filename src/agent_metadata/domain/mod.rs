//! Domain model for agent and cluster metadata.
//!
//! Value types validate their input on construction. Payload structs are
//! transient request/response values; the relational store owns all
//! persisted state.

mod agent;
mod cluster;
mod error;
mod ids;
mod name;
mod selectors;

pub use agent::{AgentInfo, AgentInfoList, AgentMetadataRequest};
pub use cluster::{CREATION_TIME_FORMAT, ClusterInfo, ClusterInfoList, PersistedClusterData};
pub use error::AgentMetadataDomainError;
pub use ids::{AgentId, ClusterUid};
pub use name::ClusterName;
pub use selectors::AgentSelectors;
