//! Application services for agent and cluster metadata.

mod metadata;

pub use metadata::{
    AgentMetadataService, AgentMetadataServiceError, AgentMetadataServiceResult, ClusterRequest,
    RegisterAgentRequest,
};
