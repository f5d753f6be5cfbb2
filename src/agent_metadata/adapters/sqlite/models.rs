//! Diesel row models for agent and cluster metadata.

use super::schema::{agent_selectors, agents, clusters};
use crate::agent_metadata::domain::{
    AgentId, ClusterInfo, ClusterName, ClusterUid, PersistedClusterData,
};
use crate::agent_metadata::ports::{StoreError, StoreResult};
use diesel::prelude::*;

/// Query result row for cluster records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = clusters)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ClusterRow {
    /// Internal row identifier, used to group memberships.
    pub id: i32,
    /// Cluster UID.
    pub uid: String,
    /// Cluster name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Trust domain name.
    pub domain_name: String,
    /// Managing authority.
    pub managed_by: String,
    /// Platform type.
    pub platform_type: String,
}

impl ClusterRow {
    /// Rebuilds the cluster record with its member agents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPersistedData`] when the stored UID or
    /// name fails validation.
    pub fn into_cluster(self, agents: Vec<AgentId>) -> StoreResult<ClusterInfo> {
        let uid = ClusterUid::new(self.uid).map_err(StoreError::invalid_persisted_data)?;
        let name = ClusterName::new(self.name).map_err(StoreError::invalid_persisted_data)?;
        Ok(ClusterInfo::from_persisted(PersistedClusterData {
            uid,
            name,
            creation_time: self.created_at,
            domain_name: self.domain_name,
            managed_by: self.managed_by,
            platform_type: self.platform_type,
            agents,
        }))
    }
}

/// Validates a stored agent identity.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPersistedData`] for a blank identity.
pub fn parse_agent(spiffeid: String) -> StoreResult<AgentId> {
    AgentId::new(spiffeid).map_err(StoreError::invalid_persisted_data)
}

/// Insert model for cluster records.
#[derive(Debug, Insertable)]
#[diesel(table_name = clusters)]
pub struct NewClusterRow<'a> {
    /// Cluster UID.
    pub uid: &'a str,
    /// Cluster name.
    pub name: &'a str,
    /// Creation timestamp generated at insert time.
    pub created_at: String,
    /// Trust domain name.
    pub domain_name: &'a str,
    /// Managing authority.
    pub managed_by: &'a str,
    /// Platform type.
    pub platform_type: &'a str,
}

/// Insert model for agent records.
#[derive(Debug, Insertable)]
#[diesel(table_name = agents)]
#[diesel(treat_none_as_null = true)]
pub struct NewAgentRow<'a> {
    /// SPIFFE ID.
    pub spiffeid: &'a str,
    /// Optional plugin association.
    pub plugin: Option<&'a str>,
}

/// Insert model for agent selector records.
#[derive(Debug, Insertable)]
#[diesel(table_name = agent_selectors)]
pub struct NewAgentSelectorsRow<'a> {
    /// Internal agent row identifier.
    pub agent_id: i32,
    /// Attesting plugin.
    pub plugin: &'a str,
    /// JSON-encoded selector list.
    pub selectors: String,
}
