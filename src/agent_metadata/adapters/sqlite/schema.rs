//! Diesel schema for agent and cluster metadata.

diesel::table! {
    /// Known agents keyed by SPIFFE ID.
    agents (id) {
        /// Internal row identifier.
        id -> Integer,
        /// Unique SPIFFE ID.
        spiffeid -> Text,
        /// Optional plugin association.
        plugin -> Nullable<Text>,
    }
}

diesel::table! {
    /// Cluster metadata.
    clusters (id) {
        /// Internal row identifier.
        id -> Integer,
        /// Unique, stable cluster UID.
        uid -> Text,
        /// Unique display name.
        name -> Text,
        /// Creation timestamp in the fixed human-readable format.
        created_at -> Text,
        /// Trust domain name.
        domain_name -> Text,
        /// Managing authority.
        managed_by -> Text,
        /// Platform type.
        platform_type -> Text,
    }
}

diesel::table! {
    /// Agent-to-cluster assignments. `agent_id` is unique.
    cluster_memberships (id) {
        /// Internal row identifier.
        id -> Integer,
        /// Assigned agent.
        agent_id -> Integer,
        /// Owning cluster.
        cluster_id -> Integer,
    }
}

diesel::table! {
    /// Plugin and selectors attested for an agent.
    agent_selectors (id) {
        /// Internal row identifier.
        id -> Integer,
        /// Agent the selectors belong to. Unique.
        agent_id -> Integer,
        /// Attesting plugin.
        plugin -> Text,
        /// Selectors as a JSON array of strings.
        selectors -> Text,
    }
}

diesel::joinable!(cluster_memberships -> agents (agent_id));
diesel::joinable!(cluster_memberships -> clusters (cluster_id));
diesel::joinable!(agent_selectors -> agents (agent_id));

diesel::allow_tables_to_appear_in_same_query!(
    agents,
    clusters,
    cluster_memberships,
    agent_selectors,
);
