//! Agent assignment and membership queries against `SQLite`.

use crate::sqlite_store::helpers::{agent, cluster, row_counts, store, uid};
use agentdb::agent_metadata::{
    adapters::sqlite::SqliteAgentStore,
    domain::{AgentId, AgentInfo, AgentMetadataRequest, ClusterInfo, ClusterName},
    ports::{AGENT_ALREADY_ASSIGNED, AGENT_HAS_NO_CLUSTER, AgentStore, StoreError},
};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn double_assignment_conflicts_and_keeps_existing_memberships(store: SqliteAgentStore) {
    store
        .create_cluster_entry(&cluster("c1", "one", &["a1", "a2"]))
        .await
        .expect("first cluster should be created");

    let err = store
        .create_cluster_entry(&cluster("c2", "two", &["a1"]))
        .await
        .expect_err("a1 already belongs to c1");

    let message = err.conflict_message().expect("conflict error");
    assert!(message.starts_with(AGENT_ALREADY_ASSIGNED), "got {message}");

    let name = store
        .get_agent_cluster_name(&agent("a2"))
        .await
        .expect("a2 should stay assigned");
    assert_eq!(name.as_str(), "one");
    assert_eq!(
        store.get_cluster_agents(&uid("c1")).await.expect("c1 agents"),
        vec![agent("a1"), agent("a2")]
    );
    assert!(store.get_cluster_agents(&uid("c2")).await.expect("c2 agents").is_empty());
    assert_eq!(row_counts(&store).expect("row counts").clusters, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn plain_identity_strings_are_assigned_to_one_cluster_only(store: SqliteAgentStore) {
    let plain = |value: &str| AgentId::new(value).expect("non-blank identity");
    let first = ClusterInfo::new(uid("c1"), ClusterName::new("one").expect("valid name"))
        .with_agents(vec![plain("a1"), plain("a2")]);
    let second = ClusterInfo::new(uid("c2"), ClusterName::new("two").expect("valid name"))
        .with_agents(vec![plain("a1")]);

    store
        .create_cluster_entry(&first)
        .await
        .expect("c1 should accept a1 and a2");
    let err = store
        .create_cluster_entry(&second)
        .await
        .expect_err("a1 already belongs to c1");

    let message = err.conflict_message().expect("conflict error");
    assert!(message.starts_with(AGENT_ALREADY_ASSIGNED), "got {message}");
    assert_eq!(
        store.get_cluster_agents(&uid("c1")).await.expect("c1 agents"),
        vec![plain("a1"), plain("a2")]
    );
    let name = store
        .get_agent_cluster_name(&plain("a2"))
        .await
        .expect("a2 should stay assigned");
    assert_eq!(name.as_str(), "one");

    let metadata = store
        .get_agents_metadata(&AgentMetadataRequest::new(vec![plain("a1")]))
        .await
        .expect("metadata lookup");
    let [entry] = metadata.agents() else {
        panic!("expected exactly one agent, got {metadata:?}");
    };
    assert_eq!(entry.spiffeid().as_str(), "a1");
    assert_eq!(entry.cluster().map(ClusterName::as_str), Some("one"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn editing_can_reassign_the_clusters_own_agents(store: SqliteAgentStore) {
    store
        .create_cluster_entry(&cluster("c1", "one", &["a1", "a2"]))
        .await
        .expect("cluster creation should succeed");

    store
        .edit_cluster_entry(&cluster("c1", "one", &["a1"]))
        .await
        .expect("keeping a1 should succeed");

    assert_eq!(
        store.get_cluster_agents(&uid("c1")).await.expect("c1 agents"),
        vec![agent("a1")]
    );
    let err = store
        .get_agent_cluster_name(&agent("a2"))
        .await
        .expect_err("a2 was released");
    assert!(matches!(err, StoreError::NotFound(ref message) if message == AGENT_HAS_NO_CLUSTER));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_cluster_has_no_agents(store: SqliteAgentStore) {
    let agents = store
        .get_cluster_agents(&uid("nowhere"))
        .await
        .expect("lookup should succeed");
    assert!(agents.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn agents_metadata_reports_plugin_and_cluster(store: SqliteAgentStore) {
    store
        .create_cluster_entry(&cluster("c1", "one", &["a1", "a2"]))
        .await
        .expect("cluster creation should succeed");
    store
        .create_agent_entry(
            &AgentInfo::new(agent("a3")).with_plugin(Some("aws_iid".to_owned())),
        )
        .await
        .expect("agent creation should succeed");

    let all = store
        .get_agents_metadata(&AgentMetadataRequest::all())
        .await
        .expect("metadata lookup should succeed");
    assert_eq!(all.len(), 3);

    let filtered = store
        .get_agents_metadata(&AgentMetadataRequest::new(vec![agent("a3"), agent("a2")]))
        .await
        .expect("filtered lookup should succeed");
    let rows: Vec<(String, Option<&str>, Option<&str>)> = filtered
        .agents()
        .iter()
        .map(|info| {
            (
                info.spiffeid().to_string(),
                info.plugin(),
                info.cluster().map(ClusterName::as_str),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            (agent("a2").to_string(), None, Some("one")),
            (agent("a3").to_string(), Some("aws_iid"), None),
        ]
    );
}
