//! Agent upserts, plugin lookups and selectors against `SQLite`.

use crate::sqlite_store::helpers::{agent, cluster, row_counts, store};
use agentdb::agent_metadata::{
    adapters::sqlite::SqliteAgentStore,
    domain::{AgentInfo, AgentSelectors},
    ports::{AGENT_DOES_NOT_EXIST, AgentStore, SELECTORS_DO_NOT_EXIST, StoreError},
};
use rstest::rstest;

fn with_plugin(name: &str, plugin: Option<&str>) -> AgentInfo {
    AgentInfo::new(agent(name)).with_plugin(plugin.map(ToOwned::to_owned))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_agent_entry_replaces_the_plugin(store: SqliteAgentStore) {
    store
        .create_agent_entry(&with_plugin("a1", Some("join_token")))
        .await
        .expect("first upsert should succeed");
    store
        .create_agent_entry(&with_plugin("a1", Some("k8s_psat")))
        .await
        .expect("second upsert should succeed");

    let info = store
        .get_agent_plugin_info(&agent("a1"))
        .await
        .expect("agent should exist");
    assert_eq!(info.plugin(), Some("k8s_psat"));
    assert_eq!(row_counts(&store).expect("row counts").agents, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn upserting_an_assigned_agent_keeps_its_membership(store: SqliteAgentStore) {
    store
        .create_cluster_entry(&cluster("c1", "one", &["a1"]))
        .await
        .expect("cluster creation should succeed");

    store
        .create_agent_entry(&with_plugin("a1", Some("aws_iid")))
        .await
        .expect("upsert should succeed");

    let name = store
        .get_agent_cluster_name(&agent("a1"))
        .await
        .expect("agent should keep its cluster");
    assert_eq!(name.as_str(), "one");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_agent_plugin_lookup_is_not_found(store: SqliteAgentStore) {
    let err = store
        .get_agent_plugin_info(&agent("ghost"))
        .await
        .expect_err("agent is unknown");
    assert!(matches!(err, StoreError::NotFound(ref message) if message == AGENT_DOES_NOT_EXIST));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn get_agent_selectors_lists_every_agent_with_its_plugin(store: SqliteAgentStore) {
    store
        .create_agent_entry(&with_plugin("b", None))
        .await
        .expect("upsert should succeed");
    store
        .create_agent_entry(&with_plugin("a", Some("x509pop")))
        .await
        .expect("upsert should succeed");

    let listed = store
        .get_agent_selectors()
        .await
        .expect("listing should succeed");
    assert_eq!(
        listed.into_agents(),
        vec![with_plugin("a", Some("x509pop")), with_plugin("b", None)]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn selectors_are_recorded_and_replaced(store: SqliteAgentStore) {
    let first = AgentSelectors::new(
        agent("a1"),
        "k8s_psat",
        ["k8s_psat:cluster:prod".to_owned(), "k8s_psat:agent_ns:spire".to_owned()],
    )
    .expect("valid selectors");
    store
        .set_agent_selectors(&first)
        .await
        .expect("selectors should be recorded");

    let replacement =
        AgentSelectors::new(agent("a1"), "aws_iid", ["aws_iid:tag:env:prod".to_owned()])
            .expect("valid selectors");
    store
        .set_agent_selectors(&replacement)
        .await
        .expect("selectors should be replaced");

    let stored = store
        .get_agent_selector_entry(&agent("a1"))
        .await
        .expect("selectors should exist");
    assert_eq!(stored, replacement);

    let counts = row_counts(&store).expect("row counts");
    assert_eq!(counts.agents, 1);
    assert_eq!(counts.selectors, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_selectors_are_not_found(store: SqliteAgentStore) {
    store
        .create_agent_entry(&with_plugin("a1", None))
        .await
        .expect("upsert should succeed");

    let err = store
        .get_agent_selector_entry(&agent("a1"))
        .await
        .expect_err("nothing recorded");
    assert!(matches!(err, StoreError::NotFound(ref message) if message == SELECTORS_DO_NOT_EXIST));
}
