//! Transaction helper steps, rollback handling and atomicity.

use crate::sqlite_store::helpers::{
    FixedClock, agent, clock, cluster, row_counts, row_counts_on, store, uid,
};
use agentdb::agent_metadata::{
    adapters::sqlite::{ClusterTransaction, SqliteAgentStore},
    domain::AgentSelectors,
    ports::{
        AGENT_ALREADY_ASSIGNED, AgentStore, CLUSTER_DOES_NOT_EXIST, RollbackStatus, StoreError,
    },
};
use diesel::prelude::*;
use rstest::rstest;

#[rstest]
fn empty_agent_batch_touches_nothing(store: SqliteAgentStore, clock: FixedClock) {
    let mut connection = store.pool().get().expect("pooled connection");
    let before = row_counts_on(&mut connection).expect("row counts");

    let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    tx.add_agent_batch_to_cluster(&uid("c1"), &[])
        .expect("empty batch should succeed");
    tx.commit().expect("commit");

    assert_eq!(row_counts_on(&mut connection).expect("row counts"), before);
}

#[rstest]
fn clearing_a_cluster_without_members_succeeds(store: SqliteAgentStore, clock: FixedClock) {
    let mut connection = store.pool().get().expect("pooled connection");

    let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    tx.insert_cluster_metadata(&cluster("c1", "one", &[]))
        .expect("insert");
    tx.delete_cluster_agents(&uid("c1"))
        .expect("no members is not an error");
    tx.delete_cluster_agents(&uid("missing"))
        .expect("unknown cluster is not an error");
    tx.commit().expect("commit");

    assert_eq!(row_counts_on(&mut connection).expect("row counts").clusters, 1);
}

#[rstest]
fn updating_an_unknown_cluster_reports_zero_rows(store: SqliteAgentStore, clock: FixedClock) {
    let mut connection = store.pool().get().expect("pooled connection");

    let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    let err = tx
        .update_cluster_metadata(&cluster("missing", "one", &[]))
        .expect_err("zero rows should be rejected");
    assert_eq!(err.conflict_message(), Some(CLUSTER_DOES_NOT_EXIST));

    let annotated = tx.rollback(Some(err));
    assert_eq!(
        annotated.conflict_message(),
        Some("cluster does not exist: [Successful rollback upon error]")
    );
}

#[rstest]
fn batch_for_an_unknown_cluster_is_a_statement_error(store: SqliteAgentStore, clock: FixedClock) {
    let mut connection = store.pool().get().expect("pooled connection");
    let before = row_counts_on(&mut connection).expect("row counts");

    let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    let err = tx
        .add_agent_batch_to_cluster(&uid("missing"), &[agent("a1")])
        .expect_err("membership needs an existing cluster");

    let StoreError::Statement { ref sql, .. } = err else {
        panic!("expected a statement error, got {err:?}");
    };
    assert!(sql.starts_with("INSERT OR ABORT INTO cluster_memberships"), "got {sql}");
    assert!(tx.rollback(Some(err)).is_statement());
    assert_eq!(row_counts_on(&mut connection).expect("row counts"), before);
}

#[rstest]
fn statement_errors_record_placeholders_not_caller_values(
    store: SqliteAgentStore,
    clock: FixedClock,
) {
    let mut connection = store.pool().get().expect("pooled connection");
    diesel::sql_query("DROP TABLE agent_selectors")
        .execute(&mut connection)
        .expect("drop selectors table");
    let selectors = AgentSelectors::new(
        agent("secret-agent"),
        "secret-plugin",
        vec!["secret:selector".to_owned()],
    )
    .expect("valid selectors");

    let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    let err = tx
        .replace_agent_selectors(&selectors)
        .expect_err("selectors table is gone");

    let StoreError::Statement { ref sql, .. } = err else {
        panic!("expected a statement error, got {err:?}");
    };
    assert!(sql.contains("agent_selectors"), "got {sql}");
    assert!(sql.contains('?'), "got {sql}");
    assert!(!sql.contains("secret"), "got {sql}");
    assert!(!sql.contains("binds"), "got {sql}");
    assert!(tx.rollback(Some(err)).is_statement());
}

#[rstest]
fn rollback_restores_the_starting_snapshot(store: SqliteAgentStore, clock: FixedClock) {
    let mut connection = store.pool().get().expect("pooled connection");
    {
        let mut setup = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
        setup
            .insert_cluster_metadata(&cluster("c1", "one", &[]))
            .expect("insert c1");
        setup
            .add_agent_batch_to_cluster(&uid("c1"), &[agent("a1"), agent("a2")])
            .expect("assign a1 and a2");
        setup.commit().expect("commit");
    }
    let before = row_counts_on(&mut connection).expect("row counts");

    let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    tx.insert_cluster_metadata(&cluster("c2", "two", &[]))
        .expect("insert c2");
    let err = tx
        .add_agent_batch_to_cluster(&uid("c2"), &[agent("a3"), agent("a1")])
        .expect_err("a1 is already assigned");
    assert_eq!(err.conflict_message(), Some(AGENT_ALREADY_ASSIGNED));

    let annotated = tx.rollback(Some(err));
    assert_eq!(
        annotated.conflict_message(),
        Some("agent already assigned to another cluster: [Successful rollback upon error]")
    );
    assert_eq!(row_counts_on(&mut connection).expect("row counts"), before);
}

#[rstest]
fn rollback_without_a_cause_is_reported(store: SqliteAgentStore, clock: FixedClock) {
    let mut connection = store.pool().get().expect("pooled connection");

    let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    tx.insert_cluster_metadata(&cluster("c1", "one", &[]))
        .expect("insert");
    let err = tx.rollback(None);

    assert!(matches!(
        err,
        StoreError::RollbackWithoutCause(RollbackStatus::Succeeded)
    ));
    assert_eq!(row_counts_on(&mut connection).expect("row counts").clusters, 0);
}

#[rstest]
fn dropping_an_open_transaction_rolls_back(store: SqliteAgentStore, clock: FixedClock) {
    let mut connection = store.pool().get().expect("pooled connection");
    {
        let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
        tx.insert_cluster_metadata(&cluster("c1", "one", &[]))
            .expect("insert");
    }

    assert_eq!(row_counts_on(&mut connection).expect("row counts").clusters, 0);
    let tx = ClusterTransaction::begin(&mut connection, &clock)
        .expect("connection should be free for a new transaction");
    tx.commit().expect("commit");
}

#[rstest]
fn finish_commits_success_and_rolls_back_failure(store: SqliteAgentStore, clock: FixedClock) {
    let mut connection = store.pool().get().expect("pooled connection");

    let mut tx = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    let inserted = tx.insert_cluster_metadata(&cluster("c1", "one", &[]));
    tx.finish(inserted).expect("commit");

    let mut failing = ClusterTransaction::begin(&mut connection, &clock).expect("begin");
    let duplicate = failing.insert_cluster_metadata(&cluster("c1", "again", &[]));
    let err = failing.finish(duplicate).expect_err("duplicate uid");
    assert!(err.is_conflict());

    assert_eq!(row_counts_on(&mut connection).expect("row counts").clusters, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_store_operation_leaves_the_database_unchanged(store: SqliteAgentStore) {
    store
        .create_cluster_entry(&cluster("c1", "one", &["a1", "a2"]))
        .await
        .expect("cluster creation should succeed");
    let before = row_counts(&store).expect("row counts");
    let clusters_before = store.get_clusters().await.expect("listing should succeed");

    let err = store
        .create_cluster_entry(&cluster("c2", "two", &["a3", "a1"]))
        .await
        .expect_err("a1 is already assigned");
    assert!(err.is_conflict());

    assert_eq!(row_counts(&store).expect("row counts"), before);
    assert_eq!(
        store.get_clusters().await.expect("listing should succeed"),
        clusters_before
    );
}
