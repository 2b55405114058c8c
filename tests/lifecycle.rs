use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use raft_cluster::error::ClusterError;
use raft_cluster::error::NoLeader;
use raft_cluster::Config;
use raft_cluster::Configuration;
use raft_cluster::Member;
use raft_cluster::MemConfigurationStore;
use raft_cluster::MemberType;
use raft_cluster::RaftServer;
use raft_cluster::Role;

mod fixtures;

use fixtures::FakeLeader;
use fixtures::HangingClient;
use fixtures::RoleRecorder;

/// Bootstrapping a fresh server:
///
/// - forms a single-phase configuration of all peers plus the local member,
///   all active;
/// - persists it immediately (index 0 is covered by the initial commit
///   index);
/// - transitions the local role to follower;
/// - a second bootstrap fails with an illegal-state error instead of
///   silently succeeding or corrupting the first configuration.
#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_then_second_bootstrap_fails() -> Result<()> {
    fixtures::init_logging();

    let store = MemConfigurationStore::<u64>::new();
    let server = RaftServer::spawn(
        Config::default(),
        1,
        Box::new(store.clone()),
        FakeLeader::new([], 1),
    )?;
    let roles = RoleRecorder::listen(&server).await;

    server.bootstrap([2, 3]).await?;

    assert_eq!((Role::Follower, 0), roles.next());

    let persisted = store.persisted().expect("bootstrap configuration persisted");
    assert_eq!(0, persisted.index());
    assert_eq!(3, persisted.new_members().len());

    let err = server.bootstrap([2, 3]).await.unwrap_err();
    assert!(
        matches!(err, ClusterError::IllegalState(_)),
        "second bootstrap must fail, got {:?}",
        err
    );

    // The first configuration is untouched.
    assert_eq!(0, store.persisted().unwrap().index());

    server.shutdown().await?;
    Ok(())
}

/// Bootstrapping a server that already has a persisted configuration must be
/// rejected: a restarted server rejoins the cluster instead.
#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_rejected_with_persisted_configuration() -> Result<()> {
    fixtures::init_logging();

    let store = MemConfigurationStore::<u64>::new();
    store.seed(Configuration::bootstrap(1, 0, [1u64, 2, 3]));

    let server = RaftServer::spawn(Config::default(), 1, Box::new(store), FakeLeader::new([], 1))?;

    let err = server.bootstrap([2, 3]).await.unwrap_err();
    assert!(matches!(err, ClusterError::IllegalState(_)));

    server.shutdown().await?;
    Ok(())
}

/// Joining an existing cluster completes once a configuration including the
/// local member has been applied, and transitions the role to the configured
/// type.
#[tokio::test(flavor = "multi_thread")]
async fn join_applies_configuration_and_transitions() -> Result<()> {
    fixtures::init_logging();

    let leader = FakeLeader::new([2, 3], 1);
    let server = RaftServer::spawn(
        Config::default(),
        1,
        Box::new(MemConfigurationStore::new()),
        leader,
    )?;
    let roles = RoleRecorder::listen(&server).await;

    server.join([2]).await?;

    assert_eq!((Role::Follower, 0), roles.next());

    // A repeated join is a no-op that still reports success.
    server.join([2]).await?;

    server.shutdown().await?;
    Ok(())
}

/// Leaving the cluster completes only once a configuration excluding the
/// local member is committed, and forces the role to inactive.
#[tokio::test(flavor = "multi_thread")]
async fn leave_completes_on_committed_exclusion() -> Result<()> {
    fixtures::init_logging();

    let leader = FakeLeader::new([1, 2, 3], 1);
    let store = MemConfigurationStore::<u64>::new();
    store.seed(Configuration::bootstrap(1, 0, [1u64, 2, 3]));

    let server = RaftServer::spawn(Config::default(), 1, Box::new(store), leader)?;
    let roles = RoleRecorder::listen(&server).await;

    server.leader_changed(Some(2), 1);

    let leaving = {
        let server = server.clone();
        tokio::spawn(async move { server.leave().await })
    };

    // The exclusion configuration (index 1) arrives via the fake leader, but
    // leave must not complete before it is committed.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!leaving.is_finished(), "leave completed before commit");

    server.advance_commit_index(1);
    leaving.await??;

    assert_eq!((Role::Inactive, 1), roles.next());

    server.shutdown().await?;
    Ok(())
}

/// Lifecycle operations that require a leader fail with `NoLeader` when none
/// is known.
#[tokio::test(flavor = "multi_thread")]
async fn leave_without_leader_fails() -> Result<()> {
    fixtures::init_logging();

    let store = MemConfigurationStore::<u64>::new();
    store.seed(Configuration::bootstrap(1, 0, [1u64, 2, 3]));

    let server = RaftServer::spawn(Config::default(), 1, Box::new(store), FakeLeader::new([], 1))?;

    let err = server.leave().await.unwrap_err();
    assert_eq!(ClusterError::NoLeader(NoLeader { operation: "leave" }), err);
    assert!(err.is_retryable());

    server.shutdown().await?;
    Ok(())
}

/// Updating the election priority applies locally and immediately, without a
/// configuration round-trip.
#[tokio::test(flavor = "multi_thread")]
async fn reconfigure_priority_is_local() -> Result<()> {
    fixtures::init_logging();

    let store = MemConfigurationStore::<u64>::new();
    let server = RaftServer::spawn(Config::default(), 1, Box::new(store.clone()), FakeLeader::new([], 1))?;

    server.reconfigure_priority(7).await?;

    // No configuration was created or persisted.
    assert_eq!(None, store.persisted());

    server.shutdown().await?;
    Ok(())
}

/// A leader steps down to follower on request, without a member-type change.
#[tokio::test(flavor = "multi_thread")]
async fn step_down_demotes_leader_to_follower() -> Result<()> {
    fixtures::init_logging();

    let server = RaftServer::spawn(
        Config::default(),
        1,
        Box::new(MemConfigurationStore::new()),
        FakeLeader::new([], 1),
    )?;
    let roles = RoleRecorder::listen(&server).await;

    server.bootstrap([2, 3]).await?;
    assert_eq!((Role::Follower, 0), roles.next());

    server.leader_changed(Some(1), 1);
    assert_eq!((Role::Leader, 1), roles.next());

    server.step_down().await?;
    assert_eq!((Role::Follower, 1), roles.next());

    server.shutdown().await?;
    Ok(())
}

/// A shutdown concurrent with an in-flight reconfiguration fails the
/// in-flight operation instead of leaving its future pending.
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_fails_inflight_operations() -> Result<()> {
    fixtures::init_logging();

    let store = MemConfigurationStore::<u64>::new();
    store.seed(Configuration::bootstrap(1, 0, [1u64, 2, 3]));

    let server = RaftServer::spawn(Config::default(), 1, Box::new(store), Arc::new(HangingClient))?;
    server.leader_changed(Some(2), 1);

    let leaving = {
        let server = server.clone();
        tokio::spawn(async move { server.leave().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.shutdown().await?;

    let err = leaving.await?.unwrap_err();
    assert_eq!(ClusterError::Shutdown, err);
    Ok(())
}

/// Forced reconfiguration bypasses the leader and persists immediately,
/// retaining only the requested members.
#[tokio::test(flavor = "multi_thread")]
async fn force_configure_persists_locally() -> Result<()> {
    fixtures::init_logging();

    let store = MemConfigurationStore::<u64>::new();
    store.seed(Configuration::bootstrap(1, 0, [1u64, 2, 3, 4, 5]));

    // No leader known: force-configure must still work.
    let server = RaftServer::spawn(Config::default(), 1, Box::new(store.clone()), FakeLeader::new([], 1))?;

    server.force_configure([1, 2]).await?;

    let persisted = store.persisted().unwrap();
    assert_eq!(1, persisted.index());
    assert_eq!(2, persisted.new_members().len());
    assert!(persisted.contains(&1));
    assert!(persisted.contains(&2));
    assert!(!persisted.contains(&5));

    server.shutdown().await?;
    Ok(())
}

/// Seeding a member record helper compiles against the public API.
#[test]
fn member_public_api() {
    let m = Member::new(7u64, MemberType::Passive, 1);
    assert_eq!(7, m.id());
    assert_eq!(MemberType::Passive, m.member_type());
}
