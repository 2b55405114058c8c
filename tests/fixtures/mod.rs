//! Test fixtures: a fake cluster leader serving reconfiguration requests,
//! and a role-change recorder.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use raft_cluster::error::TransportError;
use raft_cluster::transport::ReconfigurationClient;
use raft_cluster::Configuration;
use raft_cluster::Member;
use raft_cluster::MemberType;
use raft_cluster::RaftServer;
use raft_cluster::Role;

/// A fake cluster leader: serves join/leave/reconfigure requests from its own
/// membership table, handing out configurations with increasing indexes.
pub struct FakeLeader {
    state: Mutex<FakeLeaderState>,
}

struct FakeLeaderState {
    members: BTreeMap<u64, Member<u64>>,
    next_index: u64,
    term: u64,
}

impl FakeLeader {
    pub fn new(member_ids: impl IntoIterator<Item = u64>, next_index: u64) -> Arc<Self> {
        let members = member_ids
            .into_iter()
            .map(|id| (id, Member::new(id, MemberType::Active, 0)))
            .collect();

        Arc::new(Self {
            state: Mutex::new(FakeLeaderState {
                members,
                next_index,
                term: 1,
            }),
        })
    }

    fn configuration(state: &mut FakeLeaderState) -> Configuration<u64> {
        let index = state.next_index;
        state.next_index += 1;
        Configuration::single(index, state.term, 0, state.members.clone())
    }
}

#[async_trait]
impl ReconfigurationClient<u64> for FakeLeader {
    async fn join(
        &self,
        _peer: u64,
        member: u64,
        member_type: MemberType,
    ) -> Result<Configuration<u64>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.members.insert(member, Member::new(member, member_type, 0));
        Ok(Self::configuration(&mut state))
    }

    async fn leave(&self, _peer: u64, member: u64) -> Result<Configuration<u64>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.members.remove(&member);
        Ok(Self::configuration(&mut state))
    }

    async fn reconfigure(
        &self,
        _peer: u64,
        member: u64,
        member_type: MemberType,
        _current_members: BTreeSet<u64>,
    ) -> Result<Configuration<u64>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.members.insert(member, Member::new(member, member_type, 0));
        Ok(Self::configuration(&mut state))
    }
}

/// A client whose calls never complete, for exercising shutdown with
/// in-flight operations.
pub struct HangingClient;

#[async_trait]
impl ReconfigurationClient<u64> for HangingClient {
    async fn join(
        &self,
        _peer: u64,
        _member: u64,
        _member_type: MemberType,
    ) -> Result<Configuration<u64>, TransportError> {
        futures::future::pending().await
    }

    async fn leave(&self, _peer: u64, _member: u64) -> Result<Configuration<u64>, TransportError> {
        futures::future::pending().await
    }

    async fn reconfigure(
        &self,
        _peer: u64,
        _member: u64,
        _member_type: MemberType,
        _current_members: BTreeSet<u64>,
    ) -> Result<Configuration<u64>, TransportError> {
        futures::future::pending().await
    }
}

/// Records role transitions delivered to a role-change listener.
pub struct RoleRecorder {
    rx: mpsc::Receiver<(Role, u64)>,
}

impl RoleRecorder {
    /// Register a recording listener on `server`.
    pub async fn listen(server: &RaftServer<u64>) -> Self {
        let (tx, rx) = mpsc::channel();
        server
            .add_role_change_listener(move |role, term| {
                let _ = tx.send((role, term));
            })
            .await
            .unwrap();
        Self { rx }
    }

    /// Wait for the next role transition.
    pub fn next(&self) -> (Role, u64) {
        self.rx.recv_timeout(Duration::from_secs(5)).expect("no role transition observed")
    }

    /// Assert that no further transition arrives within a short window.
    pub fn assert_quiet(&self) {
        if let Ok((role, _)) = self.rx.recv_timeout(Duration::from_millis(200)) {
            panic!("unexpected role transition to {}", role);
        }
    }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").with_test_writer().try_init();
}
