//! Public server interface.
//!
//! [`RaftServer`] is the front door to one cluster server. It is cheaply
//! cloneable; all calls are forwarded to the single core task that owns the
//! membership state, so callers on any thread observe a consistent view.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::cluster::ClusterContext;
use crate::config::Config;
use crate::configuration::Configuration;
use crate::core::message::Message;
use crate::core::message::ResultSender;
use crate::core::ListenerId;
use crate::core::Role;
use crate::core::ServerCore;
use crate::error::AppendFailure;
use crate::error::ClusterError;
use crate::member::MemberId;
use crate::storage::ConfigurationStore;
use crate::transport::ReconfigurationClient;

/// Handle to one cluster server.
///
/// Lifecycle operations are asynchronous: they return once the core task has
/// observed the relevant configuration as committed (or failed the
/// operation). Completion happens on an arbitrary thread; no ordering between
/// futures of different operations is guaranteed beyond what the returned
/// values encode. Operations are never cancelled mid-flight: shutting down
/// the server fails in-flight operations with [`ClusterError::Shutdown`]
/// instead of leaving them pending.
pub struct RaftServer<ID>
where ID: MemberId
{
    local_id: ID,
    tx: mpsc::UnboundedSender<Message<ID>>,
}

impl<ID> Clone for RaftServer<ID>
where ID: MemberId
{
    fn clone(&self) -> Self {
        Self {
            local_id: self.local_id,
            tx: self.tx.clone(),
        }
    }
}

impl<ID> RaftServer<ID>
where ID: MemberId
{
    /// Validate `config`, restore membership state from `store` and spawn the
    /// server core task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: Config,
        local_id: ID,
        store: Box<dyn ConfigurationStore<ID>>,
        client: Arc<dyn ReconfigurationClient<ID>>,
    ) -> Result<Self, ClusterError> {
        let config = config.validate()?;

        let cluster = ClusterContext::new(local_id, config.max_in_flight_appends as usize, store)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let core = ServerCore::new(config, cluster, client, rx, tx.clone());
        tokio::spawn(core.run());

        Ok(Self { local_id, tx })
    }

    pub fn local_id(&self) -> ID {
        self.local_id
    }

    /// Form a new cluster from this server and `peers`.
    ///
    /// Fails with an illegal-state error if a persisted configuration already
    /// exists (`join` instead) or if called twice.
    pub async fn bootstrap(&self, peers: impl IntoIterator<Item = ID>) -> Result<(), ClusterError> {
        let peers: BTreeSet<ID> = peers.into_iter().collect();
        self.call(|tx| Message::Bootstrap { peers, tx }).await
    }

    /// Join an existing cluster through one of `peers`.
    ///
    /// Completes once a configuration including this server has been received
    /// and applied; always performs a role transition to the configured type,
    /// covering repeated join attempts.
    pub async fn join(&self, peers: impl IntoIterator<Item = ID>) -> Result<(), ClusterError> {
        let peers: Vec<ID> = peers.into_iter().collect();
        self.call(|tx| Message::Join { peers, tx }).await
    }

    /// Leave the cluster. Completes once a configuration excluding this
    /// server is committed.
    pub async fn leave(&self) -> Result<(), ClusterError> {
        self.call(|tx| Message::Leave { tx }).await
    }

    /// Ask the leader to raise this server's member type one step, e.g.
    /// passive to promotable.
    pub async fn promote(&self) -> Result<(), ClusterError> {
        self.call(|tx| Message::Promote { tx }).await
    }

    /// Rebuild the membership from `retain` only, bypassing the leader and
    /// the two-phase change protocol.
    ///
    /// Last-resort recovery for a cluster that can no longer elect a leader:
    /// entries replicated only to discarded members are lost.
    pub async fn force_configure(&self, retain: impl IntoIterator<Item = ID>) -> Result<(), ClusterError> {
        let retain: BTreeSet<ID> = retain.into_iter().collect();
        self.call(|tx| Message::ForceConfigure { retain, tx }).await
    }

    /// Update the local election-priority hint. Applies immediately, without
    /// a configuration round-trip; other members are unaffected.
    pub async fn reconfigure_priority(&self, priority: u32) -> Result<(), ClusterError> {
        self.call(|tx| Message::ReconfigurePriority { priority, tx }).await
    }

    /// Force a leader or candidate back to follower without a type change.
    pub async fn step_down(&self) -> Result<(), ClusterError> {
        self.call(|tx| Message::StepDown { tx }).await
    }

    /// Stop the server core. In-flight lifecycle operations are failed with
    /// [`ClusterError::Shutdown`] before resources are released.
    pub async fn shutdown(&self) -> Result<(), ClusterError> {
        self.call(|tx| Message::Shutdown { tx }).await
    }

    /// Register a listener notified on every role transition with the new
    /// role and current term.
    pub async fn add_role_change_listener(
        &self,
        listener: impl Fn(Role, u64) + Send + 'static,
    ) -> Result<ListenerId, ClusterError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Message::AddRoleListener {
                listener: Box::new(listener),
                tx,
            })
            .map_err(|_| ClusterError::Shutdown)?;
        rx.await.map_err(|_| ClusterError::Shutdown)
    }

    pub fn remove_role_change_listener(&self, id: ListenerId) {
        let _ = self.tx.send(Message::RemoveRoleListener { id });
    }

    /// Register a listener notified on unrecoverable server failure.
    pub async fn add_failure_listener(
        &self,
        listener: impl Fn(&ClusterError) + Send + 'static,
    ) -> Result<ListenerId, ClusterError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Message::AddFailureListener {
                listener: Box::new(listener),
                tx,
            })
            .map_err(|_| ClusterError::Shutdown)?;
        rx.await.map_err(|_| ClusterError::Shutdown)
    }

    pub fn remove_failure_listener(&self, id: ListenerId) {
        let _ = self.tx.send(Message::RemoveFailureListener { id });
    }

    /// Deliver a configuration received from the replication protocol.
    pub fn receive_configuration(&self, configuration: Configuration<ID>) {
        let _ = self.tx.send(Message::ConfigurationReceived { configuration });
    }

    /// Report commit-index advancement from the replication protocol.
    pub fn advance_commit_index(&self, index: u64) {
        let _ = self.tx.send(Message::CommitAdvanced { index });
    }

    /// Report a leadership change observed by the election layer.
    pub fn leader_changed(&self, leader: Option<ID>, term: u64) {
        let _ = self.tx.send(Message::LeaderChanged { leader, term });
    }

    /// Report completion of an append RPC to `member`: the acknowledged match
    /// index on success, or the failed index on error.
    pub fn append_response(&self, member: ID, result: Result<u64, AppendFailure>) {
        let _ = self.tx.send(Message::AppendResponse { member, result });
    }

    /// Start campaigning for leadership, typically on election timeout.
    ///
    /// Ignored unless the local member is a voter. The caller sends the vote
    /// RPCs and reports responses via [`RaftServer::vote_response`]; the
    /// server transitions to leader or back to follower once the ballot
    /// decides.
    pub fn start_election(&self) {
        let _ = self.tx.send(Message::StartElection);
    }

    /// Report one member's response to a vote request.
    pub fn vote_response(&self, member: ID, granted: bool) {
        let _ = self.tx.send(Message::VoteResponse { member, granted });
    }

    /// Run `req` on the server's execution context with exclusive access to
    /// the cluster state.
    ///
    /// This is how the (out-of-scope) replication sender reads its targets
    /// and drives per-member flow control without racing the core: member
    /// contexts and their log cursors are not thread-safe and must only be
    /// touched from that context.
    pub fn external_request(&self, req: impl FnOnce(&mut ClusterContext<ID>) + Send + 'static) {
        let _ = self.tx.send(Message::ExternalRequest { req: Box::new(req) });
    }

    async fn call<F>(&self, build: F) -> Result<(), ClusterError>
    where F: FnOnce(ResultSender<()>) -> Message<ID> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(build(tx)).map_err(|_| ClusterError::Shutdown)?;
        rx.await.map_err(|_| ClusterError::Shutdown)?
    }
}
