use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cluster::now_ms;
use crate::cluster::ClusterContext;
use crate::cluster::LocalTypeChange;
use crate::config::Config;
use crate::configuration::Configuration;
use crate::core::message::Message;
use crate::core::message::OpKind;
use crate::core::message::ResultSender;
use crate::core::FailureListener;
use crate::core::ListenerId;
use crate::core::Role;
use crate::core::RoleListener;
use crate::error::ClusterError;
use crate::error::IllegalState;
use crate::error::NoLeader;
use crate::error::TransportError;
use crate::member::Member;
use crate::member::MemberId;
use crate::member::MemberType;
use crate::quorum::VoteDecision;
use crate::quorum::VoteQuorum;
use crate::transport::ReconfigurationClient;

/// A lifecycle operation waiting for a configuration to commit.
struct PendingOp {
    kind: OpKind,
    /// For promotions: the type the local member must reach.
    target_type: Option<MemberType>,
    tx: ResultSender<()>,
}

/// The single-task owner of all membership state of one server.
///
/// Runs until shutdown, handling one [`Message`] at a time. Lifecycle
/// operations park a [`PendingOp`] and are completed (or failed) when the
/// relevant configuration is observed as committed; a shutdown concurrent
/// with an in-flight operation fails that operation before releasing
/// resources, so no caller future is left dangling.
pub(crate) struct ServerCore<ID>
where ID: MemberId
{
    config: Config,
    cluster: ClusterContext<ID>,
    role: Role,
    term: u64,
    leader: Option<ID>,
    election_priority: u32,
    bootstrapped: bool,

    /// Ballot of the election in progress; present only while candidate.
    vote: Option<VoteQuorum<ID>>,

    pending: Vec<PendingOp>,

    role_listeners: BTreeMap<ListenerId, RoleListener>,
    failure_listeners: BTreeMap<ListenerId, FailureListener>,
    next_listener_id: u64,

    client: Arc<dyn ReconfigurationClient<ID>>,

    rx: mpsc::UnboundedReceiver<Message<ID>>,
    tx_self: mpsc::UnboundedSender<Message<ID>>,
}

impl<ID> ServerCore<ID>
where ID: MemberId
{
    pub(crate) fn new(
        config: Config,
        cluster: ClusterContext<ID>,
        client: Arc<dyn ReconfigurationClient<ID>>,
        rx: mpsc::UnboundedReceiver<Message<ID>>,
        tx_self: mpsc::UnboundedSender<Message<ID>>,
    ) -> Self {
        let election_priority = config.election_priority;
        // A restart on an existing configuration resumes in the persisted
        // member type's role.
        let role = Role::for_member_type(cluster.local_member().member_type());

        Self {
            config,
            cluster,
            role,
            term: 0,
            leader: None,
            election_priority,
            bootstrapped: false,
            vote: None,
            pending: Vec::new(),
            role_listeners: BTreeMap::new(),
            failure_listeners: BTreeMap::new(),
            next_listener_id: 0,
            client,
            rx,
            tx_self,
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %self.cluster.local_member().id()))]
    pub(crate) async fn run(mut self) {
        tracing::info!(cluster = %self.cluster, "server core started");

        while let Some(msg) = self.rx.recv().await {
            if let Message::Shutdown { tx } = msg {
                self.fail_pending(ClusterError::Shutdown);
                let _ = tx.send(Ok(()));
                break;
            }
            self.handle(msg);
        }

        // All handles dropped without an explicit shutdown.
        self.fail_pending(ClusterError::Shutdown);
        tracing::info!("server core stopped");
    }

    fn handle(&mut self, msg: Message<ID>) {
        match msg {
            Message::Bootstrap { peers, tx } => self.handle_bootstrap(peers, tx),
            Message::Join { peers, tx } => self.handle_join(peers, tx),
            Message::Leave { tx } => self.handle_leave(tx),
            Message::Promote { tx } => self.handle_promote(tx),
            Message::ForceConfigure { retain, tx } => self.handle_force_configure(retain, tx),
            Message::ReconfigurePriority { priority, tx } => {
                tracing::debug!(priority, "election priority updated");
                self.election_priority = priority;
                let _ = tx.send(Ok(()));
            }
            Message::StepDown { tx } => {
                if matches!(self.role, Role::Leader | Role::Candidate) {
                    self.transition(Role::Follower);
                }
                let _ = tx.send(Ok(()));
            }
            Message::Shutdown { .. } => unreachable!("shutdown is handled in the run loop"),

            Message::AddRoleListener { listener, tx } => {
                let id = self.next_listener_id();
                self.role_listeners.insert(id, listener);
                let _ = tx.send(id);
            }
            Message::RemoveRoleListener { id } => {
                self.role_listeners.remove(&id);
            }
            Message::AddFailureListener { listener, tx } => {
                let id = self.next_listener_id();
                self.failure_listeners.insert(id, listener);
                let _ = tx.send(id);
            }
            Message::RemoveFailureListener { id } => {
                self.failure_listeners.remove(&id);
            }

            Message::ConfigurationReceived { configuration } => {
                self.apply_configuration(configuration);
                self.check_pending();
            }
            Message::CommitAdvanced { index } => {
                match self.cluster.update_commit_index(index) {
                    Ok(_) => {}
                    Err(e) => self.report_failure(e.into()),
                }
                self.check_pending();
            }
            Message::LeaderChanged { leader, term } => self.handle_leader_changed(leader, term),
            Message::AppendResponse { member, result } => {
                let Some(ctx) = self.cluster.member_context_mut(&member) else {
                    tracing::warn!(member = %member, "append response from unknown member");
                    return;
                };
                if ctx.in_flight_append_count() == 0 {
                    // The context was reset, e.g. by a member-type change,
                    // while this append was on the wire.
                    tracing::debug!(member = %member, "ignoring stale append response");
                    return;
                }
                match result {
                    Ok(match_index) => {
                        ctx.complete_append(true);
                        ctx.set_match_index(match_index);
                    }
                    Err(failure) => {
                        ctx.complete_append(false);
                        let n = ctx.increment_failure_count();
                        tracing::debug!(member = %member, failures = n, index = failure.index, "append failed");
                    }
                }
            }
            Message::StartElection => self.handle_start_election(),
            Message::VoteResponse { member, granted } => self.handle_vote_response(member, granted),
            Message::ExternalRequest { req } => req(&mut self.cluster),

            Message::TransportResult { op, result } => self.handle_transport_result(op, result),
        }
    }

    fn handle_bootstrap(&mut self, peers: BTreeSet<ID>, tx: ResultSender<()>) {
        if self.bootstrapped {
            let _ = tx.send(Err(IllegalState::new("bootstrap called twice").into()));
            return;
        }
        if self.cluster.configuration().is_some() {
            let _ = tx.send(Err(IllegalState::new(
                "a persisted configuration exists; join the cluster instead of bootstrapping",
            )
            .into()));
            return;
        }

        let mut ids: BTreeSet<ID> = peers;
        ids.insert(self.cluster.local_member().id());

        let config = Configuration::bootstrap(self.term, now_ms(), ids);
        tracing::info!(config = %config, "bootstrapping cluster");

        self.apply_configuration(config);
        self.bootstrapped = true;
        let _ = tx.send(Ok(()));
    }

    fn handle_join(&mut self, peers: Vec<ID>, tx: ResultSender<()>) {
        if peers.is_empty() {
            let _ = tx.send(Err(IllegalState::new("join requires at least one peer").into()));
            return;
        }

        let local_id = self.cluster.local_member().id();

        // Already a member: only the role transition is outstanding. Repeated
        // join attempts after a partial failure land here.
        if self.cluster.configuration().map(|c| c.contains(&local_id)).unwrap_or(false) {
            self.transition(Role::for_member_type(self.cluster.local_member().member_type()));
            let _ = tx.send(Ok(()));
            return;
        }

        self.pending.push(PendingOp {
            kind: OpKind::Join,
            target_type: None,
            tx,

        });

        let client = self.client.clone();
        let tx_self = self.tx_self.clone();
        let join_type = self.config.join_member_type;

        tokio::spawn(async move {
            let mut last = TransportError::NoLeader;
            for peer in peers {
                match client.join(peer, local_id, join_type).await {
                    Ok(configuration) => {
                        let _ = tx_self.send(Message::TransportResult {
                            op: OpKind::Join,
                            result: Ok(configuration),
                        });
                        return;
                    }
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "join attempt failed");
                        last = e;
                    }
                }
            }
            let _ = tx_self.send(Message::TransportResult {
                op: OpKind::Join,
                result: Err(last),
            });
        });
    }

    fn handle_leave(&mut self, tx: ResultSender<()>) {
        let Some(leader) = self.leader else {
            let _ = tx.send(Err(NoLeader { operation: "leave" }.into()));
            return;
        };

        let local_id = self.cluster.local_member().id();

        self.pending.push(PendingOp {
            kind: OpKind::Leave,
            target_type: None,
            tx,

        });

        let client = self.client.clone();
        let tx_self = self.tx_self.clone();
        tokio::spawn(async move {
            let result = client.leave(leader, local_id).await;
            let _ = tx_self.send(Message::TransportResult {
                op: OpKind::Leave,
                result,
            });
        });
    }

    fn handle_promote(&mut self, tx: ResultSender<()>) {
        let local_type = self.cluster.local_member().member_type();
        if local_type == MemberType::Active {
            let _ = tx.send(Ok(()));
            return;
        }

        let Some(leader) = self.leader else {
            let _ = tx.send(Err(NoLeader { operation: "promote" }.into()));
            return;
        };

        let local_id = self.cluster.local_member().id();
        let target = local_type.next_promotion();
        let members: BTreeSet<ID> = self
            .cluster
            .configuration()
            .map(|c| c.all_members().keys().copied().collect())
            .unwrap_or_default();

        self.pending.push(PendingOp {
            kind: OpKind::Promote,
            target_type: Some(target),
            tx,

        });

        let client = self.client.clone();
        let tx_self = self.tx_self.clone();
        tokio::spawn(async move {
            let result = client.reconfigure(leader, local_id, target, members).await;
            let _ = tx_self.send(Message::TransportResult {
                op: OpKind::Promote,
                result,
            });
        });
    }

    /// Forced reconfiguration: rebuild the membership from the retained
    /// members only, bypassing the leader and the two-phase protocol.
    ///
    /// Only for disaster recovery when quorum is permanently lost; committed
    /// entries that were only on discarded members are lost.
    fn handle_force_configure(&mut self, retain: BTreeSet<ID>, tx: ResultSender<()>) {
        let Some(current) = self.cluster.configuration() else {
            let _ = tx.send(Err(IllegalState::new("cannot force-configure without a configuration").into()));
            return;
        };

        tracing::warn!(
            retain = ?retain,
            "force-configure bypasses joint consensus; entries replicated only to discarded members are lost"
        );

        let now = now_ms();
        let members: BTreeMap<ID, Member<ID>> = current
            .all_members()
            .into_iter()
            .filter(|(id, _)| retain.contains(id))
            .map(|(id, m)| (id, m.clone()))
            .collect();

        let config = Configuration::single(current.index() + 1, self.term, now, members);

        self.apply_configuration(config);
        if let Err(e) = self.cluster.persist_current() {
            self.report_failure(e.clone().into());
            let _ = tx.send(Err(e.into()));
            return;
        }
        let _ = tx.send(Ok(()));
    }

    /// Start campaigning for leadership: bump the term, open a ballot with
    /// the local vote pre-granted and transition to candidate.
    ///
    /// The external election layer triggers this on timeout and sends the
    /// vote RPCs; responses arrive via [`Self::handle_vote_response`]. A
    /// sole-voter ballot decides immediately.
    fn handle_start_election(&mut self) {
        if !self.cluster.local_member().member_type().is_voter() {
            tracing::debug!("election trigger ignored, local member is not a voter");
            return;
        }
        if self.role == Role::Leader {
            return;
        }
        let Some(mut quorum) = self.cluster.vote_quorum() else {
            tracing::debug!("election trigger ignored, no configuration");
            return;
        };

        self.term += 1;
        self.leader = None;
        tracing::info!(term = self.term, priority = self.election_priority, "starting election");

        if let Some(VoteDecision::Won) = quorum.initial_decision() {
            self.transition(Role::Candidate);
            self.win_election();
            return;
        }

        self.transition(Role::Candidate);
        self.vote = Some(quorum);
    }

    fn handle_vote_response(&mut self, member: ID, granted: bool) {
        if self.role != Role::Candidate {
            return;
        }
        let Some(quorum) = &mut self.vote else {
            return;
        };

        match quorum.record(&member, granted) {
            Some(VoteDecision::Won) => self.win_election(),
            Some(VoteDecision::Lost) => {
                tracing::info!(term = self.term, "election lost");
                self.transition(Role::Follower);
            }
            None => {}
        }
    }

    fn win_election(&mut self) {
        tracing::info!(term = self.term, "election won");
        self.leader = Some(self.cluster.local_member().id());
        self.transition(Role::Leader);
    }

    fn handle_leader_changed(&mut self, leader: Option<ID>, term: u64) {
        if term > self.term {
            self.term = term;
        }
        self.leader = leader;

        let local_id = self.cluster.local_member().id();
        if leader == Some(local_id) {
            if self.cluster.local_member().member_type().is_voter() {
                self.transition(Role::Leader);
            }
        } else if matches!(self.role, Role::Leader | Role::Candidate) {
            // Another leader exists, or leadership was lost.
            self.transition(Role::Follower);
        }
    }

    fn handle_transport_result(&mut self, op: OpKind, result: Result<Configuration<ID>, TransportError>) {
        match result {
            Ok(configuration) => {
                self.apply_configuration(configuration);
                self.check_pending();
            }
            Err(e) => {
                // Fail the oldest waiting operation of this kind.
                if let Some(pos) = self.pending.iter().position(|p| p.kind == op) {
                    let p = self.pending.remove(pos);
                    let _ = p.tx.send(Err(e.into()));
                }
            }
        }
    }

    /// Run a received configuration through the cluster context and apply any
    /// resulting role transition.
    fn apply_configuration(&mut self, configuration: Configuration<ID>) {
        match self.cluster.configure(configuration) {
            Ok(Some(LocalTypeChange::Promoted(t))) => {
                self.transition(Role::for_member_type(t));
            }
            Ok(Some(LocalTypeChange::Demoted(_))) => {
                // A demotion, e.g. removal from the cluster, forces the
                // server out of any active role immediately.
                self.transition(Role::Inactive);
            }
            Ok(None) => {}
            Err(e) => self.report_failure(e.into()),
        }
    }

    /// Complete lifecycle operations whose configuration condition now holds.
    fn check_pending(&mut self) {
        let local_id = self.cluster.local_member().id();
        let local_type = self.cluster.local_member().member_type();
        let committed = self.cluster.configuration_committed();
        let in_cluster = self.cluster.configuration().map(|c| c.contains(&local_id)).unwrap_or(false);

        let mut transition_to: Option<Role> = None;

        let mut i = 0;
        while i < self.pending.len() {
            let done = match self.pending[i].kind {
                // A join completes once a configuration including the local
                // member has been received and applied.
                OpKind::Join => in_cluster,
                // A leave completes once a configuration excluding the local
                // member is committed.
                OpKind::Leave => committed && !in_cluster,
                // A promotion completes once the committed configuration
                // carries the requested type (or a higher one).
                OpKind::Promote => {
                    let target = self.pending[i].target_type.unwrap_or(MemberType::Active);
                    committed && local_type >= target
                }
            };

            if done {
                let p = self.pending.remove(i);
                if p.kind == OpKind::Join {
                    // A join always re-transitions to the configured type,
                    // even if no configuration delta was needed.
                    transition_to = Some(Role::for_member_type(local_type));
                }
                let _ = p.tx.send(Ok(()));
            } else {
                i += 1;
            }
        }

        if let Some(role) = transition_to {
            self.transition(role);
        }
    }

    fn transition(&mut self, new_role: Role) {
        if new_role != Role::Candidate {
            // Leaving candidacy in any direction abandons the ballot.
            self.vote = None;
        }
        if new_role == self.role {
            return;
        }

        tracing::info!(from = %self.role, to = %new_role, term = self.term, "role transition");
        self.role = new_role;

        for listener in self.role_listeners.values() {
            listener(new_role, self.term);
        }
    }

    fn report_failure(&mut self, e: ClusterError) {
        tracing::error!(error = %e, "unrecoverable server failure");
        for listener in self.failure_listeners.values() {
            listener(&e);
        }
    }

    fn fail_pending(&mut self, e: ClusterError) {
        for p in self.pending.drain(..) {
            let _ = p.tx.send(Err(e.clone()));
        }
    }

    fn next_listener_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        id
    }
}
