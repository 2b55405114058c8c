use std::collections::BTreeSet;

use tokio::sync::oneshot;

use crate::cluster::ClusterContext;
use crate::configuration::Configuration;
use crate::core::Role;
use crate::error::AppendFailure;
use crate::error::ClusterError;
use crate::error::TransportError;
use crate::member::MemberId;

/// A oneshot TX to send a lifecycle result from the server core to the
/// caller.
pub(crate) type ResultSender<T> = oneshot::Sender<Result<T, ClusterError>>;

/// Handle to a registered listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Notified on every role transition with the new role and the current term.
pub type RoleListener = Box<dyn Fn(Role, u64) + Send + 'static>;

/// Notified when the server hits an unrecoverable failure.
pub type FailureListener = Box<dyn Fn(&ClusterError) + Send + 'static>;

/// A closure executed on the server's execution context with exclusive access
/// to the cluster state.
pub(crate) type ExternalRequest<ID> = Box<dyn FnOnce(&mut ClusterContext<ID>) + Send + 'static>;

/// Which lifecycle operation a transport response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Join,
    Leave,
    Promote,
}

/// A message sent to the server core.
///
/// All cluster and member-context mutation happens while the core handles one
/// of these; the core task is the single execution context that guarantees
/// mutual exclusion. Handlers never run concurrently.
pub(crate) enum Message<ID>
where ID: MemberId
{
    // Lifecycle API.
    Bootstrap {
        peers: BTreeSet<ID>,
        tx: ResultSender<()>,
    },
    Join {
        peers: Vec<ID>,
        tx: ResultSender<()>,
    },
    Leave {
        tx: ResultSender<()>,
    },
    Promote {
        tx: ResultSender<()>,
    },
    ForceConfigure {
        retain: BTreeSet<ID>,
        tx: ResultSender<()>,
    },
    ReconfigurePriority {
        priority: u32,
        tx: ResultSender<()>,
    },
    StepDown {
        tx: ResultSender<()>,
    },
    Shutdown {
        tx: ResultSender<()>,
    },

    // Listener registration.
    AddRoleListener {
        listener: RoleListener,
        tx: oneshot::Sender<ListenerId>,
    },
    RemoveRoleListener {
        id: ListenerId,
    },
    AddFailureListener {
        listener: FailureListener,
        tx: oneshot::Sender<ListenerId>,
    },
    RemoveFailureListener {
        id: ListenerId,
    },

    // Events from the (out-of-scope) protocol and persistence collaborators,
    // delivered as callbacks on the core's execution context.
    ConfigurationReceived {
        configuration: Configuration<ID>,
    },
    CommitAdvanced {
        index: u64,
    },
    LeaderChanged {
        leader: Option<ID>,
        term: u64,
    },
    AppendResponse {
        member: ID,
        result: Result<u64, AppendFailure>,
    },
    StartElection,
    VoteResponse {
        member: ID,
        granted: bool,
    },
    ExternalRequest {
        req: ExternalRequest<ID>,
    },

    // Internal: completion of a spawned transport call.
    TransportResult {
        op: OpKind,
        result: Result<Configuration<ID>, TransportError>,
    },
}
