//! Error types exposed by this crate.

use anyerror::AnyError;

/// An operation requires a leader and none is known.
///
/// Retryable: the caller should back off and retry once a leader is elected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no leader to handle request: {operation}")]
pub struct NoLeader {
    pub operation: &'static str,
}

/// A malformed or unexpected protocol message was received.
///
/// Connection-level: logged and dropped, never fatal to the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("protocol error: {message}")]
pub struct ProtocolError {
    pub message: String,
}

/// A command could not be committed within constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("commit failed: {reason}")]
pub struct CommitFailed {
    pub reason: String,
}

/// A specific log append to one member failed.
///
/// Drives the failure counter of the relevant member context; never crashes
/// the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("append failed at index {index}")]
pub struct AppendFailure {
    pub index: u64,
}

/// An operation was invoked in a state it is not allowed in, e.g. a second
/// `bootstrap` on an already bootstrapped server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal state: {message}")]
pub struct IllegalState {
    pub message: String,
}

impl IllegalState {
    pub fn new(message: impl ToString) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Failure to load or store the durable configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration storage error: {source}")]
pub struct StorageError {
    #[source]
    pub source: AnyError,
}

impl StorageError {
    pub fn new(source: &(impl std::error::Error + 'static)) -> Self {
        Self {
            source: AnyError::new(source),
        }
    }

    pub fn with_message(message: impl ToString) -> Self {
        Self {
            source: AnyError::error(message),
        }
    }
}

/// Failure reported by the reconfiguration transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The contacted peer knows no leader.
    #[error("peer has no leader")]
    NoLeader,

    /// The peer could not be reached.
    #[error("peer unreachable: {source}")]
    Unreachable {
        #[source]
        source: AnyError,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Error returned by the lifecycle API of the cluster server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    #[error(transparent)]
    NoLeader(#[from] NoLeader),

    #[error(transparent)]
    IllegalState(#[from] IllegalState),

    #[error(transparent)]
    CommitFailed(#[from] CommitFailed),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// The server has shut down; in-flight operations are failed with this
    /// error rather than left pending.
    #[error("cluster server stopped")]
    Shutdown,
}

impl ClusterError {
    /// Whether the caller may retry after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::NoLeader(_) | ClusterError::Transport(TransportError::NoLeader)
        )
    }
}
