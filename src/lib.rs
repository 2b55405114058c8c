//! Cluster membership, quorum and replication coordination for a replicated
//! log.
//!
//! This crate implements the membership core of a Raft cluster server: it
//! tracks which members belong to the cluster, transitions membership safely
//! through joint-consensus two-phase reconfiguration, computes majority
//! agreement for elections and log commitment, and tracks per-follower
//! replication and snapshot-installation progress under flow control.
//!
//! The wire protocol, timer scheduling, log storage and snapshot transfer are
//! external collaborators reached through the seams in [`transport`] and
//! [`storage`]; this crate owns the state machine between them.
//!
//! # Concurrency model
//!
//! All membership state of one server is owned by a single core task; every
//! mutation happens while that task handles one message, so no internal locks
//! are needed. The [`RaftServer`] handle is cheaply cloneable and forwards
//! calls from any thread to the core.
//!
//! ```ignore
//! let server = RaftServer::spawn(Config::default(), 1u64, store, client)?;
//! server.bootstrap([2, 3]).await?;
//! ```

mod cluster;
mod configuration;
mod core;
mod member;
mod progress;
mod quorum;
mod server;

pub mod config;
pub mod error;
pub mod storage;
pub mod transport;

pub use crate::cluster::ClusterContext;
pub use crate::cluster::LocalTypeChange;
pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::configuration::Configuration;
pub use crate::core::FailureListener;
pub use crate::core::ListenerId;
pub use crate::core::Role;
pub use crate::core::RoleListener;
pub use crate::error::ClusterError;
pub use crate::member::Member;
pub use crate::member::MemberId;
#[doc(hidden)]
pub use crate::member::MemberIdEssential;
pub use crate::member::MemberType;
pub use crate::progress::LogCursor;
pub use crate::progress::MemberContext;
pub use crate::quorum::joint_quorum_value;
pub use crate::quorum::quorum_value;
pub use crate::quorum::VoteDecision;
pub use crate::quorum::VoteQuorum;
pub use crate::server::RaftServer;
pub use crate::storage::ConfigurationStore;
pub use crate::storage::MemConfigurationStore;
pub use crate::transport::ReconfigurationClient;
