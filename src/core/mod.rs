//! The server core: role state machine and the single execution context that
//! owns all membership state.

pub(crate) mod message;
mod role;
mod server_core;

pub use message::FailureListener;
pub use message::ListenerId;
pub use message::RoleListener;
pub use role::Role;
pub(crate) use server_core::ServerCore;
