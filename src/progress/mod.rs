//! Per-remote-member replication progress tracking.

mod log_cursor;
mod member_context;

pub use log_cursor::LogCursor;
pub use member_context::MemberContext;
