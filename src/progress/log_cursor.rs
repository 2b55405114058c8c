use std::fmt::Display;
use std::fmt::Formatter;

use crate::member::MemberType;

/// Replication read cursor for one remote member.
///
/// The variant is selected once from the member's type when the cursor is
/// opened, and stored as data: passive members must only ever see committed
/// entries, while promotable and active members read an uncommitted cursor
/// that can see speculative entries.
///
/// Not thread-safe: a cursor is owned by a [`MemberContext`] and must only be
/// touched from the owning server's execution context.
///
/// [`MemberContext`]: crate::progress::MemberContext
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCursor {
    /// Reads stop at the commit index.
    Committed { next_index: u64 },
    /// Reads may run ahead of the commit index.
    Uncommitted { next_index: u64 },
}

impl LogCursor {
    /// Open a cursor of the variant matching the member type.
    ///
    /// Inactive members are not replicated to and have no cursor.
    pub fn open(member_type: MemberType, next_index: u64) -> Option<Self> {
        match member_type {
            MemberType::Inactive => None,
            MemberType::Passive => Some(LogCursor::Committed { next_index }),
            MemberType::Promotable | MemberType::Active => Some(LogCursor::Uncommitted { next_index }),
        }
    }

    /// The next log index this cursor will read.
    pub fn next_index(&self) -> u64 {
        match self {
            LogCursor::Committed { next_index } => *next_index,
            LogCursor::Uncommitted { next_index } => *next_index,
        }
    }

    /// Whether entries beyond `commit_index` are visible to this cursor.
    pub fn sees_uncommitted(&self) -> bool {
        matches!(self, LogCursor::Uncommitted { .. })
    }

    /// Advance the cursor past entries that have been sent.
    pub fn advance_to(&mut self, next_index: u64) {
        match self {
            LogCursor::Committed { next_index: n } => *n = next_index,
            LogCursor::Uncommitted { next_index: n } => *n = next_index,
        }
    }
}

impl Display for LogCursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogCursor::Committed { next_index } => write!(f, "committed@{}", next_index),
            LogCursor::Uncommitted { next_index } => write!(f, "uncommitted@{}", next_index),
        }
    }
}
