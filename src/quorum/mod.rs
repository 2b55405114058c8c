//! Majority ("quorum") computation for log commitment and elections.
//!
//! Two kinds of quorum are computed over the active voters of a cluster:
//!
//! - A **value quorum** ([`quorum_value`]) finds the greatest value, e.g. a
//!   match index, that a majority of voters have reached. It drives commit
//!   advancement.
//! - A **vote quorum** ([`VoteQuorum`]) counts election ballots until a
//!   majority grants or the majority becomes unreachable.
//!
//! During joint consensus both computations run independently over the old
//! and the new member set: a joint value quorum is the minimum of the two
//! sides, and a joint vote quorum requires both sides to reach majority.

mod value_quorum;
mod vote_quorum;

pub use value_quorum::joint_quorum_value;
pub use value_quorum::quorum_value;
pub use vote_quorum::VoteDecision;
pub use vote_quorum::VoteQuorum;
