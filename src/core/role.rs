use std::fmt::Display;
use std::fmt::Formatter;

use crate::member::MemberType;

/// The local server's position in the Raft state machine.
///
/// `Inactive` is the only initial state. `Passive` and `Promotable` are
/// intermediate non-voting states entered while the local member's type is
/// below `Active` in the latest configuration. The derived order follows the
/// member-type trust order, with the three voting-capable states on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    /// Not participating in the cluster at all.
    Inactive,
    /// Receiving committed entries only; never votes or times out.
    Passive,
    /// Catching up on uncommitted entries; not yet voting.
    Promotable,
    /// Replicating entries from the leader and voting in elections.
    Follower,
    /// Campaigning to become leader.
    Candidate,
    /// Coordinating replication for the cluster.
    Leader,
}

impl Role {
    /// Voting-capable states.
    pub fn is_active(&self) -> bool {
        matches!(self, Role::Follower | Role::Candidate | Role::Leader)
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader)
    }

    /// The role a member of the given type enters on a configuration change.
    ///
    /// An `Active` member enters as follower; elections, which are driven
    /// externally, take it further.
    pub fn for_member_type(member_type: MemberType) -> Self {
        match member_type {
            MemberType::Inactive => Role::Inactive,
            MemberType::Passive => Role::Passive,
            MemberType::Promotable => Role::Promotable,
            MemberType::Active => Role::Follower,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Inactive => "inactive",
            Role::Passive => "passive",
            Role::Promotable => "promotable",
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        };
        write!(f, "{}", s)
    }
}
