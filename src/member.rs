use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

/// The bounds a member id must satisfy, apart from serde.
#[doc(hidden)]
pub trait MemberIdEssential:
    Send + Sync + Ord + Hash + Copy + Default + Debug + Display + 'static
{
}

impl<T> MemberIdEssential for T where
    T: Send + Sync + Ord + Hash + Copy + Default + Debug + Display + 'static
{
}

/// Uniquely identifies one member of a cluster.
///
/// Chosen by the embedding application; any small orderable, hashable and
/// serializable value type works, e.g. `u64`. Blanket-implemented, never
/// implemented by hand.
pub trait MemberId: MemberIdEssential + Serialize + DeserializeOwned {}

impl<T> MemberId for T where T: MemberIdEssential + Serialize + DeserializeOwned {}

/// How much a member participates in the Raft protocol.
///
/// The variants are ordered by how "trusted" a member is:
/// `Inactive < Passive < Promotable < Active`.
/// The derived `Ord` is the trust order, and a member whose type increases in
/// this order is being promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
pub enum MemberType {
    /// The member takes no part in replication or elections.
    Inactive,
    /// The member receives only committed entries and never votes.
    Passive,
    /// The member receives uncommitted entries while catching up, but does not yet vote.
    Promotable,
    /// The member is a full voting participant.
    Active,
}

impl MemberType {
    /// A voter takes part in elections and commit quorums.
    pub fn is_voter(&self) -> bool {
        matches!(self, MemberType::Active)
    }

    /// Whether entries are replicated to a member of this type at all.
    pub fn is_replication_target(&self) -> bool {
        !matches!(self, MemberType::Inactive)
    }

    /// The next type in the promotion ladder, or `self` if already at the top.
    pub fn next_promotion(&self) -> Self {
        match self {
            MemberType::Inactive => MemberType::Passive,
            MemberType::Passive => MemberType::Promotable,
            MemberType::Promotable => MemberType::Active,
            MemberType::Active => MemberType::Active,
        }
    }
}

impl Display for MemberType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberType::Inactive => "inactive",
            MemberType::Passive => "passive",
            MemberType::Promotable => "promotable",
            MemberType::Active => "active",
        };
        write!(f, "{}", s)
    }
}

/// One cluster participant as recorded in a [`Configuration`].
///
/// Exactly one `Member` value represents one node inside one cluster context;
/// it is updated in place by its owning context and never duplicated across
/// contexts.
///
/// [`Configuration`]: crate::Configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Member<ID>
where ID: MemberId
{
    id: ID,
    member_type: MemberType,

    /// Milliseconds since the unix epoch of the last type change.
    updated_ms: u64,
}

impl<ID> Member<ID>
where ID: MemberId
{
    pub fn new(id: ID, member_type: MemberType, updated_ms: u64) -> Self {
        Self {
            id,
            member_type,
            updated_ms,
        }
    }

    pub fn id(&self) -> ID {
        self.id
    }

    pub fn member_type(&self) -> MemberType {
        self.member_type
    }

    pub fn updated_ms(&self) -> u64 {
        self.updated_ms
    }

    /// Change the member type in place, recording when the change happened.
    pub(crate) fn update_type(&mut self, member_type: MemberType, now_ms: u64) {
        self.member_type = member_type;
        self.updated_ms = now_ms;
    }
}

impl<ID> Display for Member<ID>
where ID: MemberId
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.member_type)
    }
}
