use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;

use crate::member::Member;
use crate::member::MemberId;
use crate::member::MemberType;

/// An immutable, monotonically indexed snapshot of cluster membership.
///
/// A configuration is created by bootstrap (single phase) or by a
/// reconfiguration request. A reconfiguration that changes the voter set goes
/// through joint consensus: first a configuration carrying both the old and
/// the new member set, then a new-only configuration once the joint phase is
/// committed. A configuration is never mutated once constructed; it is
/// superseded by a later one with a greater index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Configuration<ID>
where ID: MemberId
{
    index: u64,
    term: u64,
    timestamp_ms: u64,

    /// The member set being phased out. Empty unless in joint consensus.
    old_members: BTreeMap<ID, Member<ID>>,

    /// The effective member set once this configuration is fully applied.
    new_members: BTreeMap<ID, Member<ID>>,
}

impl<ID> Configuration<ID>
where ID: MemberId
{
    /// Build the initial configuration of a freshly bootstrapped cluster.
    ///
    /// All members are voters, the index is 0 and there is no old member set.
    pub fn bootstrap(term: u64, timestamp_ms: u64, member_ids: impl IntoIterator<Item = ID>) -> Self {
        let new_members = member_ids
            .into_iter()
            .map(|id| (id, Member::new(id, MemberType::Active, timestamp_ms)))
            .collect();

        Self {
            index: 0,
            term,
            timestamp_ms,
            old_members: BTreeMap::new(),
            new_members,
        }
    }

    /// Build a single-phase configuration, e.g. the completion of a joint phase.
    pub fn single(index: u64, term: u64, timestamp_ms: u64, new_members: BTreeMap<ID, Member<ID>>) -> Self {
        Self {
            index,
            term,
            timestamp_ms,
            old_members: BTreeMap::new(),
            new_members,
        }
    }

    /// Build the joint phase of a two-phase membership change.
    pub fn joint(
        index: u64,
        term: u64,
        timestamp_ms: u64,
        old_members: BTreeMap<ID, Member<ID>>,
        new_members: BTreeMap<ID, Member<ID>>,
    ) -> Self {
        Self {
            index,
            term,
            timestamp_ms,
            old_members,
            new_members,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// True iff commitment and elections must reach a majority in both the old
    /// and the new member set.
    pub fn requires_joint_consensus(&self) -> bool {
        !self.old_members.is_empty() && self.old_members != self.new_members
    }

    pub fn old_members(&self) -> &BTreeMap<ID, Member<ID>> {
        &self.old_members
    }

    pub fn new_members(&self) -> &BTreeMap<ID, Member<ID>> {
        &self.new_members
    }

    /// The union of the old and new member sets.
    ///
    /// When a member appears in both sets, the record from the new set wins:
    /// it carries the type the member is transitioning to.
    pub fn all_members(&self) -> BTreeMap<ID, &Member<ID>> {
        let mut all: BTreeMap<ID, &Member<ID>> = self.old_members.iter().map(|(id, m)| (*id, m)).collect();
        for (id, m) in self.new_members.iter() {
            all.insert(*id, m);
        }
        all
    }

    /// Look up a member record by id, preferring the new set.
    pub fn member(&self, id: &ID) -> Option<&Member<ID>> {
        self.new_members.get(id).or_else(|| self.old_members.get(id))
    }

    pub fn contains(&self, id: &ID) -> bool {
        self.new_members.contains_key(id) || self.old_members.contains_key(id)
    }

    pub fn is_old_member(&self, id: &ID) -> bool {
        self.old_members.contains_key(id)
    }

    pub fn is_new_member(&self, id: &ID) -> bool {
        self.new_members.contains_key(id)
    }
}

impl<ID> Display for Configuration<ID>
where ID: MemberId
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{index:{}, term:{}, old:[", self.index, self.term)?;
        for (i, m) in self.old_members.values().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", m)?;
        }
        write!(f, "], new:[")?;
        for (i, m) in self.new_members.values().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", m)?;
        }
        write!(f, "]}}")
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    use super::*;

    fn member(id: u64, t: MemberType) -> Member<u64> {
        Member::new(id, t, 0)
    }

    #[test]
    fn bootstrap_is_single_phase_all_active() {
        let c = Configuration::bootstrap(1, 100, [1u64, 2, 3]);

        assert_eq!(0, c.index());
        assert_eq!(1, c.term());
        assert!(!c.requires_joint_consensus());
        assert_eq!(3, c.new_members().len());
        assert!(c.new_members().values().all(|m| m.member_type() == MemberType::Active));
    }

    #[test]
    fn joint_consensus_detection() {
        let old = btreemap! {1u64 => member(1, MemberType::Active)};
        let new = btreemap! {2u64 => member(2, MemberType::Active)};

        let c = Configuration::joint(5, 2, 0, old.clone(), new.clone());
        assert!(c.requires_joint_consensus());

        // Identical old and new sets are not a joint configuration.
        let c = Configuration::joint(5, 2, 0, old.clone(), old);
        assert!(!c.requires_joint_consensus());

        let c = Configuration::single(5, 2, 0, new);
        assert!(!c.requires_joint_consensus());
    }

    #[test]
    fn all_members_union_prefers_new() {
        let old = btreemap! {
            1u64 => member(1, MemberType::Active),
            2u64 => member(2, MemberType::Active),
        };
        let new = btreemap! {
            2u64 => member(2, MemberType::Passive),
            3u64 => member(3, MemberType::Active),
        };

        let c = Configuration::joint(5, 2, 0, old, new);
        let all = c.all_members();

        assert_eq!(3, all.len());
        assert_eq!(MemberType::Active, all[&1].member_type());
        assert_eq!(MemberType::Passive, all[&2].member_type(), "new record wins for member 2");
        assert_eq!(MemberType::Active, all[&3].member_type());

        assert!(c.is_old_member(&1));
        assert!(!c.is_new_member(&1));
        assert!(c.is_old_member(&2));
        assert!(c.is_new_member(&2));
        assert!(c.contains(&3));
        assert!(!c.contains(&4));
    }

    #[test]
    fn serde_round_trip() {
        let old = btreemap! {1u64 => member(1, MemberType::Active)};
        let new = btreemap! {
            1u64 => member(1, MemberType::Active),
            2u64 => member(2, MemberType::Promotable),
        };
        let c = Configuration::joint(7, 3, 1234, old, new);

        let json = serde_json::to_string(&c).unwrap();
        let decoded: Configuration<u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(c, decoded);
    }
}
