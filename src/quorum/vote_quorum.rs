use std::collections::BTreeSet;

use crate::member::MemberId;

/// Outcome of an election quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDecision {
    /// A majority of every member set granted the vote.
    Won,
    /// A majority became unreachable in at least one member set.
    Lost,
}

/// Ballot counting for one member set.
#[derive(Debug, Clone)]
struct Ballot<ID>
where ID: MemberId
{
    /// Voters that have not yet responded.
    pending: BTreeSet<ID>,
    granted: usize,
    majority: usize,
}

impl<ID> Ballot<ID>
where ID: MemberId
{
    fn new(voters: BTreeSet<ID>, local: Option<ID>) -> Self {
        let total = voters.len();
        let majority = total / 2 + 1;

        let mut ballot = Self {
            pending: voters,
            granted: 0,
            majority,
        };

        // The local member votes for itself before any remote responds.
        if let Some(id) = local {
            ballot.record(&id, true);
        }

        ballot
    }

    fn record(&mut self, id: &ID, granted: bool) {
        if !self.pending.remove(id) {
            return;
        }
        if granted {
            self.granted += 1;
        }
    }

    fn won(&self) -> bool {
        self.granted >= self.majority
    }

    /// Whether the majority can no longer be reached even if every pending
    /// voter grants.
    fn unreachable(&self) -> bool {
        self.granted + self.pending.len() < self.majority
    }
}

/// Tracks election ballots until a decision is reached.
///
/// Non-joint: a single majority over the new member set. Joint: a majority
/// over the old member set AND a majority over the new member set must each
/// independently be reached. The local member's vote is recorded as granted
/// at construction, before any remote response arrives.
///
/// The decision fires exactly once: after [`VoteQuorum::record`] has returned
/// `Some`, further responses are ignored.
#[derive(Debug, Clone)]
pub struct VoteQuorum<ID>
where ID: MemberId
{
    old: Option<Ballot<ID>>,
    new: Ballot<ID>,
    decided: bool,
}

impl<ID> VoteQuorum<ID>
where ID: MemberId
{
    /// Build a tracker for a non-joint election over one voter set.
    ///
    /// `local` is the local member's id if it belongs to the set; its vote is
    /// pre-granted.
    pub fn new(voters: BTreeSet<ID>, local: Option<ID>) -> Self {
        Self {
            old: None,
            new: Ballot::new(voters, local),
            decided: false,
        }
    }

    /// Build a tracker for a joint election: both the old and the new voter
    /// set must independently reach majority.
    pub fn joint(old_voters: BTreeSet<ID>, new_voters: BTreeSet<ID>, local: Option<ID>) -> Self {
        let local_old = local.filter(|id| old_voters.contains(id));
        let local_new = local.filter(|id| new_voters.contains(id));

        Self {
            old: Some(Ballot::new(old_voters, local_old)),
            new: Ballot::new(new_voters, local_new),
            decided: false,
        }
    }

    /// Record one member's vote response.
    ///
    /// Returns the decision the first time it becomes determined, `None`
    /// before that and after it has fired. Responses from members outside
    /// the voter sets are ignored.
    pub fn record(&mut self, id: &ID, granted: bool) -> Option<VoteDecision> {
        if self.decided {
            return None;
        }

        if let Some(old) = &mut self.old {
            old.record(id, granted);
        }
        self.new.record(id, granted);

        self.check()
    }

    fn check(&mut self) -> Option<VoteDecision> {
        let old_won = self.old.as_ref().map(|b| b.won()).unwrap_or(true);
        if old_won && self.new.won() {
            self.decided = true;
            return Some(VoteDecision::Won);
        }

        let old_lost = self.old.as_ref().map(|b| b.unreachable()).unwrap_or(false);
        if old_lost || self.new.unreachable() {
            self.decided = true;
            return Some(VoteDecision::Lost);
        }

        None
    }

    /// Check whether the pre-granted local vote already decides the election,
    /// e.g. in a single-voter cluster.
    pub fn initial_decision(&mut self) -> Option<VoteDecision> {
        if self.decided {
            return None;
        }
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn single_voter_wins_immediately() {
        let mut q = VoteQuorum::new(btreeset! {1u64}, Some(1));
        assert_eq!(Some(VoteDecision::Won), q.initial_decision());
        assert_eq!(None, q.initial_decision(), "decision fires once");
    }

    #[test]
    fn three_voters_majority() {
        let mut q = VoteQuorum::new(btreeset! {1u64, 2, 3}, Some(1));
        assert_eq!(None, q.initial_decision());

        // One remote grant plus the local vote is a majority of 3.
        assert_eq!(Some(VoteDecision::Won), q.record(&2, true));
        assert_eq!(None, q.record(&3, true), "late responses are ignored");
    }

    #[test]
    fn three_voters_lost() {
        let mut q = VoteQuorum::new(btreeset! {1u64, 2, 3}, Some(1));

        assert_eq!(None, q.record(&2, false));
        assert_eq!(Some(VoteDecision::Lost), q.record(&3, false));
    }

    #[test]
    fn local_not_a_voter() {
        // Local is not in the voter set: all grants must come from remotes.
        let mut q = VoteQuorum::new(btreeset! {2u64, 3, 4}, None);

        assert_eq!(None, q.record(&2, true));
        assert_eq!(Some(VoteDecision::Won), q.record(&3, true));
    }

    #[test]
    fn joint_requires_both_sides() {
        // old = {1,2,3}, new = {2,3,4,5}, local = 2.
        let mut q = VoteQuorum::joint(btreeset! {1u64, 2, 3}, btreeset! {2u64, 3, 4, 5}, Some(2));

        // 3 grants: a majority of old (2,3 of 3) but not yet of new (2,3 of 4
        // needs 3).
        assert_eq!(None, q.record(&3, true));
        assert_eq!(Some(VoteDecision::Won), q.record(&4, true));
    }

    #[test]
    fn joint_lost_on_one_side() {
        // old = {1,2,3}, new = {4,5,6}, local = 1 (old side only).
        let mut q = VoteQuorum::joint(btreeset! {1u64, 2, 3}, btreeset! {4u64, 5, 6}, Some(1));

        // New side rejections make its majority unreachable even though the
        // old side could still win.
        assert_eq!(None, q.record(&4, false));
        assert_eq!(Some(VoteDecision::Lost), q.record(&5, false));
    }

    #[test]
    fn unknown_voter_is_ignored() {
        let mut q = VoteQuorum::new(btreeset! {1u64, 2, 3}, Some(1));
        assert_eq!(None, q.record(&99, true));
        assert_eq!(None, q.record(&99, true));
    }

    #[test]
    fn duplicate_response_counted_once() {
        let mut q = VoteQuorum::new(btreeset! {1u64, 2, 3, 4, 5}, Some(1));

        assert_eq!(None, q.record(&2, true));
        assert_eq!(None, q.record(&2, true), "duplicate grant does not advance the count");
        assert_eq!(Some(VoteDecision::Won), q.record(&3, true));
    }
}
