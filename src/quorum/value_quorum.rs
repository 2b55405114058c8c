//! Value-quorum computation over a set of remote voter values.

/// Compute the greatest value reached by a majority of one member set.
///
/// `remote_values` are the values reported by the remote active voters of the
/// set; `include_local` is true iff the local member belongs to the set. The
/// local member's value is assumed to always be the maximum: it is
/// authoritative, e.g. it has written to its own log before replicating, so
/// it is never passed in, only counted.
///
/// With `n = remote_values.len() + include_local` members, the majority size
/// is `n / 2 + 1` and the result is the value at rank
/// `majority - 1 - include_local` of the remote values sorted descending.
///
/// Returns `None` when the rank is not backed by a remote value:
/// - the set is empty, or the local member is not in the set and there are no
///   remotes;
/// - the local member is the sole member of the set (a single-member cluster
///   commits without consulting remotes; the caller special-cases it).
pub fn quorum_value<T>(mut remote_values: Vec<T>, include_local: bool) -> Option<T>
where T: Ord + Copy {
    let remote_count = remote_values.len();
    let local = usize::from(include_local);

    let total = remote_count + local;
    if total == 0 {
        return None;
    }

    let majority = total / 2 + 1;

    // Rank of the quorum value among the descending remote values.
    // `majority - 1` would be the rank among all members; the local member
    // always sits at rank 0, shifting the remote rank down by one.
    let rank = majority.checked_sub(1 + local)?;

    remote_values.sort_unstable_by(|a, b| b.cmp(a));
    remote_values.get(rank).copied()
}

/// Compute a value quorum under joint consensus.
///
/// Both the old and the new member set must independently agree, so the joint
/// result is the minimum of the two sides: a value committed under the joint
/// configuration is visible to a majority of each side. A side that yields
/// `None` does not constrain the other.
pub fn joint_quorum_value<T>(old: Option<T>, new: Option<T>) -> Option<T>
where T: Ord {
    match (old, new) {
        (Some(o), Some(n)) => Some(o.min(n)),
        (Some(o), None) => Some(o),
        (None, Some(n)) => Some(n),
        (None, None) => None,
    }
}
