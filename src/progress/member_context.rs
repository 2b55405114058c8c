use std::fmt::Display;
use std::fmt::Formatter;
use std::time::Instant;

use crate::member::Member;
use crate::member::MemberId;
use crate::member::MemberType;
use crate::progress::LogCursor;

/// Per-remote-member replication and installation progress.
///
/// One context exists for every non-local member of the current
/// configuration. It is owned exclusively by the cluster context and must
/// only be mutated from the owning server's execution context; no internal
/// locking is used.
///
/// `match_index` never decreases once set: a decrease indicates corrupted
/// state and fails fast. A member-type change resets the whole context via
/// [`MemberContext::reset`], which is the only path that reinitializes
/// `match_index`.
#[derive(Debug, Clone)]
pub struct MemberContext<ID>
where ID: MemberId
{
    member: Member<ID>,

    /// Highest log index known to be replicated to this member.
    match_index: u64,

    heartbeat_time: Option<Instant>,
    response_time: Option<Instant>,

    /// Appends sent but not yet responded to; bounded by
    /// `max_in_flight_appends`.
    in_flight_append_count: usize,
    max_in_flight_appends: usize,

    /// Whether the most recent append round-trip succeeded. Pipelining is
    /// only allowed after a success.
    append_succeeded: bool,

    /// A configuration entry is in flight to this member.
    configuring: bool,

    /// A snapshot installation is in flight to this member.
    installing: bool,

    failure_count: usize,
    failure_time: Option<Instant>,

    /// Index of the last snapshot this member confirmed installing.
    snapshot_index: u64,

    /// Snapshot currently being transferred, if any.
    next_snapshot_index: Option<u64>,
    next_snapshot_chunk_offset: u64,

    /// Opened lazily on first replication; variant follows the member type.
    log_cursor: Option<LogCursor>,
}

impl<ID> MemberContext<ID>
where ID: MemberId
{
    pub fn new(member: Member<ID>, max_in_flight_appends: usize) -> Self {
        Self {
            member,
            match_index: 0,
            heartbeat_time: None,
            response_time: None,
            in_flight_append_count: 0,
            max_in_flight_appends,
            append_succeeded: false,
            configuring: false,
            installing: false,
            failure_count: 0,
            failure_time: None,
            snapshot_index: 0,
            next_snapshot_index: None,
            next_snapshot_chunk_offset: 0,
            log_cursor: None,
        }
    }

    pub fn member(&self) -> &Member<ID> {
        &self.member
    }

    pub(crate) fn member_mut(&mut self) -> &mut Member<ID> {
        &mut self.member
    }

    pub fn match_index(&self) -> u64 {
        self.match_index
    }

    /// Record a replication acknowledgement.
    ///
    /// # Panics
    /// If `index` is less than the current match index. An acknowledgement
    /// can never move backwards; seeing one is a programming error.
    pub fn set_match_index(&mut self, index: u64) {
        assert!(
            index >= self.match_index,
            "match_index must not decrease: {} -> {} for member {}",
            self.match_index,
            index,
            self.member.id()
        );
        self.match_index = index;
    }

    /// Open the replication cursor for the member's current type.
    ///
    /// No-op if a cursor is already open or the member is not a replication
    /// target.
    pub fn open(&mut self, next_index: u64) {
        if self.log_cursor.is_none() {
            self.log_cursor = LogCursor::open(self.member.member_type(), next_index);
        }
    }

    /// Release the replication cursor. Called before the context is discarded.
    pub fn close(&mut self) {
        self.log_cursor = None;
    }

    pub fn log_cursor(&self) -> Option<&LogCursor> {
        self.log_cursor.as_ref()
    }

    pub fn log_cursor_mut(&mut self) -> Option<&mut LogCursor> {
        self.log_cursor.as_mut()
    }

    /// Reinitialize all replication state.
    ///
    /// Called when the member's type changes: a type change invalidates prior
    /// replication assumptions, e.g. which cursor variant is in use, so every
    /// counter and cursor starts over.
    pub fn reset(&mut self) {
        self.match_index = 0;
        self.heartbeat_time = None;
        self.response_time = None;
        self.in_flight_append_count = 0;
        self.append_succeeded = false;
        self.configuring = false;
        self.installing = false;
        self.failure_count = 0;
        self.failure_time = None;
        self.snapshot_index = 0;
        self.next_snapshot_index = None;
        self.next_snapshot_chunk_offset = 0;
        self.log_cursor = None;
    }

    /// Whether another append may be sent to this member.
    ///
    /// A single probe is allowed while the pipeline is cold; once an append
    /// has succeeded, up to `max_in_flight_appends` may be pipelined.
    pub fn can_append(&self) -> bool {
        if self.append_succeeded {
            self.in_flight_append_count < self.max_in_flight_appends
        } else {
            self.in_flight_append_count == 0
        }
    }

    /// Whether an empty heartbeat may be sent. Heartbeats are never queued
    /// behind a stalled append pipeline.
    pub fn can_heartbeat(&self) -> bool {
        self.in_flight_append_count == 0
    }

    /// Whether the next snapshot chunk may be sent.
    pub fn can_install(&self) -> bool {
        self.next_snapshot_index.is_some() && self.in_flight_append_count == 0
    }

    pub fn start_append(&mut self) {
        self.in_flight_append_count += 1;
    }

    /// Record completion of one append round-trip.
    ///
    /// A response may arrive after [`MemberContext::reset`] has discarded the
    /// in-flight accounting, e.g. when the member's type changed while the
    /// append was on the wire; such a stale completion is ignored.
    pub fn complete_append(&mut self, succeeded: bool) {
        if self.in_flight_append_count == 0 {
            return;
        }
        self.in_flight_append_count -= 1;
        self.append_succeeded = succeeded;

        if succeeded {
            self.failure_count = 0;
            self.failure_time = None;
            self.response_time = Some(Instant::now());
        }
    }

    pub fn in_flight_append_count(&self) -> usize {
        self.in_flight_append_count
    }

    pub fn append_succeeded(&self) -> bool {
        self.append_succeeded
    }

    pub fn start_configure(&mut self) {
        self.configuring = true;
    }

    pub fn complete_configure(&mut self) {
        self.configuring = false;
    }

    pub fn is_configuring(&self) -> bool {
        self.configuring
    }

    /// Begin transferring the snapshot at `index` to this member.
    pub fn start_install(&mut self, index: u64) {
        self.installing = true;
        self.next_snapshot_index = Some(index);
        self.next_snapshot_chunk_offset = 0;
    }

    /// Finish the in-flight snapshot transfer.
    pub fn complete_install(&mut self) {
        if let Some(index) = self.next_snapshot_index.take() {
            self.snapshot_index = index;
        }
        self.installing = false;
        self.next_snapshot_chunk_offset = 0;
    }

    pub fn is_installing(&self) -> bool {
        self.installing
    }

    pub fn snapshot_index(&self) -> u64 {
        self.snapshot_index
    }

    pub fn next_snapshot_index(&self) -> Option<u64> {
        self.next_snapshot_index
    }

    pub fn next_snapshot_chunk_offset(&self) -> u64 {
        self.next_snapshot_chunk_offset
    }

    pub fn advance_snapshot_chunk(&mut self, offset: u64) {
        self.next_snapshot_chunk_offset = offset;
    }

    /// Record an append failure reported by the transport layer.
    ///
    /// Returns the updated consecutive-failure count; retry policy lives in
    /// the transport layer.
    pub fn increment_failure_count(&mut self) -> usize {
        if self.failure_count == 0 {
            self.failure_time = Some(Instant::now());
        }
        self.failure_count += 1;
        self.failure_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn failure_time(&self) -> Option<Instant> {
        self.failure_time
    }

    pub fn record_heartbeat(&mut self) {
        self.heartbeat_time = Some(Instant::now());
    }

    pub fn heartbeat_time(&self) -> Option<Instant> {
        self.heartbeat_time
    }

    pub fn response_time(&self) -> Option<Instant> {
        self.response_time
    }

    /// Time since the last successful append response, if any.
    pub fn time_since_response(&self) -> Option<std::time::Duration> {
        self.response_time.map(|t| t.elapsed())
    }

    /// Whether this member's type makes it an active voter.
    pub fn is_active_voter(&self) -> bool {
        self.member.member_type() == MemberType::Active
    }
}

impl<ID> Display for MemberContext<ID>
where ID: MemberId
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(match:{}, inflight:{}, failures:{})",
            self.member, self.match_index, self.in_flight_append_count, self.failure_count
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::progress::LogCursor;

    fn ctx(t: MemberType) -> MemberContext<u64> {
        MemberContext::new(Member::new(2, t, 0), 2)
    }

    #[test]
    fn match_index_advances() {
        let mut c = ctx(MemberType::Active);
        c.set_match_index(3);
        c.set_match_index(3);
        c.set_match_index(7);
        assert_eq!(7, c.match_index());
    }

    #[test]
    #[should_panic(expected = "match_index must not decrease")]
    fn match_index_must_not_decrease() {
        let mut c = ctx(MemberType::Active);
        c.set_match_index(7);
        c.set_match_index(3);
    }

    #[test]
    fn reset_reinitializes_everything() {
        let mut c = ctx(MemberType::Active);
        c.open(5);
        c.set_match_index(9);
        c.start_append();
        c.complete_append(false);
        c.increment_failure_count();
        c.start_install(4);

        c.reset();

        assert_eq!(0, c.match_index());
        assert_eq!(0, c.failure_count());
        assert_eq!(0, c.in_flight_append_count());
        assert!(!c.append_succeeded());
        assert!(!c.is_installing());
        assert_eq!(None, c.next_snapshot_index());
        assert_eq!(None, c.log_cursor());

        // After a reset the match index may start over.
        c.set_match_index(1);
    }

    #[test]
    fn cursor_opened_lazily_by_type() {
        let mut passive = ctx(MemberType::Passive);
        assert_eq!(None, passive.log_cursor());
        passive.open(3);
        assert_eq!(Some(&LogCursor::Committed { next_index: 3 }), passive.log_cursor());

        // A second open is a no-op.
        passive.open(9);
        assert_eq!(Some(&LogCursor::Committed { next_index: 3 }), passive.log_cursor());

        let mut active = ctx(MemberType::Active);
        active.open(3);
        assert_eq!(Some(&LogCursor::Uncommitted { next_index: 3 }), active.log_cursor());
    }

    #[test]
    fn append_flow_control() {
        let mut c = ctx(MemberType::Active);

        // Cold pipeline: one probe at a time.
        assert!(c.can_append());
        c.start_append();
        assert!(!c.can_append());
        c.complete_append(true);

        // Warm pipeline: up to max_in_flight_appends.
        assert!(c.can_append());
        c.start_append();
        assert!(c.can_append());
        c.start_append();
        assert!(!c.can_append(), "pipeline is full");

        // A failure cools the pipeline down again.
        c.complete_append(false);
        c.complete_append(false);
        assert!(c.can_append());
        c.start_append();
        assert!(!c.can_append());
    }

    #[test]
    fn stale_completion_after_reset_is_ignored() {
        let mut c = ctx(MemberType::Active);
        c.start_append();
        c.reset();

        // The response to the discarded append arrives late.
        c.complete_append(true);

        assert_eq!(0, c.in_flight_append_count());
        assert!(!c.append_succeeded(), "a stale response must not warm the pipeline");
        assert!(c.can_append());
    }

    #[test]
    fn heartbeat_not_queued_behind_appends() {
        let mut c = ctx(MemberType::Active);
        assert!(c.can_heartbeat());
        c.start_append();
        assert!(!c.can_heartbeat());
        c.complete_append(true);
        assert!(c.can_heartbeat());
    }

    #[test]
    fn install_lifecycle() {
        let mut c = ctx(MemberType::Active);
        assert!(!c.can_install(), "no snapshot pending");

        c.start_install(10);
        assert!(c.is_installing());
        assert!(c.can_install());
        assert_eq!(Some(10), c.next_snapshot_index());

        c.advance_snapshot_chunk(4096);
        assert_eq!(4096, c.next_snapshot_chunk_offset());

        c.complete_install();
        assert!(!c.is_installing());
        assert_eq!(10, c.snapshot_index());
        assert_eq!(None, c.next_snapshot_index());
        assert_eq!(0, c.next_snapshot_chunk_offset());
    }

    #[test]
    fn failure_bookkeeping() {
        let mut c = ctx(MemberType::Active);
        assert_eq!(1, c.increment_failure_count());
        assert_eq!(2, c.increment_failure_count());
        assert!(c.failure_time().is_some());

        // A successful append clears the failure streak.
        c.start_append();
        c.complete_append(true);
        assert_eq!(0, c.failure_count());
        assert_eq!(None, c.failure_time());
    }
}
