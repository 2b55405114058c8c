use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::Display;
use std::fmt::Formatter;

use validit::Validate;

use crate::configuration::Configuration;
use crate::error::StorageError;
use crate::member::Member;
use crate::member::MemberId;
use crate::member::MemberType;
use crate::progress::MemberContext;
use crate::quorum::joint_quorum_value;
use crate::quorum::quorum_value;
use crate::quorum::VoteQuorum;
use crate::storage::ConfigurationStore;

/// How the local member's effective type changed when a configuration was
/// applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTypeChange {
    /// The type rose in trust order; the server should transition towards the
    /// matching active role.
    Promoted(MemberType),

    /// The type fell, e.g. the local member was removed from the cluster; the
    /// server must leave any active role immediately.
    Demoted(MemberType),
}

/// Owner of all cluster membership state of one server.
///
/// Holds the current [`Configuration`], the local [`Member`], one
/// [`MemberContext`] per remote member, and the derived id sets
/// (`active_voters`, `replication_targets`). The derived sets are maintained
/// incrementally on every configuration update; a full rebuild happens only
/// when resetting from persisted state.
///
/// All mutation happens on the owning server's single execution context; no
/// internal locking.
pub struct ClusterContext<ID>
where ID: MemberId
{
    local: Member<ID>,

    remote_contexts: BTreeMap<ID, MemberContext<ID>>,

    configuration: Option<Configuration<ID>>,

    /// Remote members with type `Active`.
    active_voters: BTreeSet<ID>,

    /// Remote members with type other than `Inactive`.
    replication_targets: BTreeSet<ID>,

    commit_index: u64,

    /// Index of the configuration last handed to the store, to avoid
    /// re-persisting on every commit advance.
    stored_index: Option<u64>,

    max_in_flight_appends: usize,

    store: Box<dyn ConfigurationStore<ID>>,
}

impl<ID> ClusterContext<ID>
where ID: MemberId
{
    /// Create a context for `local_id` and rebuild state from the persisted
    /// configuration, if one exists.
    pub fn new(
        local_id: ID,
        max_in_flight_appends: usize,
        store: Box<dyn ConfigurationStore<ID>>,
    ) -> Result<Self, StorageError> {
        let mut this = Self {
            local: Member::new(local_id, MemberType::Inactive, 0),
            remote_contexts: BTreeMap::new(),
            configuration: None,
            active_voters: BTreeSet::new(),
            replication_targets: BTreeSet::new(),
            commit_index: 0,
            stored_index: None,
            max_in_flight_appends,
            store,
        };
        this.reset_from_storage()?;
        Ok(this)
    }

    pub fn local_member(&self) -> &Member<ID> {
        &self.local
    }

    pub fn configuration(&self) -> Option<&Configuration<ID>> {
        self.configuration.as_ref()
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    /// Whether the current configuration is known to be committed.
    pub fn configuration_committed(&self) -> bool {
        match &self.configuration {
            Some(c) => self.commit_index >= c.index(),
            None => false,
        }
    }

    pub fn member_context(&self, id: &ID) -> Option<&MemberContext<ID>> {
        self.remote_contexts.get(id)
    }

    pub fn member_context_mut(&mut self, id: &ID) -> Option<&mut MemberContext<ID>> {
        self.remote_contexts.get_mut(id)
    }

    /// Contexts of remote members that receive replicated entries.
    pub fn replication_targets(&self) -> impl Iterator<Item = &MemberContext<ID>> {
        self.replication_targets.iter().filter_map(|id| self.remote_contexts.get(id))
    }

    /// Contexts of remote members that vote and count towards quorums.
    pub fn active_voters(&self) -> impl Iterator<Item = &MemberContext<ID>> {
        self.active_voters.iter().filter_map(|id| self.remote_contexts.get(id))
    }

    /// Apply a new configuration.
    ///
    /// A configuration whose index is not greater than the current one is a
    /// no-op: repeated delivery of the same or an older configuration is
    /// common after leader re-election or restart replay. Otherwise the
    /// membership diff is applied, the configuration is persisted once the
    /// commit index covers it, and any change of the local member's effective
    /// type is reported so the server can transition its role.
    #[tracing::instrument(level = "debug", skip_all, fields(index = new_config.index()))]
    pub fn configure(&mut self, new_config: Configuration<ID>) -> Result<Option<LocalTypeChange>, StorageError> {
        if let Some(current) = &self.configuration {
            if new_config.index() <= current.index() {
                tracing::debug!(
                    current = current.index(),
                    received = new_config.index(),
                    "ignoring stale configuration"
                );
                return Ok(None);
            }
        }

        let prev_type = self.local.member_type();

        self.diff_members(&new_config);

        let new_type = self.local.member_type();
        let change = if new_type > prev_type {
            Some(LocalTypeChange::Promoted(new_type))
        } else if new_type < prev_type {
            Some(LocalTypeChange::Demoted(new_type))
        } else {
            None
        };

        tracing::info!(config = %new_config, ?change, "configuration accepted");

        self.configuration = Some(new_config);
        // The previous persisted configuration is superseded.
        self.stored_index = None;
        self.persist_if_committed()?;

        debug_assert!(self.validate().is_ok(), "{:?}", self.validate().err());

        Ok(change)
    }

    /// Advance the commit index, persisting the current configuration once it
    /// is covered.
    ///
    /// Returns true iff the current configuration is committed afterwards.
    pub fn update_commit_index(&mut self, index: u64) -> Result<bool, StorageError> {
        if index > self.commit_index {
            self.commit_index = index;
        }
        self.persist_if_committed()?;
        Ok(self.configuration_committed())
    }

    /// Persist the current configuration regardless of the commit index.
    ///
    /// Used by forced reconfiguration, which bypasses the two-phase protocol.
    pub fn persist_current(&mut self) -> Result<(), StorageError> {
        if let Some(config) = &self.configuration {
            self.store.store(config)?;
            self.stored_index = Some(config.index());
        }
        Ok(())
    }

    /// Discard all derived state and rebuild from the persisted
    /// configuration. The only full-rescan path.
    pub fn reset_from_storage(&mut self) -> Result<(), StorageError> {
        let loaded = self.store.load()?;

        self.remote_contexts.clear();
        self.active_voters.clear();
        self.replication_targets.clear();
        self.configuration = None;
        self.local.update_type(MemberType::Inactive, now_ms());

        if let Some(config) = loaded {
            self.stored_index = Some(config.index());
            self.diff_members(&config);
            self.configuration = Some(config);
        } else {
            self.stored_index = None;
        }

        Ok(())
    }

    fn persist_if_committed(&mut self) -> Result<(), StorageError> {
        let Some(config) = &self.configuration else {
            return Ok(());
        };

        if self.commit_index >= config.index() && self.stored_index != Some(config.index()) {
            self.store.store(config)?;
            self.stored_index = Some(config.index());
        }
        Ok(())
    }

    /// Reconcile member contexts and derived sets with `new_config`.
    ///
    /// Removed members have their contexts closed and discarded; added
    /// members get a fresh context with a lazily opened cursor; a member
    /// whose type changed has its replication state reset, since a type
    /// change invalidates prior replication assumptions.
    fn diff_members(&mut self, new_config: &Configuration<ID>) {
        let now = now_ms();
        let all = new_config.all_members();

        let removed: Vec<ID> =
            self.remote_contexts.keys().filter(|id| !all.contains_key(id)).copied().collect();
        for id in removed {
            if let Some(mut ctx) = self.remote_contexts.remove(&id) {
                tracing::debug!(member = %id, "member removed from cluster");
                ctx.close();
            }
            self.active_voters.remove(&id);
            self.replication_targets.remove(&id);
        }

        let local_id = self.local.id();
        match all.get(&local_id) {
            None => {
                // The local member has been removed from the cluster.
                if self.local.member_type() != MemberType::Inactive {
                    self.local.update_type(MemberType::Inactive, now);
                }
            }
            Some(m) => {
                if m.member_type() != self.local.member_type() {
                    self.local.update_type(m.member_type(), now);
                }
            }
        }

        for (id, member) in all {
            if id == local_id {
                continue;
            }

            let member_type = member.member_type();

            match self.remote_contexts.get_mut(&id) {
                None => {
                    let ctx = MemberContext::new((*member).clone(), self.max_in_flight_appends);
                    self.remote_contexts.insert(id, ctx);
                }
                Some(ctx) => {
                    if ctx.member().member_type() != member_type {
                        tracing::debug!(
                            member = %id,
                            from = %ctx.member().member_type(),
                            to = %member_type,
                            "member type changed, resetting replication state"
                        );
                        ctx.member_mut().update_type(member_type, member.updated_ms());
                        ctx.reset();
                    }
                }
            }

            if member_type.is_voter() {
                self.active_voters.insert(id);
            } else {
                self.active_voters.remove(&id);
            }
            if member_type.is_replication_target() {
                self.replication_targets.insert(id);
            } else {
                self.replication_targets.remove(&id);
            }
        }
    }

    /// The greatest value, e.g. a match index, that a quorum of active voters
    /// has reached.
    ///
    /// The local member's value is assumed to be the maximum: it has written
    /// to its own log before replicating. Under joint consensus the result is
    /// the minimum of the old-side and new-side quorum values. `None` means
    /// no quorum can be computed from remote values alone, e.g. in a
    /// single-member cluster, and the caller decides commitment itself.
    pub fn quorum_for<T, F>(&self, value_fn: F) -> Option<T>
    where
        T: Ord + Copy,
        F: Fn(&MemberContext<ID>) -> T,
    {
        let config = self.configuration.as_ref()?;

        let side = |members: &BTreeMap<ID, Member<ID>>| -> Option<T> {
            let values: Vec<T> = self
                .active_voters
                .iter()
                .filter(|id| members.contains_key(id))
                .filter_map(|id| self.remote_contexts.get(id))
                .map(&value_fn)
                .collect();

            let include_local =
                members.get(&self.local.id()).map(|m| m.member_type().is_voter()).unwrap_or(false);

            quorum_value(values, include_local)
        };

        if config.requires_joint_consensus() {
            joint_quorum_value(side(config.old_members()), side(config.new_members()))
        } else {
            side(config.new_members())
        }
    }

    /// Build a ballot tracker for an election under the current
    /// configuration.
    ///
    /// The local member's vote is pre-granted in every side it belongs to.
    pub fn vote_quorum(&self) -> Option<VoteQuorum<ID>> {
        let config = self.configuration.as_ref()?;

        let voters = |members: &BTreeMap<ID, Member<ID>>| -> BTreeSet<ID> {
            members.iter().filter(|(_, m)| m.member_type().is_voter()).map(|(id, _)| *id).collect()
        };

        let local = Some(self.local.id()).filter(|_| self.local.member_type().is_voter());

        if config.requires_joint_consensus() {
            Some(VoteQuorum::joint(voters(config.old_members()), voters(config.new_members()), local))
        } else {
            Some(VoteQuorum::new(voters(config.new_members()), local))
        }
    }
}

impl<ID> Validate for ClusterContext<ID>
where ID: MemberId
{
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        for (id, ctx) in self.remote_contexts.iter() {
            validit::equal!(*id, ctx.member().id());

            let t = ctx.member().member_type();
            validit::equal!(t.is_voter(), self.active_voters.contains(id));
            validit::equal!(t.is_replication_target(), self.replication_targets.contains(id));
        }

        for id in self.active_voters.iter().chain(self.replication_targets.iter()) {
            validit::equal!(true, self.remote_contexts.contains_key(id));
            validit::equal!(false, *id == self.local.id());
        }

        if let Some(stored) = self.stored_index {
            let index = self.configuration.as_ref().map(|c| c.index());
            validit::equal!(Some(stored), index);
        }

        Ok(())
    }
}

impl<ID> Display for ClusterContext<ID>
where ID: MemberId
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "local:{}, commit:{}, config:", self.local, self.commit_index)?;
        match &self.configuration {
            Some(c) => write!(f, "{}", c),
            None => write!(f, "none"),
        }
    }
}

/// Milliseconds since the unix epoch.
pub(crate) fn now_ms() -> u64 {
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;

    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
