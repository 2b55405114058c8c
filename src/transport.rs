//! Reconfiguration transport seam.
//!
//! Wire-level RPC transport is out of scope; the server core only needs to
//! send membership-change requests to a peer and receive the resulting
//! configuration. Completion callbacks for append/vote/install RPCs are
//! delivered to the core through the [`RaftServer`] handle instead.
//!
//! [`RaftServer`]: crate::RaftServer

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::configuration::Configuration;
use crate::error::TransportError;
use crate::member::MemberId;
use crate::member::MemberType;

/// Client side of the membership-change protocol.
///
/// Implemented by the (out-of-scope) RPC layer. Every call targets a single
/// peer and returns the configuration the cluster leader produced for the
/// request.
#[async_trait]
pub trait ReconfigurationClient<ID>: Send + Sync + 'static
where ID: MemberId
{
    /// Ask `peer` to add the local member to the cluster.
    async fn join(&self, peer: ID, member: ID, member_type: MemberType)
        -> Result<Configuration<ID>, TransportError>;

    /// Ask `peer` to remove the local member from the cluster.
    async fn leave(&self, peer: ID, member: ID) -> Result<Configuration<ID>, TransportError>;

    /// Ask `peer` to change the local member's type, e.g. a promotion.
    async fn reconfigure(
        &self,
        peer: ID,
        member: ID,
        member_type: MemberType,
        current_members: BTreeSet<ID>,
    ) -> Result<Configuration<ID>, TransportError>;
}
