//! Cluster membership bookkeeping.

mod cluster_context;

pub use cluster_context::ClusterContext;
pub use cluster_context::LocalTypeChange;
pub(crate) use cluster_context::now_ms;
