//! ClusterSet metadata: the immutable snapshot model, the `router_options`
//! overrides embedded in it, the sources it is fetched from, and the
//! view-id reconciliation that decides which snapshot is authoritative.

pub mod http;
pub mod in_memory;
pub mod options;
pub mod reconciler;
pub mod snapshot;
pub mod source;

pub use http::HttpMetadataSource;
pub use in_memory::InMemoryMetadataSource;
pub use options::{InvalidatedClusterRoutingPolicy, RouterOptions};
pub use reconciler::{ReconcileDecision, ViewReconciler};
pub use snapshot::{Cluster, ClusterRole, ClusterSet, MetadataSnapshot, Node, NodeRole};
pub use source::MetadataSource;
