// ============================================================================
// ClusterSet Router Library
// ============================================================================

pub mod core;
pub mod connection;
pub mod metadata;
pub mod routing;
pub mod router;
pub mod server;
pub mod storage;

// Re-export main types for convenience
pub use core::{NodeAddress, Result, RouteKind, RouterError, RoutingStrategy, ViewId};
pub use router::{
    ApplyOutcome, ClusterSetRouter, RefreshReport, RefreshWorker, RoutingState, TargetAvailability,
};

// Re-export connection API
pub use connection::{
    config::RouterConfig,
    registry::{ConnectionLease, ConnectionRegistry, RouterStats},
};

// Re-export metadata API
pub use metadata::{
    Cluster, ClusterRole, ClusterSet, HttpMetadataSource, InMemoryMetadataSource,
    InvalidatedClusterRoutingPolicy, MetadataSnapshot, MetadataSource, Node, NodeRole,
    RouterOptions,
};
pub use routing::TargetCluster;
pub use server::RouteListener;
pub use storage::{StateFile, StateRecord};
