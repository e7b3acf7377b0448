use crate::core::{Result, RouteKind, RouterError};
use crate::metadata::{Cluster, InvalidatedClusterRoutingPolicy, MetadataSnapshot, RouterOptions};
use std::fmt;

/// Which cluster of the ClusterSet the router serves traffic for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetCluster {
    /// Nothing configured; behaves like `Primary`.
    #[default]
    Unset,
    /// Follow whichever cluster is currently PRIMARY.
    Primary,
    /// Stick to one cluster, identified by its group-replication UUID.
    ByUuid(String),
}

impl TargetCluster {
    /// `""` is unset, `"primary"` follows the primary, anything else is a literal UUID.
    pub fn parse(value: &str) -> Self {
        match value {
            "" => Self::Unset,
            "primary" => Self::Primary,
            other => Self::ByUuid(other.to_string()),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// The target in force for a snapshot.
    ///
    /// A `targetCluster` entry in the metadata wins over the configured value
    /// as soon as it is seen; the configured value is only a bootstrap default.
    pub fn effective(configured: &TargetCluster, options: &RouterOptions) -> TargetCluster {
        match options.target_cluster.as_deref() {
            Some(from_metadata) => Self::parse(from_metadata),
            None => configured.clone(),
        }
    }
}

impl fmt::Display for TargetCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetCluster::Unset => Ok(()),
            TargetCluster::Primary => write!(f, "primary"),
            TargetCluster::ByUuid(uuid) => write!(f, "{}", uuid),
        }
    }
}

/// The concrete cluster a target resolved to, and which routes it may serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub cluster_uuid: String,
    pub invalid: bool,
    pub allow_rw: bool,
    pub allow_ro: bool,
}

impl ResolvedTarget {
    fn for_cluster(cluster: &Cluster, policy: InvalidatedClusterRoutingPolicy) -> Self {
        let (allow_rw, allow_ro) = if cluster.invalid {
            match policy {
                InvalidatedClusterRoutingPolicy::DropAll => (false, false),
                InvalidatedClusterRoutingPolicy::AcceptRo => (false, true),
            }
        } else {
            (cluster.is_primary(), true)
        };

        Self {
            cluster_uuid: cluster.uuid.clone(),
            invalid: cluster.invalid,
            allow_rw,
            allow_ro,
        }
    }

    pub fn allows(&self, route: RouteKind) -> bool {
        match route {
            RouteKind::ReadWrite => self.allow_rw,
            RouteKind::ReadOnly => self.allow_ro,
        }
    }
}

/// Maps `target` onto a cluster of `snapshot`.
///
/// UUIDs are compared verbatim: no trimming, no case folding.
pub fn resolve(target: &TargetCluster, snapshot: &MetadataSnapshot) -> Result<ResolvedTarget> {
    let policy = snapshot
        .parsed_router_options()
        .invalidated_cluster_routing_policy;

    let cluster = match target {
        TargetCluster::Unset | TargetCluster::Primary => snapshot.primary_cluster(),
        TargetCluster::ByUuid(uuid) => snapshot.cluster_by_uuid(uuid),
    };

    cluster
        .map(|cluster| ResolvedTarget::for_cluster(cluster, policy))
        .ok_or_else(|| {
            RouterError::TargetClusterNotFound(match target {
                TargetCluster::Unset => "primary".to_string(),
                other => other.to_string(),
            })
        })
}
