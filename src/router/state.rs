use crate::core::{RouteKind, RoutingStrategy, ViewId};
use crate::metadata::MetadataSnapshot;
use crate::routing::RoutingDestinationSet;
use std::sync::Arc;

/// Whether the configured target maps onto a usable cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAvailability {
    /// No metadata accepted yet.
    Unknown,
    Resolved {
        cluster_uuid: String,
        allow_rw: bool,
        allow_ro: bool,
    },
    /// The target names no cluster of the accepted snapshot.
    NotFound(String),
    /// The metadata reports a foreign ClusterSet.
    IdentityMismatch,
}

impl TargetAvailability {
    pub fn cluster_uuid(&self) -> Option<&str> {
        match self {
            TargetAvailability::Resolved { cluster_uuid, .. } => Some(cluster_uuid),
            _ => None,
        }
    }

    pub fn allows(&self, route: RouteKind) -> bool {
        match (self, route) {
            (TargetAvailability::Resolved { allow_rw, .. }, RouteKind::ReadWrite) => *allow_rw,
            (TargetAvailability::Resolved { allow_ro, .. }, RouteKind::ReadOnly) => *allow_ro,
            _ => false,
        }
    }
}

/// Immutable routing state installed by one refresh.
///
/// Connection attempts load one `Arc<RoutingState>` and use it throughout, so
/// they always see a snapshot and the destinations derived from it together.
#[derive(Debug, Clone)]
pub struct RoutingState {
    pub version: u64,
    pub snapshot: Option<Arc<MetadataSnapshot>>,
    pub availability: TargetAvailability,
    pub destinations: RoutingDestinationSet,
}

impl RoutingState {
    pub(crate) fn initial(ro_strategy: RoutingStrategy) -> Self {
        Self {
            version: 0,
            snapshot: None,
            availability: TargetAvailability::Unknown,
            destinations: RoutingDestinationSet::empty(ro_strategy),
        }
    }

    pub fn view_id(&self) -> Option<ViewId> {
        self.snapshot.as_ref().map(|snapshot| snapshot.view_id())
    }
}

/// What `apply_snapshot` did with a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new routing state was installed and `dropped` connections were closed.
    Accepted { version: u64, dropped: usize },
    /// Not newer than the accepted view; nothing changed.
    Stale {
        current_view_id: ViewId,
        incoming_view_id: ViewId,
    },
    /// Foreign ClusterSet; every connection was closed.
    IdentityMismatch { dropped: usize },
}

impl ApplyOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ApplyOutcome::Accepted { .. })
    }

    pub fn dropped(&self) -> usize {
        match self {
            ApplyOutcome::Accepted { dropped, .. } | ApplyOutcome::IdentityMismatch { dropped } => {
                *dropped
            }
            ApplyOutcome::Stale { .. } => 0,
        }
    }
}
