use super::target::ResolvedTarget;
use crate::core::{NodeAddress, RouteKind, RoutingStrategy};
use crate::metadata::Cluster;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered candidates for one route plus the way to pick among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDestinations {
    pub candidates: Vec<NodeAddress>,
    pub strategy: RoutingStrategy,
}

impl RouteDestinations {
    pub fn empty(strategy: RoutingStrategy) -> Self {
        Self {
            candidates: Vec::new(),
            strategy,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Picks the node for the next connection attempt.
    ///
    /// Round-robin advances the shared cursor whether or not the picked node
    /// turns out to be reachable.
    pub fn select(&self, cursor: &RoundRobinCursor) -> Option<&NodeAddress> {
        match self.strategy {
            RoutingStrategy::FirstAvailable => self.candidates.first(),
            RoutingStrategy::RoundRobin => cursor
                .next_index(self.candidates.len())
                .and_then(|idx| self.candidates.get(idx)),
        }
    }
}

/// RW and RO candidate lists derived from one resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDestinationSet {
    pub rw: RouteDestinations,
    pub ro: RouteDestinations,
}

impl RoutingDestinationSet {
    pub fn empty(ro_strategy: RoutingStrategy) -> Self {
        Self {
            rw: RouteDestinations::empty(RoutingStrategy::FirstAvailable),
            ro: RouteDestinations::empty(ro_strategy),
        }
    }

    /// Builds destinations for `cluster` as permitted by `resolved`.
    ///
    /// RW only ever targets the primary node of a PRIMARY cluster. RO gets the
    /// secondaries of a valid PRIMARY cluster, or every node of a REPLICA or
    /// invalidated cluster.
    pub fn build(
        cluster: &Cluster,
        resolved: &ResolvedTarget,
        ro_strategy: RoutingStrategy,
    ) -> Self {
        let mut set = Self::empty(ro_strategy);

        if resolved.allow_rw {
            if let Some(primary) = cluster.primary_node() {
                set.rw.candidates.push(primary.address.clone());
            }
        }

        if resolved.allow_ro {
            set.ro.candidates = if cluster.is_primary() && !resolved.invalid {
                cluster
                    .secondary_nodes()
                    .map(|node| node.address.clone())
                    .collect()
            } else {
                cluster.nodes.iter().map(|node| node.address.clone()).collect()
            };
        }

        set
    }

    pub fn route(&self, route: RouteKind) -> &RouteDestinations {
        match route {
            RouteKind::ReadWrite => &self.rw,
            RouteKind::ReadOnly => &self.ro,
        }
    }
}

/// Round-robin position shared across destination-set replacements.
///
/// The stored index is always reduced modulo the length of the list it was
/// last used with, so a shrinking or growing list continues from the
/// equivalent position instead of restarting.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    next: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index to use for a list of `len` candidates, or `None` when empty.
    pub fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let previous = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(((current % len) + 1) % len)
            })
            .unwrap_or_else(|current| current);
        Some(previous % len)
    }

    pub fn position(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}
