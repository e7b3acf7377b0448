//! The ClusterSet router: keeps the accepted metadata snapshot, resolves the
//! target cluster against it, and hands out connection leases on the RW and
//! RO routes.

pub mod health;
pub mod refresh;
pub mod state;

pub use health::NodeHealth;
pub use refresh::{RefreshReport, RefreshWorker};
pub use state::{ApplyOutcome, RoutingState, TargetAvailability};

use crate::connection::{
    Binding, BindingTarget, ConnectionLease, ConnectionRegistry, RouterConfig, RouterStats,
};
use crate::core::{NodeAddress, Result, RouteKind, RouterError};
use crate::metadata::{MetadataSnapshot, MetadataSource, ReconcileDecision, ViewReconciler};
use crate::routing::{RoundRobinCursor, RoutingDestinationSet, TargetCluster, resolve};
use crate::storage::StateFile;
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex};
use tracing::{Level, event, info_span};

/// Routes client connections to the cluster of a ClusterSet selected by
/// `target_cluster`, following topology changes published in the metadata.
pub struct ClusterSetRouter {
    config: RouterConfig,
    source: Arc<dyn MetadataSource>,
    state: ArcSwap<RoutingState>,
    /// Serializes snapshot installs.
    reconciler: Mutex<ViewReconciler>,
    registry: ConnectionRegistry,
    rw_cursor: RoundRobinCursor,
    ro_cursor: RoundRobinCursor,
    state_file: Option<StateFile>,
    /// Last non-empty list of metadata servers.
    metadata_servers: Mutex<Vec<NodeAddress>>,
    health: NodeHealth,
    last_target: Mutex<Option<TargetCluster>>,
}

impl ClusterSetRouter {
    /// Creates a router, seeding the metadata servers and the expected
    /// ClusterSet identity from the state file when there is one.
    pub fn new(config: RouterConfig, source: Arc<dyn MetadataSource>) -> Result<Self> {
        config.validate().map_err(RouterError::ConfigError)?;

        let state_file = config.state_file.as_ref().map(StateFile::new);
        let record = match &state_file {
            Some(file) => file.load()?,
            None => None,
        };

        let mut servers = match &record {
            Some(record) => record.servers()?,
            None => Vec::new(),
        };
        if servers.is_empty() {
            servers = config.bootstrap_servers.clone();
        }
        if servers.is_empty() {
            return Err(RouterError::NoMetadataServers);
        }

        let reconciler = match &record {
            Some(record) => ViewReconciler::with_expected(record.clusterset_id(), record.view_id()),
            None => ViewReconciler::new(),
        };

        event!(
            Level::INFO,
            router_id = config.router_id,
            target_cluster = %config.target_cluster,
            metadata_servers = servers.len(),
            "ClusterSet router created"
        );

        Ok(Self {
            state: ArcSwap::from_pointee(RoutingState::initial(config.ro_strategy)),
            source,
            reconciler: Mutex::new(reconciler),
            registry: ConnectionRegistry::new(),
            rw_cursor: RoundRobinCursor::new(),
            ro_cursor: RoundRobinCursor::new(),
            state_file,
            metadata_servers: Mutex::new(servers),
            health: NodeHealth::new(),
            last_target: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn health(&self) -> &NodeHealth {
        &self.health
    }

    pub(crate) fn source(&self) -> &Arc<dyn MetadataSource> {
        &self.source
    }

    /// The routing state connection attempts currently see.
    pub fn current_state(&self) -> Arc<RoutingState> {
        self.state.load_full()
    }

    /// Last known non-empty metadata-server list.
    pub fn metadata_servers(&self) -> Vec<NodeAddress> {
        self.metadata_servers
            .lock()
            .map(|servers| servers.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RouterStats {
        let state = self.state.load();
        RouterStats {
            active_connections: self.registry.active(),
            dropped_connections: self.registry.dropped_total(),
            state_version: state.version,
            view_id: state.view_id(),
        }
    }

    /// Offers a snapshot fetched from a metadata server.
    ///
    /// An accepted snapshot is installed together with its destinations while
    /// the connection registry is locked, and connections it invalidates are
    /// closed before any new connection can observe the new state.
    pub fn apply_snapshot(&self, snapshot: MetadataSnapshot) -> Result<ApplyOutcome> {
        let span = info_span!(
            "router.apply",
            router_id = self.config.router_id,
            view_id = snapshot.view_id(),
            clusterset = %snapshot.clusterset_uuid()
        );
        let _enter = span.enter();

        snapshot.validate()?;

        let mut reconciler = self.reconciler.lock()?;
        let current = self.state.load_full();

        match reconciler.reconcile(&snapshot) {
            ReconcileDecision::Accept => {}
            ReconcileDecision::Stale { current: current_view_id, incoming } => {
                if !router_options_changed(&current, &snapshot) {
                    return Ok(ApplyOutcome::Stale {
                        current_view_id,
                        incoming_view_id: incoming,
                    });
                }
                event!(
                    Level::INFO,
                    view_id = incoming,
                    "router_options changed in the metadata"
                );
            }
            ReconcileDecision::IdentityMismatch { expected, observed } => {
                if current.availability == TargetAvailability::IdentityMismatch {
                    return Ok(ApplyOutcome::IdentityMismatch { dropped: 0 });
                }
                let next = Arc::new(RoutingState {
                    version: current.version + 1,
                    snapshot: current.snapshot.clone(),
                    availability: TargetAvailability::IdentityMismatch,
                    destinations: RoutingDestinationSet::empty(self.config.ro_strategy),
                });
                let dropped = self.registry.close_all(|| self.state.store(next))?;
                let err = RouterError::ClusterSetMismatch { expected, observed };
                event!(
                    Level::WARN,
                    dropped,
                    "{}; refusing connections until it matches again",
                    err
                );
                return Ok(ApplyOutcome::IdentityMismatch { dropped });
            }
        }

        let snapshot = Arc::new(snapshot);
        let target = self.effective_target(&snapshot);
        let (availability, destinations) = self.resolve_destinations(&target, &snapshot);

        let version = current.version + 1;
        let next = Arc::new(RoutingState {
            version,
            snapshot: Some(Arc::clone(&snapshot)),
            availability,
            destinations,
        });
        let dropped = self.registry.sweep(
            || self.state.store(Arc::clone(&next)),
            |binding| keeps_binding(&next, binding),
        )?;

        event!(
            Level::INFO,
            version,
            cluster = next.availability.cluster_uuid().unwrap_or("-"),
            rw = next.destinations.rw.candidates.len(),
            ro = next.destinations.ro.candidates.len(),
            dropped,
            "Routing state installed"
        );

        self.remember_servers(&snapshot);
        drop(reconciler);

        Ok(ApplyOutcome::Accepted { version, dropped })
    }

    /// Picks a backend for a new connection on `route` and registers it.
    pub fn connect(&self, route: RouteKind) -> Result<ConnectionLease> {
        let lease = self.registry.bind(route, || {
            let state = self.state.load();
            let refused = |reason: String| RouterError::RouteUnavailable { route, reason };

            let cluster_uuid = match &state.availability {
                TargetAvailability::Resolved { cluster_uuid, .. } => cluster_uuid.clone(),
                TargetAvailability::Unknown => {
                    return Err(refused("no metadata has been accepted yet".to_string()));
                }
                TargetAvailability::NotFound(target) => {
                    return Err(refused(format!("target_cluster '{}' not found", target)));
                }
                TargetAvailability::IdentityMismatch => {
                    return Err(refused("ClusterSet id does not match".to_string()));
                }
            };

            if !state.availability.allows(route) {
                return Err(refused(format!(
                    "route not permitted on cluster '{}'",
                    cluster_uuid
                )));
            }

            let node = state
                .destinations
                .route(route)
                .select(self.cursor(route))
                .cloned()
                .ok_or_else(|| refused("no candidate nodes".to_string()))?;

            Ok(BindingTarget {
                node,
                cluster_uuid,
                state_version: state.version,
            })
        })?;

        event!(
            Level::DEBUG,
            connection = lease.id(),
            route = %route,
            node = %lease.node(),
            "Connection routed"
        );
        Ok(lease)
    }

    fn cursor(&self, route: RouteKind) -> &RoundRobinCursor {
        match route {
            RouteKind::ReadWrite => &self.rw_cursor,
            RouteKind::ReadOnly => &self.ro_cursor,
        }
    }

    fn effective_target(&self, snapshot: &MetadataSnapshot) -> TargetCluster {
        let target = TargetCluster::effective(
            &self.config.target_cluster,
            &snapshot.parsed_router_options(),
        );

        if let Ok(mut last) = self.last_target.lock() {
            if last.as_ref() != Some(&target) {
                if target.is_unset() {
                    event!(
                        Level::INFO,
                        "Target cluster for router_id={} not set, using 'primary' as a target cluster",
                        self.config.router_id
                    );
                } else {
                    event!(Level::INFO, target_cluster = %target, "Target cluster changed");
                }
                *last = Some(target.clone());
            }
        }

        target
    }

    fn resolve_destinations(
        &self,
        target: &TargetCluster,
        snapshot: &MetadataSnapshot,
    ) -> (TargetAvailability, RoutingDestinationSet) {
        let strategy = self.config.ro_strategy;

        match resolve(target, snapshot) {
            Ok(resolved) => {
                if resolved.invalid {
                    event!(
                        Level::WARN,
                        cluster = %resolved.cluster_uuid,
                        accept_ro = resolved.allow_ro,
                        "Target cluster is marked as invalid in the metadata"
                    );
                }
                let destinations = snapshot
                    .cluster_by_uuid(&resolved.cluster_uuid)
                    .map(|cluster| RoutingDestinationSet::build(cluster, &resolved, strategy))
                    .unwrap_or_else(|| RoutingDestinationSet::empty(strategy));
                (
                    TargetAvailability::Resolved {
                        cluster_uuid: resolved.cluster_uuid,
                        allow_rw: resolved.allow_rw,
                        allow_ro: resolved.allow_ro,
                    },
                    destinations,
                )
            }
            Err(err) => {
                event!(Level::ERROR, "{}", err);
                let value = match err {
                    RouterError::TargetClusterNotFound(value) => value,
                    other => other.to_string(),
                };
                (
                    TargetAvailability::NotFound(value),
                    RoutingDestinationSet::empty(strategy),
                )
            }
        }
    }

    /// Persists the accepted topology and remembers it as the polling fallback.
    fn remember_servers(&self, snapshot: &MetadataSnapshot) {
        let servers = snapshot.all_node_addresses();

        if let Some(file) = &self.state_file {
            if let Err(err) = file.write(snapshot.clusterset_uuid(), snapshot.view_id(), &servers) {
                event!(
                    Level::ERROR,
                    error = %err,
                    path = %file.path().display(),
                    "State file write failed"
                );
            }
        }

        if !servers.is_empty() {
            if let Ok(mut known) = self.metadata_servers.lock() {
                *known = servers;
            }
        }
    }
}

/// Same view and identity as the installed snapshot but different `router_options`.
fn router_options_changed(current: &RoutingState, incoming: &MetadataSnapshot) -> bool {
    current.snapshot.as_ref().is_some_and(|installed| {
        installed.view_id() == incoming.view_id()
            && installed.clusterset_uuid() == incoming.clusterset_uuid()
            && installed.router_options != incoming.router_options
    })
}

/// Whether a live connection stays valid under `state`.
fn keeps_binding(state: &RoutingState, binding: &Binding) -> bool {
    let (Some(snapshot), Some(cluster_uuid)) = (&state.snapshot, state.availability.cluster_uuid())
    else {
        return false;
    };

    if binding.cluster_uuid != cluster_uuid || !state.availability.allows(binding.route) {
        return false;
    }

    let Some(cluster) = snapshot.cluster_by_uuid(cluster_uuid) else {
        return false;
    };

    match binding.route {
        RouteKind::ReadWrite => cluster
            .primary_node()
            .is_some_and(|primary| primary.address == binding.node),
        RouteKind::ReadOnly => cluster.contains_node(&binding.node),
    }
}
