use crate::core::{NodeAddress, Result, RouteKind, ViewId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Where a new connection is going, as decided under the registry lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTarget {
    pub node: NodeAddress,
    pub cluster_uuid: String,
    pub state_version: u64,
}

/// A live client connection bound to one backend node.
#[derive(Debug)]
pub struct Binding {
    pub id: u64,
    pub route: RouteKind,
    pub node: NodeAddress,
    pub cluster_uuid: String,
    pub state_version: u64,
    closer: watch::Sender<bool>,
}

impl Binding {
    fn close(&self) {
        let _ = self.closer.send(true);
    }

    fn info(&self) -> BindingInfo {
        BindingInfo {
            id: self.id,
            route: self.route,
            node: self.node.clone(),
            cluster_uuid: self.cluster_uuid.clone(),
            state_version: self.state_version,
        }
    }
}

/// Detached copy of a binding for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub id: u64,
    pub route: RouteKind,
    pub node: NodeAddress,
    pub cluster_uuid: String,
    pub state_version: u64,
}

struct RegistryShared {
    bindings: Mutex<HashMap<u64, Binding>>,
    next_id: AtomicU64,
    dropped_total: AtomicU64,
}

impl RegistryShared {
    fn bindings(&self) -> Result<MutexGuard<'_, HashMap<u64, Binding>>> {
        Ok(self.bindings.lock()?)
    }
}

/// Registry of every connection the router currently forwards.
///
/// Registration and sweeping happen under the same lock, so a connection is
/// either registered before a routing change (and swept by it) or selected
/// against the routing state the change installed.
#[derive(Clone)]
pub struct ConnectionRegistry {
    shared: Arc<RegistryShared>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                bindings: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                dropped_total: AtomicU64::new(0),
            }),
        }
    }

    /// Runs `select` under the registry lock and registers the connection it picks.
    pub fn bind<F>(&self, route: RouteKind, select: F) -> Result<ConnectionLease>
    where
        F: FnOnce() -> Result<BindingTarget>,
    {
        let mut bindings = self.shared.bindings()?;
        let target = select()?;

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (closer, closed) = watch::channel(false);
        bindings.insert(
            id,
            Binding {
                id,
                route,
                node: target.node.clone(),
                cluster_uuid: target.cluster_uuid.clone(),
                state_version: target.state_version,
                closer,
            },
        );

        Ok(ConnectionLease {
            id,
            route,
            node: target.node,
            cluster_uuid: target.cluster_uuid,
            closed,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Runs `install` and then closes every binding `keep` rejects, all under
    /// the registry lock. Returns how many bindings were closed.
    pub fn sweep<I, K>(&self, install: I, keep: K) -> Result<usize>
    where
        I: FnOnce(),
        K: Fn(&Binding) -> bool,
    {
        let mut bindings = self.shared.bindings()?;
        install();

        let doomed: Vec<u64> = bindings
            .values()
            .filter(|binding| !keep(binding))
            .map(|binding| binding.id)
            .collect();

        for id in &doomed {
            if let Some(binding) = bindings.remove(id) {
                binding.close();
            }
        }

        self.shared
            .dropped_total
            .fetch_add(doomed.len() as u64, Ordering::SeqCst);
        Ok(doomed.len())
    }

    /// Closes every binding.
    pub fn close_all<I: FnOnce()>(&self, install: I) -> Result<usize> {
        self.sweep(install, |_| false)
    }

    pub fn active(&self) -> usize {
        self.shared
            .bindings
            .lock()
            .map(|bindings| bindings.len())
            .unwrap_or_default()
    }

    pub fn dropped_total(&self) -> u64 {
        self.shared.dropped_total.load(Ordering::SeqCst)
    }

    /// Bindings ordered by registration.
    pub fn bindings(&self) -> Result<Vec<BindingInfo>> {
        let bindings = self.shared.bindings()?;
        let mut infos: Vec<BindingInfo> = bindings.values().map(Binding::info).collect();
        infos.sort_by_key(|info| info.id);
        Ok(infos)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("active", &self.active())
            .field("dropped_total", &self.dropped_total())
            .finish()
    }
}

/// Guard for a registered connection.
///
/// Dropping the lease unregisters the connection. The router closes a lease
/// by flipping its watch channel; the forwarding task observes that through
/// [`ConnectionLease::dropped`].
pub struct ConnectionLease {
    id: u64,
    route: RouteKind,
    node: NodeAddress,
    cluster_uuid: String,
    closed: watch::Receiver<bool>,
    shared: Arc<RegistryShared>,
}

impl ConnectionLease {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn route(&self) -> RouteKind {
        self.route
    }

    /// Backend node the connection is bound to
    pub fn node(&self) -> &NodeAddress {
        &self.node
    }

    pub fn cluster_uuid(&self) -> &str {
        &self.cluster_uuid
    }

    /// True once the router has closed this connection.
    pub fn is_dropped(&self) -> bool {
        *self.closed.borrow() || self.closed.has_changed().is_err()
    }

    /// Resolves once the router closes this connection.
    pub async fn dropped(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|dropped| *dropped).await;
    }
}

impl fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("node", &self.node)
            .field("cluster_uuid", &self.cluster_uuid)
            .finish()
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let mut bindings = match self.shared.bindings.lock() {
            Ok(bindings) => bindings,
            Err(poisoned) => poisoned.into_inner(),
        };
        bindings.remove(&self.id);
    }
}

/// Router statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterStats {
    pub active_connections: usize,
    pub dropped_connections: u64,
    pub state_version: u64,
    pub view_id: Option<ViewId>,
}

impl fmt::Display for RouterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self
            .view_id
            .map(|view| view.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "Router Stats: {} active, {} dropped, state v{}, view {}",
            self.active_connections, self.dropped_connections, self.state_version, view
        )
    }
}
