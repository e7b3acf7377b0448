use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::core::{Result, RouteKind, RouterError};
use crate::router::ClusterSetRouter;

/// Accepts clients for one route and pipes them to the backend the router picks.
pub struct RouteListener {
    route: RouteKind,
    listener: TcpListener,
    router: Arc<ClusterSetRouter>,
    metrics: Arc<ProxyMetrics>,
}

impl RouteListener {
    pub async fn bind(
        route: RouteKind,
        addr: SocketAddr,
        router: Arc<ClusterSetRouter>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("{} route listening on {}", route, listener.local_addr()?);
        Ok(Self {
            route,
            listener,
            router,
            metrics: Arc::new(ProxyMetrics::default()),
        })
    }

    pub fn route(&self) -> RouteKind {
        self.route
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts clients until `shutdown` flips to true or its sender goes away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("{} accept failed: {:?}", self.route, e);
                            continue;
                        }
                    };
                    let conn_count = self.metrics.on_connection();
                    debug!("{} accepted new connection from {}", self.route, peer);
                    if conn_count % 1000 == 0 {
                        info!("{} connections accepted: {}", self.route, conn_count);
                    }

                    let router = Arc::clone(&self.router);
                    let metrics = Arc::clone(&self.metrics);
                    let route = self.route;
                    tokio::spawn(async move {
                        if let Err(e) = forward(router, route, socket).await {
                            let refused = metrics.on_refused();
                            debug!(
                                "{} connection from {} closed ({} refused so far): {}",
                                route, peer, refused, e
                            );
                        }
                    });
                }
            }
        }

        info!("{} route stopped", self.route);
        Ok(())
    }
}

/// Dials the routed backend and pipes bytes until either side closes or the
/// router drops the connection.
async fn forward(
    router: Arc<ClusterSetRouter>,
    route: RouteKind,
    mut client: TcpStream,
) -> Result<()> {
    let lease = router.connect(route)?;
    let node = lease.node().clone();
    let connect_timeout = router.config().connect_timeout;

    let dial = TcpStream::connect((node.host.as_str(), node.port));
    let mut backend = match timeout(connect_timeout, dial).await {
        Ok(Ok(stream)) => {
            router.health().record_success(&node);
            stream
        }
        Ok(Err(e)) => {
            router.health().record_failure(&node);
            return Err(RouterError::BackendUnreachable {
                server: node.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            router.health().record_failure(&node);
            return Err(RouterError::BackendUnreachable {
                server: node.to_string(),
                reason: format!("timed out after {:?}", connect_timeout),
            });
        }
    };

    tokio::select! {
        piped = copy_bidirectional(&mut client, &mut backend) => {
            match piped {
                Ok((to_backend, to_client)) => {
                    debug!(
                        "Connection {} to {} finished ({} bytes up, {} bytes down)",
                        lease.id(),
                        node,
                        to_backend,
                        to_client
                    );
                }
                Err(e) => debug!("Connection {} to {} failed: {:?}", lease.id(), node, e),
            }
        }
        _ = lease.dropped() => {
            info!("Closing connection {} to {}: routing changed", lease.id(), node);
        }
    }

    Ok(())
}

#[derive(Debug, Default)]
struct ProxyMetrics {
    connections_accepted: AtomicU64,
    connections_refused: AtomicU64,
}

impl ProxyMetrics {
    fn on_connection(&self) -> u64 {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn on_refused(&self) -> u64 {
        self.connections_refused.fetch_add(1, Ordering::Relaxed) + 1
    }
}
