use clusterset_router::{
    Cluster, ClusterRole, ClusterSet, ClusterSetRouter, InMemoryMetadataSource, MetadataSnapshot,
    Node, NodeAddress, RouteKind, RouteListener, RouterConfig, ViewId,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_echo_backend() -> NodeAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    NodeAddress::localhost(port)
}

/// Two clusters whose nodes are live echo servers.
fn clusterset(
    view_id: ViewId,
    primary_cluster: usize,
    nodes: &[Vec<NodeAddress>],
) -> MetadataSnapshot {
    let clusters = nodes
        .iter()
        .enumerate()
        .map(|(c, addresses)| {
            let role = if c == primary_cluster {
                ClusterRole::Primary
            } else {
                ClusterRole::Replica
            };
            let nodes = addresses
                .iter()
                .enumerate()
                .map(|(n, address)| {
                    let uuid = format!("node-{}-{}", c, n);
                    if n == 0 {
                        Node::primary(uuid, address.clone())
                    } else {
                        Node::secondary(uuid, address.clone())
                    }
                })
                .collect();
            Cluster::new(c as u32, format!("cluster-{}", c), role, nodes)
        })
        .collect();
    MetadataSnapshot::new(
        ClusterSet::new("proxy-clusterset", view_id, clusters),
        r#"{"targetCluster" : "primary"}"#,
    )
}

struct ProxyHarness {
    source: InMemoryMetadataSource,
    router: Arc<ClusterSetRouter>,
    nodes: Vec<Vec<NodeAddress>>,
    shutdown: watch::Sender<bool>,
}

impl ProxyHarness {
    async fn start() -> Self {
        let mut nodes = Vec::new();
        for _ in 0..2 {
            let mut cluster = Vec::new();
            for _ in 0..2 {
                cluster.push(spawn_echo_backend().await);
            }
            nodes.push(cluster);
        }

        let snapshot = clusterset(1, 0, &nodes);
        let source = InMemoryMetadataSource::new();
        source.publish_all(&snapshot.all_node_addresses(), &snapshot).await;

        let config = RouterConfig::new().bootstrap_server(nodes[0][0].clone());
        let router = Arc::new(ClusterSetRouter::new(config, Arc::new(source.clone())).unwrap());
        assert!(router.refresh_once().await.outcome.is_some());

        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            router,
            nodes,
            shutdown,
        }
    }

    async fn listen(&self, route: RouteKind) -> SocketAddr {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = RouteListener::bind(route, addr, Arc::clone(&self.router))
            .await
            .unwrap();
        assert_eq!(listener.route(), route);
        let local_addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run(self.shutdown.subscribe()));
        local_addr
    }

    async fn publish(&self, snapshot: &MetadataSnapshot) {
        self.source.publish_all(&snapshot.all_node_addresses(), snapshot).await;
    }
}

async fn echo_round_trip(client: &mut TcpStream, payload: &[u8]) {
    client.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    timeout(IO_TIMEOUT, client.read_exact(&mut buf))
        .await
        .expect("echo timed out")
        .unwrap();
    assert_eq!(buf, payload);
}

/// Waits until the proxy closes the client side.
async fn assert_closed(client: &mut TcpStream) {
    let mut buf = [0u8; 16];
    let read = timeout(IO_TIMEOUT, client.read(&mut buf))
        .await
        .expect("connection was not closed");
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected read: {:?}", read);
}

#[tokio::test]
async fn proxies_bytes_to_the_routed_backend() {
    let harness = ProxyHarness::start().await;
    let rw_addr = harness.listen(RouteKind::ReadWrite).await;
    let ro_addr = harness.listen(RouteKind::ReadOnly).await;

    let mut rw = TcpStream::connect(rw_addr).await.unwrap();
    echo_round_trip(&mut rw, b"SELECT @@hostname").await;
    let mut ro = TcpStream::connect(ro_addr).await.unwrap();
    echo_round_trip(&mut ro, b"SELECT 1").await;

    let bindings = harness.router.registry().bindings().unwrap();
    assert_eq!(bindings.len(), 2);
    let rw_binding = bindings
        .iter()
        .find(|binding| binding.route == RouteKind::ReadWrite)
        .unwrap();
    assert_eq!(rw_binding.node, harness.nodes[0][0]);
    let ro_binding = bindings
        .iter()
        .find(|binding| binding.route == RouteKind::ReadOnly)
        .unwrap();
    assert_eq!(ro_binding.node, harness.nodes[0][1]);

    drop(rw);
    drop(ro);
    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn routing_change_closes_proxied_connections() {
    let harness = ProxyHarness::start().await;
    let rw_addr = harness.listen(RouteKind::ReadWrite).await;

    let mut client = TcpStream::connect(rw_addr).await.unwrap();
    echo_round_trip(&mut client, b"ping").await;

    harness.publish(&clusterset(2, 1, &harness.nodes)).await;
    let outcome = harness.router.refresh_once().await.outcome.unwrap();
    assert_eq!(outcome.dropped(), 1);
    assert_closed(&mut client).await;

    // new clients land on the promoted cluster
    let mut client = TcpStream::connect(rw_addr).await.unwrap();
    echo_round_trip(&mut client, b"pong").await;
    let bindings = harness.router.registry().bindings().unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].node, harness.nodes[1][0]);

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn refused_route_closes_the_client() {
    let harness = ProxyHarness::start().await;
    let rw_addr = harness.listen(RouteKind::ReadWrite).await;

    let mut invalidated = clusterset(2, 0, &harness.nodes);
    invalidated.clusterset.clusters[0].invalid = true;
    harness.publish(&invalidated).await;
    harness.router.refresh_once().await;

    let mut client = TcpStream::connect(rw_addr).await.unwrap();
    assert_closed(&mut client).await;
    assert_eq!(harness.router.registry().active(), 0);

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn unreachable_backend_is_recorded() {
    let harness = ProxyHarness::start().await;

    // a port nobody listens on
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        NodeAddress::localhost(listener.local_addr().unwrap().port())
    };
    let mut nodes = harness.nodes.clone();
    nodes[0][0] = dead.clone();
    harness.publish(&clusterset(2, 0, &nodes)).await;
    harness.router.refresh_once().await;

    let rw_addr = harness.listen(RouteKind::ReadWrite).await;
    let mut client = TcpStream::connect(rw_addr).await.unwrap();
    assert_closed(&mut client).await;
    assert_eq!(harness.router.health().failures(&dead), 1);

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn listener_stops_on_shutdown() {
    let harness = ProxyHarness::start().await;
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = RouteListener::bind(RouteKind::ReadOnly, addr, Arc::clone(&harness.router))
        .await
        .unwrap();
    let task = tokio::spawn(listener.run(harness.shutdown.subscribe()));

    harness.shutdown.send(true).unwrap();
    timeout(IO_TIMEOUT, task).await.unwrap().unwrap().unwrap();
}
