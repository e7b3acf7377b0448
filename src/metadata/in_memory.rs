use super::{MetadataSnapshot, MetadataSource};
use crate::core::{NodeAddress, Result, RouterError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct InMemoryMetadataServer {
    snapshot: Option<MetadataSnapshot>,
    unreachable: bool,
    fetch_count: u64,
    check_in_count: u64,
}

/// An in-memory implementation of `MetadataSource`.
///
/// Every metadata server publishes its own view of the ClusterSet, so tests can
/// simulate servers that lag behind, disagree, or disappear.
#[derive(Clone, Default)]
pub struct InMemoryMetadataSource {
    servers: Arc<Mutex<HashMap<NodeAddress, InMemoryMetadataServer>>>,
}

impl InMemoryMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what `server` reports on the next fetch.
    pub async fn publish(&self, server: &NodeAddress, snapshot: MetadataSnapshot) {
        let mut servers = self.servers.lock().await;
        servers.entry(server.clone()).or_default().snapshot = Some(snapshot);
    }

    /// Publishes the same snapshot on every listed server.
    pub async fn publish_all<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a NodeAddress>,
        snapshot: &MetadataSnapshot,
    ) {
        let mut servers = self.servers.lock().await;
        for server in targets {
            servers.entry(server.clone()).or_default().snapshot = Some(snapshot.clone());
        }
    }

    /// Makes a server stop (or resume) answering.
    pub async fn set_reachable(&self, server: &NodeAddress, reachable: bool) {
        let mut servers = self.servers.lock().await;
        servers.entry(server.clone()).or_default().unreachable = !reachable;
    }

    /// Number of successful metadata queries served by `server`.
    pub async fn fetch_count(&self, server: &NodeAddress) -> u64 {
        let servers = self.servers.lock().await;
        servers.get(server).map(|s| s.fetch_count).unwrap_or_default()
    }

    /// Number of router check-ins received by `server`.
    pub async fn check_in_count(&self, server: &NodeAddress) -> u64 {
        let servers = self.servers.lock().await;
        servers.get(server).map(|s| s.check_in_count).unwrap_or_default()
    }
}

#[async_trait]
impl MetadataSource for InMemoryMetadataSource {
    async fn fetch_metadata(&self, server: &NodeAddress) -> Result<MetadataSnapshot> {
        let mut servers = self.servers.lock().await;
        let entry = servers
            .get_mut(server)
            .filter(|entry| !entry.unreachable)
            .ok_or_else(|| RouterError::MetadataUnreachable {
                server: server.to_string(),
                reason: "connection refused".to_string(),
            })?;
        let snapshot = entry.snapshot.clone().ok_or_else(|| RouterError::InvalidMetadata {
            server: server.to_string(),
            reason: "server has no ClusterSet metadata".to_string(),
        })?;
        entry.fetch_count += 1;
        Ok(snapshot)
    }

    async fn update_router_check_in(&self, server: &NodeAddress, _router_id: u32) -> Result<()> {
        let mut servers = self.servers.lock().await;
        let entry = servers
            .get_mut(server)
            .filter(|entry| !entry.unreachable)
            .ok_or_else(|| RouterError::MetadataUnreachable {
                server: server.to_string(),
                reason: "connection refused".to_string(),
            })?;
        entry.check_in_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ClusterSet;

    #[tokio::test]
    async fn test_publish_fetch_and_counters() {
        let source = InMemoryMetadataSource::new();
        let server = NodeAddress::localhost(5000);
        let snapshot = MetadataSnapshot::new(ClusterSet::new("cs", 3, Vec::new()), "");

        assert!(source.fetch_metadata(&server).await.is_err());

        source.publish(&server, snapshot.clone()).await;
        assert_eq!(source.fetch_metadata(&server).await.unwrap(), snapshot);
        assert_eq!(source.fetch_count(&server).await, 1);

        source.set_reachable(&server, false).await;
        let err = source.fetch_metadata(&server).await.unwrap_err();
        assert!(matches!(err, RouterError::MetadataUnreachable { .. }));
        assert!(source.update_router_check_in(&server, 1).await.is_err());
        assert_eq!(source.fetch_count(&server).await, 1);

        source.set_reachable(&server, true).await;
        source.update_router_check_in(&server, 1).await.unwrap();
        assert_eq!(source.check_in_count(&server).await, 1);
    }
}
