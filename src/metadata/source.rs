use super::MetadataSnapshot;
use crate::core::{NodeAddress, Result};
use async_trait::async_trait;

/// Trait for components that can query a metadata server for the ClusterSet topology.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetches the topology as currently seen by `server`.
    async fn fetch_metadata(&self, server: &NodeAddress) -> Result<MetadataSnapshot>;

    /// Records that this router instance is alive.
    ///
    /// Only ever sent to the primary node of the primary cluster.
    async fn update_router_check_in(&self, _server: &NodeAddress, _router_id: u32) -> Result<()> {
        Ok(())
    }
}
