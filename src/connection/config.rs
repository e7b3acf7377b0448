use crate::core::{NodeAddress, RoutingStrategy};
use crate::routing::TargetCluster;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Router configuration
///
/// Mirrors the `[metadata_cache]` and `[routing]` sections a config loader
/// would produce.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Identifier this router checks in with
    pub router_id: u32,

    /// Bootstrap target; overridden by `targetCluster` from the metadata
    pub target_cluster: TargetCluster,

    /// Interval between metadata refreshes
    pub ttl: Duration,

    /// Bound on every metadata query and backend dial
    pub connect_timeout: Duration,

    /// Dynamic state file seeding the metadata servers
    pub state_file: Option<PathBuf>,

    /// Metadata servers to use when there is no state file
    pub bootstrap_servers: Vec<NodeAddress>,

    /// Listening address of the read-write route
    pub rw_bind: Option<SocketAddr>,

    /// Listening address of the read-only route
    pub ro_bind: Option<SocketAddr>,

    /// Selection strategy of the read-only route
    pub ro_strategy: RoutingStrategy,
}

impl RouterConfig {
    /// Create a new configuration with default timings
    pub fn new() -> Self {
        Self {
            router_id: 1,
            target_cluster: TargetCluster::Unset,
            ttl: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(1),
            state_file: None,
            bootstrap_servers: Vec::new(),
            rw_bind: None,
            ro_bind: None,
            ro_strategy: RoutingStrategy::RoundRobin,
        }
    }

    /// Set the router id
    pub fn router_id(mut self, router_id: u32) -> Self {
        self.router_id = router_id;
        self
    }

    /// Set the target cluster from its textual form
    pub fn target_cluster(mut self, target: &str) -> Self {
        self.target_cluster = TargetCluster::parse(target);
        self
    }

    /// Set the metadata TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the dynamic state file
    pub fn state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Add a bootstrap metadata server
    pub fn bootstrap_server(mut self, server: NodeAddress) -> Self {
        self.bootstrap_servers.push(server);
        self
    }

    /// Set the RW listening address
    pub fn rw_bind(mut self, addr: SocketAddr) -> Self {
        self.rw_bind = Some(addr);
        self
    }

    /// Set the RO listening address
    pub fn ro_bind(mut self, addr: SocketAddr) -> Self {
        self.ro_bind = Some(addr);
        self
    }

    /// Set the RO routing strategy
    pub fn ro_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.ro_strategy = strategy;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl.is_zero() {
            return Err("ttl must be > 0".to_string());
        }

        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0".to_string());
        }

        if self.state_file.is_none() && self.bootstrap_servers.is_empty() {
            return Err("either a state file or bootstrap servers are required".to_string());
        }

        if let (Some(rw), Some(ro)) = (self.rw_bind, self.ro_bind) {
            if rw == ro && rw.port() != 0 {
                return Err(format!("RW and RO routes cannot share {}", rw));
            }
        }

        Ok(())
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.router_id, 1);
        assert!(config.target_cluster.is_unset());
        assert_eq!(config.ro_strategy, RoutingStrategy::RoundRobin);
    }

    #[test]
    fn test_builder_pattern() {
        let config = RouterConfig::new()
            .router_id(7)
            .target_cluster("00000000-0000-0000-0000-0000000000g2")
            .ttl(Duration::from_millis(50))
            .bootstrap_server(NodeAddress::localhost(3310));

        assert_eq!(config.router_id, 7);
        assert_eq!(
            config.target_cluster,
            TargetCluster::ByUuid("00000000-0000-0000-0000-0000000000g2".into())
        );
        assert_eq!(config.ttl, Duration::from_millis(50));
        assert_eq!(config.bootstrap_servers.len(), 1);
    }

    #[test]
    fn test_validate() {
        let valid = RouterConfig::new().state_file("/tmp/state.json");
        assert!(valid.validate().is_ok());

        assert!(RouterConfig::new().validate().is_err());

        let zero_ttl = RouterConfig::new()
            .state_file("/tmp/state.json")
            .ttl(Duration::ZERO);
        assert!(zero_ttl.validate().is_err());

        let shared: SocketAddr = "127.0.0.1:6446".parse().unwrap();
        let clash = RouterConfig::new()
            .state_file("/tmp/state.json")
            .rw_bind(shared)
            .ro_bind(shared);
        assert!(clash.validate().is_err());
    }
}
