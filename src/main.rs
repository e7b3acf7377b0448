use anyhow::{Context, Result};
use clap::Parser;
use clusterset_router::{
    ClusterSetRouter, HttpMetadataSource, NodeAddress, RouterConfig, RoutingStrategy,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{Level, event};
use tracing_subscriber::EnvFilter;

/// Connection router following the primary cluster of a ClusterSet
#[derive(Parser, Debug)]
#[command(name = "clusterset-router")]
#[command(version, about, long_about = None)]
struct CliArgs {
    /// Dynamic state file seeding the metadata servers
    #[arg(long = "state-file")]
    state_file: Option<PathBuf>,

    /// Metadata server (host:port); repeatable
    #[arg(long = "bootstrap", action = clap::ArgAction::Append)]
    bootstrap: Vec<NodeAddress>,

    /// "primary", a cluster UUID, or empty
    #[arg(long = "target-cluster", default_value = "")]
    target_cluster: String,

    #[arg(long = "router-id", default_value_t = 1)]
    router_id: u32,

    /// Metadata refresh interval
    #[arg(long = "ttl-ms", default_value_t = 500)]
    ttl_ms: u64,

    #[arg(long = "connect-timeout-ms", default_value_t = 1000)]
    connect_timeout_ms: u64,

    #[arg(long = "rw-bind")]
    rw_bind: Option<SocketAddr>,

    #[arg(long = "ro-bind")]
    ro_bind: Option<SocketAddr>,

    /// first-available or round-robin
    #[arg(long = "ro-strategy", default_value = "round-robin")]
    ro_strategy: RoutingStrategy,
}

impl CliArgs {
    fn into_config(self) -> RouterConfig {
        let mut config = RouterConfig::new()
            .router_id(self.router_id)
            .target_cluster(&self.target_cluster)
            .ttl(Duration::from_millis(self.ttl_ms))
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .ro_strategy(self.ro_strategy);

        if let Some(path) = self.state_file {
            config = config.state_file(path);
        }
        for server in self.bootstrap {
            config = config.bootstrap_server(server);
        }
        if let Some(addr) = self.rw_bind {
            config = config.rw_bind(addr);
        }
        if let Some(addr) = self.ro_bind {
            config = config.ro_bind(addr);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CliArgs::parse().into_config();
    let source = Arc::new(HttpMetadataSource::new(config.connect_timeout)?);
    let router = Arc::new(ClusterSetRouter::new(config, source).context("failed to start router")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            event!(Level::INFO, "Shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    router.serve(shutdown_rx).await?;
    Ok(())
}
