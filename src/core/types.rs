use super::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Freshness counter of a ClusterSet metadata snapshot.
///
/// Kept at 64 bits; values above `u32::MAX` are valid.
pub type ViewId = u64;

/// Network endpoint of a backend node or metadata server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            RouterError::ConfigError(format!("address '{}' must be in host:port form", s))
        })?;
        if host.trim().is_empty() {
            return Err(RouterError::ConfigError(format!(
                "address '{}' has an empty host",
                s
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| RouterError::ConfigError(format!("address '{}' has an invalid port", s)))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = RouterError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(value: NodeAddress) -> Self {
        value.to_string()
    }
}

/// Logical route a client connects through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteKind {
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::ReadWrite => write!(f, "RW"),
            RouteKind::ReadOnly => write!(f, "RO"),
        }
    }
}

/// How a route picks among its candidate nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    FirstAvailable,
    #[default]
    RoundRobin,
}

impl FromStr for RoutingStrategy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first-available" => Ok(Self::FirstAvailable),
            "round-robin" => Ok(Self::RoundRobin),
            other => Err(RouterError::ConfigError(format!(
                "unknown routing_strategy '{}'",
                other
            ))),
        }
    }
}
