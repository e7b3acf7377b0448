use serde::{Deserialize, Serialize};
use tracing::{Level, event};

/// What the router may still serve when its target cluster is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidatedClusterRoutingPolicy {
    #[default]
    DropAll,
    AcceptRo,
}

impl InvalidatedClusterRoutingPolicy {
    /// Unrecognized names fall back to `DropAll`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "accept_ro" => Self::AcceptRo,
            _ => Self::DropAll,
        }
    }
}

/// Router-facing overrides embedded in the ClusterSet metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterOptions {
    /// `Some` once the metadata carries a `targetCluster` entry, even an empty one.
    pub target_cluster: Option<String>,
    pub invalidated_cluster_routing_policy: InvalidatedClusterRoutingPolicy,
}

#[derive(Deserialize)]
struct RawRouterOptions {
    #[serde(rename = "targetCluster")]
    target_cluster: Option<serde_json::Value>,
    #[serde(rename = "invalidatedClusterRoutingPolicy")]
    invalidated_cluster_routing_policy: Option<serde_json::Value>,
}

impl RouterOptions {
    /// Parses the `router_options` JSON blob. Blank or malformed input yields defaults.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }

        let parsed: RawRouterOptions = match serde_json::from_str(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                event!(
                    Level::WARN,
                    error = %err,
                    "ignoring malformed router_options in the metadata"
                );
                return Self::default();
            }
        };

        let target_cluster = parsed.target_cluster.map(|value| match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        let invalidated_cluster_routing_policy = parsed
            .invalidated_cluster_routing_policy
            .as_ref()
            .and_then(|value| value.as_str())
            .map(InvalidatedClusterRoutingPolicy::from_name)
            .unwrap_or_default();

        Self {
            target_cluster,
            invalidated_cluster_routing_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_options() {
        let options = RouterOptions::parse(
            r#"{"targetCluster" : "00000000-0000-0000-0000-0000000000g2", "invalidatedClusterRoutingPolicy" : "accept_ro" }"#,
        );
        assert_eq!(
            options.target_cluster.as_deref(),
            Some("00000000-0000-0000-0000-0000000000g2")
        );
        assert_eq!(
            options.invalidated_cluster_routing_policy,
            InvalidatedClusterRoutingPolicy::AcceptRo
        );
    }

    #[test]
    fn test_policy_defaults_to_drop_all() {
        for raw in [
            r#"{"invalidatedClusterRoutingPolicy" : ""}"#,
            r#"{"invalidatedClusterRoutingPolicy" : "unsupported"}"#,
            r#"{"invalidatedClusterRoutingPolicy" : "drop_all"}"#,
            r#"{}"#,
        ] {
            assert_eq!(
                RouterOptions::parse(raw).invalidated_cluster_routing_policy,
                InvalidatedClusterRoutingPolicy::DropAll,
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_empty_target_is_kept_as_present() {
        let options = RouterOptions::parse(r#"{"targetCluster" : "" }"#);
        assert_eq!(options.target_cluster.as_deref(), Some(""));
    }

    #[test]
    fn test_blank_and_malformed_yield_defaults() {
        assert_eq!(RouterOptions::parse(""), RouterOptions::default());
        assert_eq!(RouterOptions::parse("{not json"), RouterOptions::default());
    }
}
