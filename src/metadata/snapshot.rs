use super::options::RouterOptions;
use crate::core::{NodeAddress, Result, RouterError, ViewId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role of a node inside its own cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeRole {
    Primary,
    Secondary,
}

/// Role of a cluster inside the ClusterSet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterRole {
    Primary,
    Replica,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub uuid: String,
    pub address: NodeAddress,
    pub role: NodeRole,
}

impl Node {
    pub fn new(uuid: impl Into<String>, address: NodeAddress, role: NodeRole) -> Self {
        Self {
            uuid: uuid.into(),
            address,
            role,
        }
    }

    pub fn primary(uuid: impl Into<String>, address: NodeAddress) -> Self {
        Self::new(uuid, address, NodeRole::Primary)
    }

    pub fn secondary(uuid: impl Into<String>, address: NodeAddress) -> Self {
        Self::new(uuid, address, NodeRole::Secondary)
    }
}

/// One member cluster of a ClusterSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Position of the cluster within the set.
    pub id: u32,
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub role: ClusterRole,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Cluster {
    pub fn new(id: u32, uuid: impl Into<String>, role: ClusterRole, nodes: Vec<Node>) -> Self {
        Self {
            id,
            uuid: uuid.into(),
            name: format!("cluster-{}", id),
            role,
            invalid: false,
            nodes,
        }
    }

    pub fn invalidated(mut self) -> Self {
        self.invalid = true;
        self
    }

    pub fn is_primary(&self) -> bool {
        self.role == ClusterRole::Primary
    }

    /// The node currently holding the read-write role inside this cluster.
    pub fn primary_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|node| node.role == NodeRole::Primary)
    }

    pub fn secondary_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|node| node.role == NodeRole::Secondary)
    }

    pub fn contains_node(&self, address: &NodeAddress) -> bool {
        self.nodes.iter().any(|node| &node.address == address)
    }

    /// Node addresses ordered primary first, then the rest in metadata order.
    pub fn metadata_servers(&self) -> Vec<NodeAddress> {
        let mut servers = Vec::with_capacity(self.nodes.len());
        if let Some(primary) = self.primary_node() {
            servers.push(primary.address.clone());
        }
        servers.extend(
            self.nodes
                .iter()
                .filter(|node| node.role != NodeRole::Primary)
                .map(|node| node.address.clone()),
        );
        servers
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSet {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub view_id: ViewId,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl ClusterSet {
    pub fn new(uuid: impl Into<String>, view_id: ViewId, clusters: Vec<Cluster>) -> Self {
        Self {
            uuid: uuid.into(),
            name: String::new(),
            view_id,
            clusters,
        }
    }
}

/// Immutable picture of the ClusterSet as reported by one metadata server.
///
/// A refresh never mutates a snapshot; an accepted snapshot replaces the
/// previous one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub clusterset: ClusterSet,
    /// Raw `router_options` JSON document as stored in the metadata.
    #[serde(default)]
    pub router_options: String,
}

impl MetadataSnapshot {
    pub fn new(clusterset: ClusterSet, router_options: impl Into<String>) -> Self {
        Self {
            clusterset,
            router_options: router_options.into(),
        }
    }

    pub fn view_id(&self) -> ViewId {
        self.clusterset.view_id
    }

    pub fn clusterset_uuid(&self) -> &str {
        &self.clusterset.uuid
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusterset.clusters
    }

    pub fn primary_cluster(&self) -> Option<&Cluster> {
        self.clusters().iter().find(|cluster| cluster.is_primary())
    }

    /// Exact, case-sensitive lookup.
    pub fn cluster_by_uuid(&self, uuid: &str) -> Option<&Cluster> {
        self.clusters().iter().find(|cluster| cluster.uuid == uuid)
    }

    pub fn parsed_router_options(&self) -> RouterOptions {
        RouterOptions::parse(&self.router_options)
    }

    /// Every node endpoint in cluster order, then node order.
    pub fn all_node_addresses(&self) -> Vec<NodeAddress> {
        self.clusters()
            .iter()
            .flat_map(|cluster| cluster.nodes.iter().map(|node| node.address.clone()))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.clusters().iter().map(|cluster| cluster.nodes.len()).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.clusterset.uuid.trim().is_empty() {
            return Err(RouterError::InvalidMetadata {
                server: String::new(),
                reason: "clusterset uuid must not be empty".to_string(),
            });
        }

        let primaries = self
            .clusters()
            .iter()
            .filter(|cluster| cluster.is_primary())
            .count();
        if primaries > 1 {
            return Err(RouterError::InvalidMetadata {
                server: String::new(),
                reason: format!("{} clusters are flagged PRIMARY", primaries),
            });
        }

        let mut seen = HashSet::new();
        for cluster in self.clusters() {
            if !seen.insert(cluster.uuid.as_str()) {
                return Err(RouterError::InvalidMetadata {
                    server: String::new(),
                    reason: format!("cluster uuid '{}' appears more than once", cluster.uuid),
                });
            }
            let primary_nodes = cluster
                .nodes
                .iter()
                .filter(|node| node.role == NodeRole::Primary)
                .count();
            if primary_nodes > 1 {
                return Err(RouterError::InvalidMetadata {
                    server: String::new(),
                    reason: format!(
                        "cluster '{}' reports {} primary nodes",
                        cluster.uuid, primary_nodes
                    ),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(id: u32, role: ClusterRole, base_port: u16) -> Cluster {
        Cluster::new(
            id,
            format!("gr-{}", id),
            role,
            vec![
                Node::primary(format!("n{}1", id), NodeAddress::localhost(base_port)),
                Node::secondary(format!("n{}2", id), NodeAddress::localhost(base_port + 1)),
                Node::secondary(format!("n{}3", id), NodeAddress::localhost(base_port + 2)),
            ],
        )
    }

    #[test]
    fn test_lookup_helpers() {
        let snapshot = MetadataSnapshot::new(
            ClusterSet::new(
                "cs",
                7,
                vec![
                    cluster(0, ClusterRole::Replica, 3000),
                    cluster(1, ClusterRole::Primary, 4000),
                ],
            ),
            "",
        );

        assert_eq!(snapshot.primary_cluster().unwrap().uuid, "gr-1");
        assert!(snapshot.cluster_by_uuid("GR-1").is_none());
        assert_eq!(snapshot.node_count(), 6);
        assert_eq!(snapshot.all_node_addresses()[3], NodeAddress::localhost(4000));
        snapshot.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_two_primaries() {
        let snapshot = MetadataSnapshot::new(
            ClusterSet::new(
                "cs",
                1,
                vec![
                    cluster(0, ClusterRole::Primary, 3000),
                    cluster(1, ClusterRole::Primary, 4000),
                ],
            ),
            "",
        );
        let err = snapshot.validate().unwrap_err();
        assert!(err.to_string().contains("2 clusters are flagged PRIMARY"));
    }

    #[test]
    fn test_metadata_servers_put_primary_first() {
        let mut c = cluster(0, ClusterRole::Primary, 3000);
        c.nodes.rotate_left(1);
        assert_eq!(
            c.metadata_servers(),
            vec![
                NodeAddress::localhost(3000),
                NodeAddress::localhost(3001),
                NodeAddress::localhost(3002)
            ]
        );
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = MetadataSnapshot::new(
            ClusterSet::new(
                "cs",
                u64::from(u32::MAX) + 1,
                vec![cluster(0, ClusterRole::Primary, 3000)],
            ),
            r#"{"targetCluster":"primary"}"#,
        );
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["clusterset"]["view_id"], 4294967296u64);
        assert_eq!(json["clusterset"]["clusters"][0]["role"], "PRIMARY");
        let back: MetadataSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
