use crate::core::NodeAddress;
use std::collections::HashMap;
use std::sync::Mutex;

/// Consecutive failed contacts per node.
///
/// Diagnostic only: destination selection never consults it.
#[derive(Debug, Default)]
pub struct NodeHealth {
    failures: Mutex<HashMap<NodeAddress, u32>>,
}

impl NodeHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, node: &NodeAddress) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(node);
        }
    }

    pub fn record_failure(&self, node: &NodeAddress) -> u32 {
        match self.failures.lock() {
            Ok(mut failures) => {
                let count = failures.entry(node.clone()).or_insert(0);
                *count = count.saturating_add(1);
                *count
            }
            Err(_) => 0,
        }
    }

    pub fn failures(&self, node: &NodeAddress) -> u32 {
        self.failures
            .lock()
            .ok()
            .and_then(|failures| failures.get(node).copied())
            .unwrap_or_default()
    }

    /// Nodes whose last contact failed, sorted.
    pub fn unreachable(&self) -> Vec<NodeAddress> {
        let mut nodes: Vec<NodeAddress> = self
            .failures
            .lock()
            .map(|failures| failures.keys().cloned().collect())
            .unwrap_or_default();
        nodes.sort();
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_reset_on_success() {
        let health = NodeHealth::new();
        let node = NodeAddress::localhost(3310);

        assert_eq!(health.record_failure(&node), 1);
        assert_eq!(health.record_failure(&node), 2);
        assert_eq!(health.unreachable(), vec![node.clone()]);

        health.record_success(&node);
        assert_eq!(health.failures(&node), 0);
        assert!(health.unreachable().is_empty());
    }
}
