use super::MetadataSnapshot;
use crate::core::ViewId;
use tracing::{Level, event};

/// Outcome of offering a freshly fetched snapshot to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileDecision {
    /// The snapshot becomes the accepted one.
    Accept,
    /// The snapshot is not newer than what is already accepted.
    Stale { current: ViewId, incoming: ViewId },
    /// The snapshot describes a different ClusterSet than the expected one.
    IdentityMismatch { expected: String, observed: String },
}

/// Decides which metadata snapshot is authoritative.
///
/// A snapshot replaces the accepted one only when its view-id is strictly
/// higher, so the outcome depends on view-ids and never on arrival order.
#[derive(Debug, Clone, Default)]
pub struct ViewReconciler {
    expected_clusterset: Option<String>,
    accepted_view_id: Option<ViewId>,
    quarantined: bool,
}

impl ViewReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the reconciler from the persisted state record.
    pub fn with_expected(clusterset_uuid: impl Into<String>, view_id: ViewId) -> Self {
        Self {
            expected_clusterset: Some(clusterset_uuid.into()),
            accepted_view_id: None,
            quarantined: false,
        }
        .with_floor(view_id)
    }

    fn with_floor(mut self, view_id: ViewId) -> Self {
        // The persisted view-id is only a hint; a live server reporting the
        // same view must still be accepted once to build the topology.
        self.accepted_view_id = view_id.checked_sub(1);
        self
    }

    pub fn expected_clusterset(&self) -> Option<&str> {
        self.expected_clusterset.as_deref()
    }

    pub fn accepted_view_id(&self) -> Option<ViewId> {
        self.accepted_view_id
    }

    /// True while the last offered snapshot carried a foreign ClusterSet id.
    pub fn is_quarantined(&self) -> bool {
        self.quarantined
    }

    /// Offers `incoming` and records the decision.
    pub fn reconcile(&mut self, incoming: &MetadataSnapshot) -> ReconcileDecision {
        let incoming_view = incoming.view_id();
        let identity_matches = self
            .expected_clusterset
            .as_deref()
            .is_none_or(|expected| expected == incoming.clusterset_uuid());

        // A foreign ClusterSet id is a mismatch at any view-id.
        if !identity_matches {
            return self.mismatch(incoming);
        }

        if self.quarantined {
            if let Some(current) = self.accepted_view_id {
                if incoming_view < current {
                    return ReconcileDecision::Stale {
                        current,
                        incoming: incoming_view,
                    };
                }
            }
            return self.accept(incoming);
        }

        if let Some(current) = self.accepted_view_id {
            if incoming_view <= current {
                event!(
                    Level::TRACE,
                    current,
                    incoming = incoming_view,
                    "ignoring metadata with stale view_id"
                );
                return ReconcileDecision::Stale {
                    current,
                    incoming: incoming_view,
                };
            }
        }

        self.accept(incoming)
    }

    fn accept(&mut self, incoming: &MetadataSnapshot) -> ReconcileDecision {
        if self.expected_clusterset.is_none() {
            self.expected_clusterset = Some(incoming.clusterset_uuid().to_string());
        }
        self.accepted_view_id = Some(incoming.view_id());
        self.quarantined = false;
        ReconcileDecision::Accept
    }

    fn mismatch(&mut self, incoming: &MetadataSnapshot) -> ReconcileDecision {
        let expected = self.expected_clusterset.clone().unwrap_or_default();
        if !self.quarantined {
            event!(
                Level::WARN,
                expected = %expected,
                observed = %incoming.clusterset_uuid(),
                "ClusterSet id in the metadata does not match the one in the state file"
            );
        }
        self.quarantined = true;
        ReconcileDecision::IdentityMismatch {
            expected,
            observed: incoming.clusterset_uuid().to_string(),
        }
    }
}
