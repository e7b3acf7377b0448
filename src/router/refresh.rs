use super::{ApplyOutcome, ClusterSetRouter, TargetAvailability};
use crate::core::{NodeAddress, Result, RouterError};
use crate::metadata::MetadataSnapshot;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{Instrument, Level, event, info_span};

/// Result of one metadata refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Servers contacted, in query order.
    pub queried: Vec<NodeAddress>,
    /// Servers that did not answer with usable metadata.
    pub failed: Vec<NodeAddress>,
    /// Server whose snapshot was offered to the router.
    pub source: Option<NodeAddress>,
    /// `None` when no server answered or the install failed.
    pub outcome: Option<ApplyOutcome>,
}

struct GroupResult {
    queried: Vec<NodeAddress>,
    failed: Vec<NodeAddress>,
    answer: Option<(NodeAddress, MetadataSnapshot)>,
}

impl ClusterSetRouter {
    /// Runs one refresh cycle: queries the metadata servers, installs the
    /// freshest snapshot and checks in with the primary.
    pub async fn refresh_once(&self) -> RefreshReport {
        let span = info_span!("router.refresh", router_id = self.config.router_id);
        self.refresh_cycle().instrument(span).await
    }

    async fn refresh_cycle(&self) -> RefreshReport {
        let groups = self.query_groups();
        let results = join_all(groups.into_iter().map(|group| self.query_group(group))).await;

        let mut report = RefreshReport::default();
        let mut freshest: Option<(NodeAddress, MetadataSnapshot)> = None;
        for result in results {
            report.queried.extend(result.queried);
            report.failed.extend(result.failed);
            if let Some((server, snapshot)) = result.answer {
                // ties keep the earlier answer
                let newer = freshest
                    .as_ref()
                    .is_none_or(|(_, best)| snapshot.view_id() > best.view_id());
                if newer {
                    freshest = Some((server, snapshot));
                }
            }
        }

        let Some((server, snapshot)) = freshest else {
            event!(
                Level::WARN,
                queried = report.queried.len(),
                "No metadata server answered, keeping the current routing state"
            );
            return report;
        };

        report.source = Some(server.clone());
        match self.apply_snapshot(snapshot) {
            Ok(outcome) => report.outcome = Some(outcome),
            Err(err) => {
                event!(Level::ERROR, server = %server, error = %err, "Failed to apply metadata");
            }
        }

        self.check_in().await;
        report
    }

    /// Servers to query this cycle, grouped so that each group yields at most
    /// one answer.
    ///
    /// Until a topology with nodes is known every seeded server is its own
    /// group. Afterwards there is one group per cluster, ordered primary first,
    /// so secondaries are only contacted when their primary does not answer.
    fn query_groups(&self) -> Vec<Vec<NodeAddress>> {
        let state = self.state.load();
        let per_cluster: Vec<Vec<NodeAddress>> = state
            .snapshot
            .as_ref()
            .map(|snapshot| {
                snapshot
                    .clusters()
                    .iter()
                    .map(|cluster| cluster.metadata_servers())
                    .filter(|servers| !servers.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if per_cluster.is_empty() {
            self.metadata_servers()
                .into_iter()
                .map(|server| vec![server])
                .collect()
        } else {
            per_cluster
        }
    }

    async fn query_group(&self, group: Vec<NodeAddress>) -> GroupResult {
        let mut result = GroupResult {
            queried: Vec::with_capacity(group.len()),
            failed: Vec::new(),
            answer: None,
        };

        for server in group {
            result.queried.push(server.clone());
            match self.fetch(&server).await {
                Ok(snapshot) => {
                    self.health.record_success(&server);
                    result.answer = Some((server, snapshot));
                    break;
                }
                Err(err) => {
                    let failures = self.health.record_failure(&server);
                    event!(
                        Level::DEBUG,
                        server = %server,
                        failures,
                        error = %err,
                        "Metadata server query failed"
                    );
                    result.failed.push(server);
                }
            }
        }

        result
    }

    async fn fetch(&self, server: &NodeAddress) -> Result<MetadataSnapshot> {
        let snapshot = timeout(self.config.connect_timeout, self.source().fetch_metadata(server))
            .await
            .map_err(|_| RouterError::MetadataUnreachable {
                server: server.to_string(),
                reason: format!("timed out after {:?}", self.config.connect_timeout),
            })??;

        snapshot.validate().map_err(|err| RouterError::InvalidMetadata {
            server: server.to_string(),
            reason: err.to_string(),
        })?;
        Ok(snapshot)
    }

    /// Reports liveness to the primary node of the primary cluster.
    async fn check_in(&self) {
        let state = self.state.load_full();
        if state.availability == TargetAvailability::IdentityMismatch {
            return;
        }
        let Some(primary) = state
            .snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.primary_cluster())
            .and_then(|cluster| cluster.primary_node())
            .map(|node| node.address.clone())
        else {
            return;
        };

        let router_id = self.config.router_id;
        match timeout(
            self.config.connect_timeout,
            self.source().update_router_check_in(&primary, router_id),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                event!(Level::DEBUG, server = %primary, error = %err, "Router check-in failed");
            }
            Err(_) => {
                event!(Level::DEBUG, server = %primary, "Router check-in timed out");
            }
        }
    }

    /// Starts refreshing the metadata every TTL until the worker is stopped.
    pub fn spawn_refresh_loop(self: &Arc<Self>) -> RefreshWorker {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join_handle = tokio::spawn(run_refresh_loop(Arc::clone(self), stop_rx));

        RefreshWorker {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }
}

async fn run_refresh_loop(router: Arc<ClusterSetRouter>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = interval(router.config.ttl);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                router.refresh_once().await;
            }
        }
    }

    event!(Level::DEBUG, "Metadata refresh loop stopped");
}

/// Background metadata refresh task.
pub struct RefreshWorker {
    stop_tx: Option<watch::Sender<bool>>,
    join_handle: Option<JoinHandle<()>>,
}

impl RefreshWorker {
    /// Signals the worker to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| RouterError::TaskError(format!("refresh worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for RefreshWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}
