pub mod proxy;

pub use proxy::RouteListener;

use crate::core::{Result, RouteKind, RouterError};
use crate::router::ClusterSetRouter;
use std::sync::Arc;
use tokio::sync::watch;

impl ClusterSetRouter {
    /// Starts the configured route listeners and the metadata refresh loop,
    /// and runs them until `shutdown` fires.
    pub async fn serve(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        let binds = [
            (RouteKind::ReadWrite, self.config().rw_bind),
            (RouteKind::ReadOnly, self.config().ro_bind),
        ];

        let mut listeners = Vec::new();
        for (route, addr) in binds {
            if let Some(addr) = addr {
                listeners.push(RouteListener::bind(route, addr, Arc::clone(&self)).await?);
            }
        }
        if listeners.is_empty() {
            return Err(RouterError::ConfigError(
                "at least one of rw_bind and ro_bind is required".to_string(),
            ));
        }

        let worker = self.spawn_refresh_loop();
        let tasks: Vec<_> = listeners
            .into_iter()
            .map(|listener| tokio::spawn(listener.run(shutdown.clone())))
            .collect();

        let mut result = Ok(());
        for task in futures::future::join_all(tasks).await {
            match task {
                Ok(Ok(())) => {}
                Ok(Err(err)) => result = Err(err),
                Err(err) => result = Err(RouterError::TaskError(format!("listener join: {}", err))),
            }
        }

        worker.stop().await?;
        self.registry().close_all(|| {})?;
        result
    }
}
