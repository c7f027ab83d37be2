//! HTTP API server
//!
//! Wires configuration, the object cache, the credential store and every
//! authenticator, authorizer and registry into one axum application.

mod filters;
mod router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub use filters::authenticate;
pub use router::{AppState, create_router};

use crate::cache::{self, CacheClient};
use crate::config::Config;
use crate::objects::{ObjectCache, Snapshot};
use crate::{Error, Result};

/// How often expired credential store entries are reaped.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// The API server
pub struct ApiServer {
    config: Config,
    cache: Arc<dyn CacheClient>,
    state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Build the server from `config`.
    ///
    /// Loads the object snapshot, waits for the cache to sync and connects
    /// the credential store.
    pub async fn new(config: Config, debug: bool) -> Result<Self> {
        config.validate()?;

        let kubernetes = config.kubernetes.clone().unwrap_or_default();
        let objects = Arc::new(ObjectCache::new());
        match &kubernetes.snapshot {
            Some(path) => {
                let snapshot = Snapshot::from_file(path).map_err(|e| {
                    Error::Config(format!("cannot load snapshot {}: {e}", path.display()))
                })?;
                objects.load(snapshot);
                info!(path = %path.display(), "Loaded object snapshot");
            }
            None => {
                warn!("No object snapshot configured, serving an empty cache");
                objects.load(Snapshot::default());
            }
        }
        objects.wait_for_sync(kubernetes.sync_timeout).await?;

        let cache = cache::new_cache_client(config.redis.as_ref(), debug).await?;
        let options = config.authentication_options();
        let state = Arc::new(AppState::new(objects, Arc::clone(&cache), &options));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            cache,
            state,
            shutdown_tx,
        })
    }

    /// Shared state handed to every handler.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// The application router.
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(self.state())
    }

    /// Run until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        cache::spawn_reaper(
            Arc::clone(&self.cache),
            REAP_INTERVAL,
            self.shutdown_tx.subscribe(),
        );

        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        info!("DevOps API server listening on http://{addr}");
        info!("  Resources v1alpha2: {addr}/kapis/resources.kubesphere.io/v1alpha2");
        info!("  Resources v1alpha3: {addr}/kapis/resources.kubesphere.io/v1alpha3");
        info!("  Token endpoint: {addr}/oauth/token");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.shutdown_tx.clone()))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
