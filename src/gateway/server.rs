//! Gateway server

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use super::listener::{TlsConnectInfo, TlsListener};
use super::router::{AppState, create_router};
use crate::config::Config;
use crate::mtls::build_tls_config;
use crate::store::{InMemoryStore, Store};
use crate::{Error, Result};

/// Authentication gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Datastore
    store: Arc<dyn Store>,
}

impl Gateway {
    /// Create a new gateway, loading the datastore seed if one is configured
    ///
    /// # Errors
    ///
    /// Returns an error if the seed file cannot be loaded.
    pub fn new(config: Config) -> Result<Self> {
        let store = match &config.store.seed_file {
            Some(path) => InMemoryStore::from_seed_file(Path::new(path))?,
            None => InMemoryStore::new(),
        };
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Create a gateway around an existing datastore
    #[must_use]
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Self {
        Self { config, store }
    }

    /// Run the gateway until Ctrl+C / SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable, the TLS material
    /// cannot be loaded or the listener cannot be bound.
    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        // TLS material is loaded before binding so a bad CA directory stops startup.
        let acceptor = if self.config.tls.enabled {
            Some(TlsAcceptor::from(Arc::new(build_tls_config(
                &self.config.tls,
            )?)))
        } else {
            None
        };

        let tls_enabled = acceptor.is_some();
        let trust_unknown_cas = self.config.tls.trust_unknown_cas;
        let verify_certificate = self.config.verify_certificate;
        let scan_workers = self.config.revocation.scan_workers;

        let state = Arc::new(AppState::new(self.config, Arc::clone(&self.store))?);
        let auth_methods = state.registry.tags().join(", ");
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("AUTHN GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(%addr, tls = tls_enabled, "Listening");
        info!(
            verify_certificate,
            trust_unknown_cas,
            scan_workers,
            "Certificate checks"
        );
        info!(%auth_methods, "Auth methods available");
        if !verify_certificate {
            warn!("Certificate expiry and revocation checks are DISABLED");
        }
        info!("============================================================");

        let served = match acceptor {
            Some(acceptor) => {
                axum::serve(
                    TlsListener::new(listener, acceptor)?,
                    app.into_make_service_with_connect_info::<TlsConnectInfo>(),
                )
                .with_graceful_shutdown(shutdown_signal())
                .await
            }
            None => {
                warn!("TLS disabled - certificate authentication will always fail");
                axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<TlsConnectInfo>(),
                )
                .with_graceful_shutdown(shutdown_signal())
                .await
            }
        };
        served.map_err(|e| Error::Internal(e.to_string()))?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
}
