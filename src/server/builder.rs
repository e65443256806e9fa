//! ServerBuilder for fluent API to build HTTP servers

use super::{AppState, TokenAuthority, router};
use crate::core::store::ResourceStore;
use anyhow::{Result, anyhow};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for the HTTP exposure of a store
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn ResourceStore> = Arc::new(SqlStore::in_memory().await?);
/// ServerBuilder::new()
///     .with_store(store)
///     .with_auth(Arc::new(TokenAuthority::new().with_account("default", "secret")))
///     .serve("127.0.0.1:8237")
///     .await?;
/// ```
#[derive(Default)]
pub struct ServerBuilder {
    store: Option<Arc<dyn ResourceStore>>,
    auth: Option<Arc<TokenAuthority>>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store to expose (required)
    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the token authority; without one no login succeeds
    pub fn with_auth(mut self, auth: Arc<TokenAuthority>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Build the handler state
    pub fn build_state(self) -> Result<AppState> {
        let store = self
            .store
            .ok_or_else(|| anyhow!("A store is required. Use .with_store()"))?;
        let auth = self.auth.unwrap_or_default();
        Ok(AppState::new(store, auth))
    }

    /// Build the router
    pub fn build(self) -> Result<Router> {
        Ok(router(self.build_state()?))
    }

    /// Serve until SIGTERM or Ctrl+C
    pub async fn serve(self, addr: &str) -> Result<()> {
        let state = self.build_state()?;
        let backend = state.store.backend();
        let app = router(state);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(addr, backend, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_store() {
        let err = ServerBuilder::new().build().unwrap_err();
        assert!(err.to_string().contains("with_store"));
    }
}
