//! Serve a resource store over HTTP
//!
//! Usage: `pipeline-store-server [config.yaml]`. Without a file the server
//! runs on an in-memory SQLite database with a `default`/`default` account.

use anyhow::Result;
use pipeline_store::config::{AuthConfig, ServerConfig, SqlStoreConfig, StoreConfig, connect};
use pipeline_store::server::{ServerBuilder, TokenAuthority};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_yaml_file(&path)?,
        None => {
            tracing::warn!("No configuration file given, using an in-memory store");
            ServerConfig {
                bind: "127.0.0.1:8237".to_string(),
                store: StoreConfig::Sql(SqlStoreConfig {
                    url: "sqlite::memory:".to_string(),
                    max_connections: 1,
                }),
                auth: AuthConfig {
                    accounts: [("default".to_string(), "default".to_string())].into(),
                    api_keys: Vec::new(),
                    ..AuthConfig::default()
                },
            }
        }
    };

    let store = connect(&config.store).await?;
    let auth = Arc::new(TokenAuthority::from_config(&config.auth));

    ServerBuilder::new()
        .with_store(store)
        .with_auth(auth)
        .serve(&config.bind)
        .await
}
