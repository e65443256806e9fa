//! Configuration loading and management
//!
//! ```yaml
//! bind: 127.0.0.1:8237
//! store:
//!   backend: sql
//!   url: sqlite://pipelines.db
//!   max_connections: 5
//! auth:
//!   accounts:
//!     default: secret
//!   api_keys: [ci-key]
//!   token_ttl_secs: 3600
//! ```

use crate::core::store::ResourceStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "rest")]
use crate::storage::Credentials;

/// Which backend to open, and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    #[cfg(feature = "sqlite")]
    Sql(SqlStoreConfig),
    #[cfg(feature = "rest")]
    Rest(RestStoreConfig),
}

#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStoreConfig {
    /// e.g. `sqlite://pipelines.db` or `sqlite::memory:`
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[cfg(feature = "rest")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestStoreConfig {
    /// Server root, without the `/api/v1` prefix
    pub url: String,

    pub credentials: Credentials,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Accounts and API keys accepted by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// username -> password
    #[serde(default)]
    pub accounts: BTreeMap<String, String>,

    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Lifetime of issued bearer tokens
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            api_keys: Vec::new(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

/// Configuration of the server binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    pub store: StoreConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_max_connections() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_token_ttl_secs() -> u64 {
    3600
}

fn default_bind() -> String {
    "127.0.0.1:8237".to_string()
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}

impl StoreConfig {
    /// Load a bare store configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}

/// Open the configured backend
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn ResourceStore>> {
    let store: Arc<dyn ResourceStore> = match config {
        #[cfg(feature = "sqlite")]
        StoreConfig::Sql(sql) => {
            Arc::new(crate::storage::SqlStore::open(&sql.url, sql.max_connections).await?)
        }
        #[cfg(feature = "rest")]
        StoreConfig::Rest(rest) => Arc::new(crate::storage::RestStore::new(
            rest.url.clone(),
            rest.credentials.clone(),
            std::time::Duration::from_secs(rest.timeout_secs),
        )?),
    };
    tracing::info!(backend = store.backend(), "Connected store");
    Ok(store)
}
