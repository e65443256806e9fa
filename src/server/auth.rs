//! Bearer-token authentication for the HTTP exposure

use super::AppState;
use crate::config::AuthConfig;
use crate::core::error::{StoreError, StoreResult};
use axum::extract::{Form, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Body of `POST /api/v1/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginForm {
    /// `password` or `api-key`
    pub grant_type: String,
    #[serde(default)]
    pub username: Option<String>,
    /// The password, or the API key for the `api-key` grant
    pub password: String,
}

/// Lifetime of an issued token unless configured otherwise
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Issues, checks and revokes access tokens
///
/// Accounts and API keys are fixed at construction. Tokens live in memory
/// until revoked or until they are older than the configured lifetime;
/// expired tokens are dropped whenever a new one is issued.
#[derive(Debug)]
pub struct TokenAuthority {
    accounts: HashMap<String, String>,
    api_keys: HashSet<String>,
    ttl: Duration,
    /// token -> issue time
    tokens: RwLock<HashMap<String, Instant>>,
}

impl Default for TokenAuthority {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            api_keys: HashSet::new(),
            ttl: DEFAULT_TOKEN_TTL,
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

impl TokenAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let mut authority = Self::new().with_token_ttl(Duration::from_secs(config.token_ttl_secs));
        for (username, password) in &config.accounts {
            authority = authority.with_account(username.clone(), password.clone());
        }
        for key in &config.api_keys {
            authority = authority.with_api_key(key.clone());
        }
        authority
    }

    pub fn with_account(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.accounts.insert(username.into(), password.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_keys.insert(key.into());
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Check the grant and issue a fresh token
    pub async fn login(&self, form: &LoginForm) -> StoreResult<String> {
        let accepted = match form.grant_type.as_str() {
            "password" => form
                .username
                .as_ref()
                .and_then(|username| self.accounts.get(username))
                .is_some_and(|password| *password == form.password),
            "api-key" => self.api_keys.contains(&form.password),
            other => {
                return Err(StoreError::InvalidArgument(format!(
                    "Unsupported grant type '{}': expected 'password' or 'api-key'",
                    other
                )));
            }
        };

        if !accepted {
            tracing::warn!(grant_type = %form.grant_type, "Rejected login");
            return Err(StoreError::Authorization("invalid credentials".to_string()));
        }
        Ok(self.issue().await)
    }

    /// Issue a token without checking any grant
    pub async fn issue(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut tokens = self.tokens.write().await;

        let before = tokens.len();
        tokens.retain(|_, issued| issued.elapsed() < self.ttl);
        if tokens.len() < before {
            tracing::debug!(expired = before - tokens.len(), "Dropped expired tokens");
        }

        tokens.insert(token.clone(), Instant::now());
        token
    }

    pub async fn is_valid(&self, token: &str) -> bool {
        self.tokens
            .read()
            .await
            .get(token)
            .is_some_and(|issued| issued.elapsed() < self.ttl)
    }

    /// Revoke one token, returning whether it was live
    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens
            .write()
            .await
            .remove(token)
            .is_some_and(|issued| issued.elapsed() < self.ttl)
    }

    pub async fn revoke_all(&self) {
        self.tokens.write().await.clear();
    }
}

/// `POST /api/v1/login`
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<serde_json::Value>, StoreError> {
    let token = state.auth.login(&form).await?;
    Ok(Json(serde_json::json!({
        "access_token": token,
        "token_type": "bearer",
    })))
}

/// Reject requests without a live bearer token
pub async fn require_token(
    State(auth): State<Arc<TokenAuthority>>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    let valid = match &token {
        Some(token) => auth.is_valid(token).await,
        None => false,
    };
    if !valid {
        return StoreError::Authorization("missing or invalid bearer token".to_string())
            .into_response();
    }
    next.run(request).await
}
