//! REST proxy storage backend using reqwest.
//!
//! [`RestStore`] implements every store trait by calling a remote server that
//! exposes the `/api/v1` contract (see [`crate::server`]). It shares one
//! `reqwest::Client` across calls and caches the access token.
//!
//! # Feature flag
//!
//! This module is gated behind the `rest` feature flag (on by default).
//!
//! # Session
//!
//! The session starts `Unauthenticated`. The first call logs in (the session
//! lock is held while authenticating, so concurrent callers wait for a single
//! login) and caches the token. A `401` response resets the session and the
//! request is retried exactly once with a fresh token; a second `401` is
//! returned as [`StoreError::Authorization`].

mod resources;

use crate::core::error::{StoreError, StoreResult};
use crate::core::filter::FilterDescriptor;
use crate::core::page::Page;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the store authenticates against the remote server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Exchange a username and password for a token
    Password { username: String, password: String },
    /// Exchange an API key for a token
    ApiKey { key: String },
    /// Use a pre-issued token as is
    Token { token: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Resource store proxying every call to a remote server
///
/// # Example
///
/// ```rust,ignore
/// use pipeline_store::storage::{Credentials, RestStore};
///
/// let store = RestStore::new(
///     "http://localhost:8237",
///     Credentials::Password { username: "default".into(), password: "secret".into() },
///     DEFAULT_TIMEOUT,
/// )?;
/// let stacks = store.list_stacks(&FilterDescriptor::all(&STACK_FIELDS)?).await?;
/// ```
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    credentials: Credentials,
    session: Arc<Mutex<SessionState>>,
}

impl RestStore {
    /// Build a store for `base_url`. No request is sent until the first call.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let mut base_url = base_url.into();
        let trimmed = base_url.trim_end_matches('/').len();
        base_url.truncate(trimmed);

        Ok(Self {
            client,
            base_url,
            credentials,
            session: Arc::new(Mutex::new(SessionState::Unauthenticated)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a token is currently cached
    pub async fn is_authenticated(&self) -> bool {
        matches!(*self.session.lock().await, SessionState::Authenticated(_))
    }

    /// Drop the cached token; the next call authenticates again
    pub async fn reset_session(&self) {
        *self.session.lock().await = SessionState::Unauthenticated;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn token(&self) -> StoreResult<String> {
        let mut session = self.session.lock().await;
        if let SessionState::Authenticated(token) = &*session {
            return Ok(token.clone());
        }

        let token = self.authenticate().await?;
        *session = SessionState::Authenticated(token.clone());
        Ok(token)
    }

    async fn authenticate(&self) -> StoreResult<String> {
        let form: Vec<(&str, &str)> = match &self.credentials {
            Credentials::Token { token } => return Ok(token.clone()),
            Credentials::Password { username, password } => vec![
                ("grant_type", "password"),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ],
            Credentials::ApiKey { key } => {
                vec![("grant_type", "api-key"), ("password", key.as_str())]
            }
        };

        let response = self.client.post(self.url("login")).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::from_response(status.as_u16(), &body));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            StoreError::Transport(format!("failed to decode login response: {}", e))
        })?;
        tracing::debug!(url = %self.base_url, "Authenticated against remote store");
        Ok(token.access_token)
    }

    /// Send one request, re-authenticating once on `401`
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> StoreResult<Value> {
        let mut retried = false;
        loop {
            let token = self.token().await?;
            let mut request = self
                .client
                .request(method.clone(), self.url(path))
                .bearer_auth(&token)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                tracing::warn!(%method, path, "Token rejected by remote store, re-authenticating");
                self.reset_session().await;
                retried = true;
                continue;
            }

            let text = response.text().await?;
            if !status.is_success() {
                return Err(StoreError::from_response(status.as_u16(), &text));
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| {
                StoreError::Transport(format!("failed to decode response from {}: {}", path, e))
            });
        }
    }

    async fn post_resource<Req, Resp>(&self, segment: &str, request: &Req) -> StoreResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_value(request)?;
        let value = self.send(Method::POST, segment, &[], Some(&body)).await?;
        decode(value)
    }

    async fn get_resource<Resp: DeserializeOwned>(&self, segment: &str, id: &Uuid) -> StoreResult<Resp> {
        let value = self
            .send(Method::GET, &format!("{}/{}", segment, id), &[], None)
            .await?;
        decode(value)
    }

    async fn list_resources<Resp: DeserializeOwned>(
        &self,
        segment: &str,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<Resp>> {
        let value = self
            .send(Method::GET, segment, &filter.to_query_pairs(), None)
            .await?;
        let page: Page<Value> = decode(value)?;
        page.try_map(decode)
    }

    async fn put_resource<Upd, Resp>(&self, segment: &str, id: &Uuid, update: &Upd) -> StoreResult<Resp>
    where
        Upd: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_value(update)?;
        let value = self
            .send(Method::PUT, &format!("{}/{}", segment, id), &[], Some(&body))
            .await?;
        decode(value)
    }

    async fn delete_resource(&self, segment: &str, id: &Uuid) -> StoreResult<()> {
        self.send(Method::DELETE, &format!("{}/{}", segment, id), &[], None)
            .await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> StoreResult<T> {
    serde_json::from_value(value)
        .map_err(|e| StoreError::Transport(format!("failed to decode response: {}", e)))
}

/// Split a get-or-create envelope `[resource, was_created]`
fn decode_pair<T: DeserializeOwned>(value: Value) -> StoreResult<(T, bool)> {
    match value {
        Value::Array(mut items) if items.len() == 2 => {
            let created = items.pop().and_then(|flag| flag.as_bool());
            let resource = items.pop();
            match (resource, created) {
                (Some(resource), Some(created)) => Ok((decode(resource)?, created)),
                _ => Err(StoreError::Internal(
                    "get-or-create response must be [resource, bool]".to_string(),
                )),
            }
        }
        other => Err(StoreError::Internal(format!(
            "get-or-create response must be a two-element array, got: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_is_trimmed() {
        let store = RestStore::new(
            "http://localhost:8237/",
            Credentials::Token { token: "t".into() },
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        assert_eq!(store.base_url(), "http://localhost:8237");
        assert_eq!(store.url("stacks"), "http://localhost:8237/api/v1/stacks");
    }

    #[test]
    fn test_credentials_yaml_shape() {
        let creds: Credentials =
            serde_yaml::from_str("type: password\nusername: default\npassword: secret\n").unwrap();
        assert_eq!(
            creds,
            Credentials::Password {
                username: "default".into(),
                password: "secret".into()
            }
        );
        let creds: Credentials = serde_yaml::from_str("type: api_key\nkey: abc\n").unwrap();
        assert_eq!(creds, Credentials::ApiKey { key: "abc".into() });
    }

    #[test]
    fn test_decode_pair_accepts_resource_and_flag() {
        let (value, created): (Value, bool) = decode_pair(json!([{"name": "run"}, true])).unwrap();
        assert_eq!(value["name"], "run");
        assert!(created);
    }

    #[test]
    fn test_decode_pair_rejects_other_shapes() {
        for bad in [json!({"name": "run"}), json!([{"name": "run"}]), json!([{}, "yes"])] {
            let err = decode_pair::<Value>(bad).unwrap_err();
            assert!(matches!(err, StoreError::Internal(_)), "got {:?}", err);
        }
    }

    #[tokio::test]
    async fn test_token_credentials_skip_login() {
        let store = RestStore::new(
            "http://127.0.0.1:9",
            Credentials::Token { token: "issued".into() },
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        assert!(!store.is_authenticated().await);
        assert_eq!(store.token().await.unwrap(), "issued");
        assert!(store.is_authenticated().await);
        store.reset_session().await;
        assert!(!store.is_authenticated().await);
    }
}
