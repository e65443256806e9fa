//! HTTP exposure of a resource store
//!
//! The router serves the same contract [`RestStore`](crate::storage::RestStore)
//! consumes, so any backend can be put behind it:
//!
//! - `GET /health`
//! - `POST /api/v1/login` (form `grant_type`, `username`, `password`)
//! - `GET|POST /api/v1/{resources}` list with filter query parameters, create
//! - `GET|PUT|DELETE /api/v1/{resources}/{id}`
//! - `POST /api/v1/runs/get-or-create`
//!
//! Every `/api/v1` route but login requires `Authorization: Bearer <token>`.

pub mod auth;
pub mod builder;
pub mod handlers;

pub use auth::{LoginForm, TokenAuthority};
pub use builder::ServerBuilder;
pub use handlers::Endpoint;

use crate::core::store::ResourceStore;
use crate::entities::{
    ComponentResponse, FlavorResponse, PipelineResponse, RoleAssignmentResponse, RoleResponse,
    RunResponse, StackResponse, UserResponse, WorkspaceResponse,
};
use axum::routing::{get, post};
use axum::{Json, Router, extract::State, middleware};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub auth: Arc<TokenAuthority>,
}

impl AppState {
    pub fn new(store: Arc<dyn ResourceStore>, auth: Arc<TokenAuthority>) -> Self {
        Self { store, auth }
    }
}

/// Build the full router for `state`
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(handlers::resource_routes::<WorkspaceResponse>())
        .merge(handlers::resource_routes::<UserResponse>())
        .merge(handlers::resource_routes::<RoleResponse>())
        .merge(handlers::resource_routes::<RoleAssignmentResponse>())
        .merge(handlers::resource_routes::<FlavorResponse>())
        .merge(handlers::resource_routes::<ComponentResponse>())
        .merge(handlers::resource_routes::<StackResponse>())
        .merge(handlers::resource_routes::<PipelineResponse>())
        .merge(handlers::resource_routes::<RunResponse>())
        .route("/api/v1/runs/get-or-create", post(handlers::get_or_create_run))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_token,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/login", post(auth::login))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "pipeline-store",
        "backend": state.store.backend(),
    }))
}
