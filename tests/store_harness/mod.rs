//! Shared test harness for store backend testing
//!
//! Provides fixtures (default workspace lookup, component and stack builders),
//! filter helpers and a server spawner so the same contract suite can run
//! against the SQL store directly and against the REST store proxying to it.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod store_harness;
//! use store_harness::*;
//!
//! store_contract_tests!(SqlStore::in_memory().await.unwrap());
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod contract_tests;

use pipeline_store::core::filter::FilterDescriptor;
use pipeline_store::core::resource::Resource;
use pipeline_store::core::store::*;
use pipeline_store::entities::*;
use pipeline_store::server::{AppState, TokenAuthority, router};
use pipeline_store::storage::{Credentials, DEFAULT_TIMEOUT, RestStore, SqlStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const TEST_USERNAME: &str = "default";
pub const TEST_PASSWORD: &str = "secret";
pub const TEST_API_KEY: &str = "test-api-key";

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Serve `store` on an ephemeral local port, returning the base URL
pub async fn spawn_server(store: Arc<dyn ResourceStore>, auth: Arc<TokenAuthority>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState::new(store, auth));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn test_authority() -> Arc<TokenAuthority> {
    Arc::new(
        TokenAuthority::new()
            .with_account(TEST_USERNAME, TEST_PASSWORD)
            .with_api_key(TEST_API_KEY),
    )
}

pub fn password_credentials() -> Credentials {
    Credentials::Password {
        username: TEST_USERNAME.into(),
        password: TEST_PASSWORD.into(),
    }
}

/// A REST store proxying to a fresh in-memory SQL store, plus the server's authority
pub async fn rest_store_with_authority() -> (RestStore, Arc<TokenAuthority>) {
    let backend: Arc<dyn ResourceStore> = Arc::new(SqlStore::in_memory().await.unwrap());
    let auth = test_authority();
    let url = spawn_server(backend, auth.clone()).await;
    let store = RestStore::new(url, password_credentials(), DEFAULT_TIMEOUT).unwrap();
    (store, auth)
}

pub async fn rest_store() -> RestStore {
    rest_store_with_authority().await.0
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Descriptor for `R` from query-style pairs
pub fn filter<R: Resource>(pairs: &[(&str, &str)]) -> FilterDescriptor {
    FilterDescriptor::from_query_pairs(R::filter_fields(), pairs.iter().copied()).unwrap()
}

pub fn all<R: Resource>() -> FilterDescriptor {
    FilterDescriptor::all(R::filter_fields()).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn default_workspace<S: ResourceStore + ?Sized>(store: &S) -> WorkspaceResponse {
    let page = store
        .list_workspaces(&filter::<WorkspaceResponse>(&[("name", DEFAULT_NAME)]))
        .await
        .unwrap();
    assert_eq!(page.total, 1, "the default workspace must exist");
    page.items.into_iter().next().unwrap()
}

pub async fn default_user<S: ResourceStore + ?Sized>(store: &S) -> UserResponse {
    let page = store
        .list_users(&filter::<UserResponse>(&[("name", DEFAULT_NAME)]))
        .await
        .unwrap();
    page.items.into_iter().next().unwrap()
}

pub async fn role_named<S: ResourceStore + ?Sized>(store: &S, name: &str) -> RoleResponse {
    let page = store
        .list_roles(&filter::<RoleResponse>(&[("name", name)]))
        .await
        .unwrap();
    page.items.into_iter().next().unwrap()
}

pub async fn new_workspace<S: ResourceStore + ?Sized>(store: &S, name: &str) -> WorkspaceResponse {
    store
        .create_workspace(WorkspaceRequest::new(name))
        .await
        .unwrap()
}

/// A component using the built-in `local` flavor of its type
pub async fn local_component<S: ResourceStore + ?Sized>(
    store: &S,
    workspace: Uuid,
    name: &str,
    component_type: ComponentType,
) -> ComponentResponse {
    store
        .create_component(ComponentRequest::new(name, component_type, "local", workspace))
        .await
        .unwrap()
}

/// A stack with a fresh orchestrator and artifact store
pub async fn new_stack<S: ResourceStore + ?Sized>(
    store: &S,
    workspace: Uuid,
    name: &str,
) -> StackResponse {
    let orchestrator = local_component(
        store,
        workspace,
        &format!("{}-orchestrator", name),
        ComponentType::Orchestrator,
    )
    .await;
    let artifact_store = local_component(
        store,
        workspace,
        &format!("{}-artifacts", name),
        ComponentType::ArtifactStore,
    )
    .await;
    store
        .create_stack(StackRequest::new(
            name,
            workspace,
            [
                (ComponentType::Orchestrator, orchestrator.id),
                (ComponentType::ArtifactStore, artifact_store.id),
            ],
        ))
        .await
        .unwrap()
}

pub async fn new_pipeline<S: ResourceStore + ?Sized>(
    store: &S,
    workspace: Uuid,
    name: &str,
) -> PipelineResponse {
    store
        .create_pipeline(PipelineRequest::new(name, "1", workspace))
        .await
        .unwrap()
}

pub fn names<R>(items: &[R], name: impl Fn(&R) -> &str) -> Vec<String> {
    items.iter().map(|item| name(item).to_string()).collect()
}

/// Names of the workspaces matching `pairs`, sorted
pub async fn workspace_names<S: ResourceStore + ?Sized>(
    store: &S,
    pairs: &[(&str, &str)],
) -> Vec<String> {
    let page = store
        .list_workspaces(&filter::<WorkspaceResponse>(pairs))
        .await
        .unwrap();
    let mut found = names(&page.items, |w| &w.name);
    found.sort();
    found
}
