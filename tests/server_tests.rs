//! HTTP-level tests of the router using `axum_test::TestServer`.
//!
//! These check the wire contract directly: status codes, bearer-token
//! enforcement, the `{code, message}` error body and the shape of the
//! paginated and get-or-create responses.

#![cfg(feature = "sqlite")]

#[macro_use]
mod store_harness;

use axum::http::StatusCode;
use axum_test::TestServer;
use pipeline_store::server::{AppState, ServerBuilder, router};
use pipeline_store::storage::SqlStore;
use serde_json::{Value, json};
use std::sync::Arc;
use store_harness::*;

async fn make_server() -> TestServer {
    let store = Arc::new(SqlStore::in_memory().await.unwrap());
    let app = router(AppState::new(store, test_authority()));
    TestServer::new(app).unwrap()
}

async fn login(server: &TestServer) -> String {
    let response = server
        .post("/api/v1/login")
        .form(&[
            ("grant_type", "password"),
            ("username", TEST_USERNAME),
            ("password", TEST_PASSWORD),
        ])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["token_type"], "bearer");
    body["access_token"].as_str().unwrap().to_string()
}

async fn default_workspace_id(server: &TestServer, token: &str) -> String {
    let response = server
        .get("/api/v1/workspaces")
        .add_query_param("name", "default")
        .authorization_bearer(token)
        .await;
    response.assert_status_ok();
    let page: Value = response.json();
    page["items"][0]["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Health and authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_needs_no_token() {
    let server = make_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "sql");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let server = make_server().await;

    let response = server.get("/api/v1/workspaces").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = server
        .get("/api/v1/workspaces")
        .authorization_bearer("made-up")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejections() {
    let server = make_server().await;

    let response = server
        .post("/api/v1/login")
        .form(&[
            ("grant_type", "password"),
            ("username", TEST_USERNAME),
            ("password", "wrong"),
        ])
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/v1/login")
        .form(&[("grant_type", "magic"), ("password", "x")])
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let response = server
        .post("/api/v1/login")
        .form(&[("grant_type", "api-key"), ("password", TEST_API_KEY)])
        .await;
    response.assert_status_ok();
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_returns_page_envelope() {
    let server = make_server().await;
    let token = login(&server).await;

    let response = server
        .get("/api/v1/workspaces")
        .add_query_param("size", "5")
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();
    let page: Value = response.json();
    assert_eq!(page["total"], 1);
    assert_eq!(page["total_pages"], 1);
    assert_eq!(page["index"], 1);
    assert_eq!(page["max_size"], 5);
    assert_eq!(page["items"][0]["name"], "default");
}

#[tokio::test]
async fn test_create_delete_status_codes() {
    let server = make_server().await;
    let token = login(&server).await;

    let response = server
        .post("/api/v1/workspaces")
        .authorization_bearer(&token)
        .json(&json!({"name": "research"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let id = created["id"].as_str().unwrap();
    assert_eq!(created["description"], "");

    let response = server
        .put(&format!("/api/v1/workspaces/{}", id))
        .authorization_bearer(&token)
        .json(&json!({"description": "models"}))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["description"], "models");

    let response = server
        .delete(&format!("/api/v1/workspaces/{}", id))
        .authorization_bearer(&token)
        .await;
    response.assert_status(StatusCode::NO_CONTENT);

    let response = server
        .get(&format!("/api/v1/workspaces/{}", id))
        .authorization_bearer(&token)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(body["message"].as_str().unwrap().contains(id));
}

#[tokio::test]
async fn test_domain_errors_map_to_statuses() {
    let server = make_server().await;
    let token = login(&server).await;
    let workspace = default_workspace_id(&server, &token).await;

    let response = server
        .post("/api/v1/workspaces")
        .authorization_bearer(&token)
        .json(&json!({"name": "default"}))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "ALREADY_EXISTS");

    let response = server
        .delete(&format!("/api/v1/workspaces/{}", workspace))
        .authorization_bearer(&token)
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], "ILLEGAL_OPERATION");

    let response = server
        .get("/api/v1/workspaces")
        .add_query_param("size", "0")
        .authorization_bearer(&token)
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "INVALID_ARGUMENT");

    let response = server
        .get("/api/v1/stacks")
        .add_query_param("colour", "blue")
        .authorization_bearer(&token)
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_role_assignments_cannot_be_updated() {
    let server = make_server().await;
    let token = login(&server).await;

    let response = server
        .get("/api/v1/role_assignments")
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();
    let page: Value = response.json();
    let id = page["items"][0]["id"].as_str().unwrap().to_string();

    let response = server
        .put(&format!("/api/v1/role_assignments/{}", id))
        .authorization_bearer(&token)
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_get_or_create_run_shape() {
    let server = make_server().await;
    let token = login(&server).await;
    let workspace = default_workspace_id(&server, &token).await;
    let request = json!({"name": "nightly-1", "workspace": workspace});

    let response = server
        .post("/api/v1/runs/get-or-create")
        .authorization_bearer(&token)
        .json(&request)
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body[0]["name"], "nightly-1");
    assert_eq!(body[0]["status"], "initializing");
    assert_eq!(body[1], true);

    let response = server
        .post("/api/v1/runs/get-or-create")
        .authorization_bearer(&token)
        .json(&request)
        .await;
    response.assert_status_ok();
    let again: Value = response.json();
    assert_eq!(again[0]["id"], body[0]["id"]);
    assert_eq!(again[1], false);
}

#[tokio::test]
async fn test_builder_router_serves_the_same_api() {
    let store = Arc::new(SqlStore::in_memory().await.unwrap());
    let app = ServerBuilder::new()
        .with_store(store)
        .with_auth(test_authority())
        .build()
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let token = login(&server).await;
    let response = server
        .get("/api/v1/flavors")
        .add_query_param("type", "orchestrator")
        .add_query_param("sort_by", "name")
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();
    let page: Value = response.json();
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][0]["name"], "local");
    assert_eq!(page["items"][1]["name"], "local_docker");
}
