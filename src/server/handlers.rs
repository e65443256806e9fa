//! Generic CRUD handlers, one set per resource kind

use super::AppState;
use crate::core::error::{StoreError, StoreResult};
use crate::core::filter::FilterDescriptor;
use crate::core::page::Page;
use crate::core::resource::Resource;
use crate::core::store::{
    ComponentStore, FlavorStore, PipelineStore, ResourceStore, RoleStore, RunStore, StackStore,
    UserStore, WorkspaceStore,
};
use crate::entities::{
    ComponentRequest, ComponentResponse, ComponentUpdate, FlavorRequest, FlavorResponse,
    FlavorUpdate, PipelineRequest, PipelineResponse, PipelineUpdate, RoleAssignmentRequest,
    RoleAssignmentResponse, RoleRequest, RoleResponse, RoleUpdate, RunRequest, RunResponse,
    RunUpdate, StackRequest, StackResponse, StackUpdate, UserRequest, UserResponse, UserUpdate,
    WorkspaceRequest, WorkspaceResponse, WorkspaceUpdate,
};
use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::{DeserializeOwned, IgnoredAny};
use uuid::Uuid;

/// A resource kind served under `/api/v1/{resource_name}`
#[async_trait]
pub trait Endpoint: Resource {
    type Request: DeserializeOwned + Send + 'static;
    type Update: DeserializeOwned + Send + 'static;

    /// Whether `PUT /{id}` is routed
    const UPDATABLE: bool = true;

    async fn create(store: &dyn ResourceStore, request: Self::Request) -> StoreResult<Self>;

    async fn get(store: &dyn ResourceStore, id: &Uuid) -> StoreResult<Self>;

    async fn list(store: &dyn ResourceStore, filter: &FilterDescriptor) -> StoreResult<Page<Self>>;

    async fn update(store: &dyn ResourceStore, id: &Uuid, update: Self::Update) -> StoreResult<Self>;

    async fn delete(store: &dyn ResourceStore, id: &Uuid) -> StoreResult<()>;
}

macro_rules! impl_endpoint {
    ($resp:ty, $req:ty, $upd:ty, $create:ident, $get:ident, $list:ident, $update:ident, $delete:ident) => {
        #[async_trait]
        impl Endpoint for $resp {
            type Request = $req;
            type Update = $upd;

            async fn create(store: &dyn ResourceStore, request: $req) -> StoreResult<Self> {
                store.$create(request).await
            }

            async fn get(store: &dyn ResourceStore, id: &Uuid) -> StoreResult<Self> {
                store.$get(id).await
            }

            async fn list(
                store: &dyn ResourceStore,
                filter: &FilterDescriptor,
            ) -> StoreResult<Page<Self>> {
                store.$list(filter).await
            }

            async fn update(store: &dyn ResourceStore, id: &Uuid, update: $upd) -> StoreResult<Self> {
                store.$update(id, update).await
            }

            async fn delete(store: &dyn ResourceStore, id: &Uuid) -> StoreResult<()> {
                store.$delete(id).await
            }
        }
    };
}

impl_endpoint!(
    WorkspaceResponse, WorkspaceRequest, WorkspaceUpdate,
    create_workspace, get_workspace, list_workspaces, update_workspace, delete_workspace
);
impl_endpoint!(
    UserResponse, UserRequest, UserUpdate,
    create_user, get_user, list_users, update_user, delete_user
);
impl_endpoint!(
    RoleResponse, RoleRequest, RoleUpdate,
    create_role, get_role, list_roles, update_role, delete_role
);
impl_endpoint!(
    FlavorResponse, FlavorRequest, FlavorUpdate,
    create_flavor, get_flavor, list_flavors, update_flavor, delete_flavor
);
impl_endpoint!(
    ComponentResponse, ComponentRequest, ComponentUpdate,
    create_component, get_component, list_components, update_component, delete_component
);
impl_endpoint!(
    StackResponse, StackRequest, StackUpdate,
    create_stack, get_stack, list_stacks, update_stack, delete_stack
);
impl_endpoint!(
    PipelineResponse, PipelineRequest, PipelineUpdate,
    create_pipeline, get_pipeline, list_pipelines, update_pipeline, delete_pipeline
);
impl_endpoint!(
    RunResponse, RunRequest, RunUpdate,
    create_run, get_run, list_runs, update_run, delete_run
);

#[async_trait]
impl Endpoint for RoleAssignmentResponse {
    type Request = RoleAssignmentRequest;
    type Update = IgnoredAny;

    const UPDATABLE: bool = false;

    async fn create(store: &dyn ResourceStore, request: RoleAssignmentRequest) -> StoreResult<Self> {
        store.create_role_assignment(request).await
    }

    async fn get(store: &dyn ResourceStore, id: &Uuid) -> StoreResult<Self> {
        store.get_role_assignment(id).await
    }

    async fn list(store: &dyn ResourceStore, filter: &FilterDescriptor) -> StoreResult<Page<Self>> {
        store.list_role_assignments(filter).await
    }

    async fn update(_store: &dyn ResourceStore, _id: &Uuid, _update: IgnoredAny) -> StoreResult<Self> {
        Err(StoreError::IllegalOperation(
            "Role assignments cannot be updated".to_string(),
        ))
    }

    async fn delete(store: &dyn ResourceStore, id: &Uuid) -> StoreResult<()> {
        store.delete_role_assignment(id).await
    }
}

/// Collection and item routes for `E`
pub fn resource_routes<E: Endpoint>() -> Router<AppState> {
    let collection = format!("/api/v1/{}", E::resource_name());
    let item = format!("{}/{{id}}", collection);

    let mut item_routes = get(get_handler::<E>).delete(delete_handler::<E>);
    if E::UPDATABLE {
        item_routes = item_routes.put(update_handler::<E>);
    }

    Router::new()
        .route(&collection, get(list_handler::<E>).post(create_handler::<E>))
        .route(&item, item_routes)
}

async fn list_handler<E: Endpoint>(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Page<E>>, StoreError> {
    let filter = FilterDescriptor::from_query_pairs(E::filter_fields(), params)?;
    Ok(Json(E::list(state.store.as_ref(), &filter).await?))
}

async fn create_handler<E: Endpoint>(
    State(state): State<AppState>,
    Json(request): Json<E::Request>,
) -> Result<(StatusCode, Json<E>), StoreError> {
    let created = E::create(state.store.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_handler<E: Endpoint>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<E>, StoreError> {
    Ok(Json(E::get(state.store.as_ref(), &id).await?))
}

async fn update_handler<E: Endpoint>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<E::Update>,
) -> Result<Json<E>, StoreError> {
    Ok(Json(E::update(state.store.as_ref(), &id, update).await?))
}

async fn delete_handler<E: Endpoint>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StoreError> {
    E::delete(state.store.as_ref(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/runs/get-or-create`, answering `[run, was_created]`
pub async fn get_or_create_run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<(StatusCode, Json<(RunResponse, bool)>), StoreError> {
    let (run, created) = state.store.get_or_create_run(request).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json((run, created))))
}
