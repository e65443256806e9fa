//! Store traits implemented by every backend
//!
//! One trait per resource area, and the umbrella [`ResourceStore`] that
//! callers hold as `Arc<dyn ResourceStore>`. Every backend must produce the
//! same outputs and the same [`StoreError`](crate::core::error::StoreError)
//! kinds for the same inputs.

use crate::core::error::StoreResult;
use crate::core::filter::FilterDescriptor;
use crate::core::page::Page;
use crate::entities::{
    ComponentRequest, ComponentResponse, ComponentUpdate, FlavorRequest, FlavorResponse,
    FlavorUpdate, PipelineRequest, PipelineResponse, PipelineUpdate, RoleAssignmentRequest,
    RoleAssignmentResponse, RoleRequest, RoleResponse, RoleUpdate, RunRequest, RunResponse,
    RunUpdate, StackRequest, StackResponse, StackUpdate, UserRequest, UserResponse, UserUpdate,
    WorkspaceRequest, WorkspaceResponse, WorkspaceUpdate,
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn create_workspace(&self, request: WorkspaceRequest) -> StoreResult<WorkspaceResponse>;

    async fn get_workspace(&self, id: &Uuid) -> StoreResult<WorkspaceResponse>;

    async fn list_workspaces(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<WorkspaceResponse>>;

    /// Fails with `IllegalOperation` when renaming the default workspace
    async fn update_workspace(
        &self,
        id: &Uuid,
        update: WorkspaceUpdate,
    ) -> StoreResult<WorkspaceResponse>;

    /// Deletes everything scoped to the workspace
    async fn delete_workspace(&self, id: &Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, request: UserRequest) -> StoreResult<UserResponse>;

    async fn get_user(&self, id: &Uuid) -> StoreResult<UserResponse>;

    async fn list_users(&self, filter: &FilterDescriptor) -> StoreResult<Page<UserResponse>>;

    async fn update_user(&self, id: &Uuid, update: UserUpdate) -> StoreResult<UserResponse>;

    /// Resources owned by the user are kept with their owner cleared
    async fn delete_user(&self, id: &Uuid) -> StoreResult<()>;
}

/// Roles and role assignments
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create_role(&self, request: RoleRequest) -> StoreResult<RoleResponse>;

    async fn get_role(&self, id: &Uuid) -> StoreResult<RoleResponse>;

    async fn list_roles(&self, filter: &FilterDescriptor) -> StoreResult<Page<RoleResponse>>;

    async fn update_role(&self, id: &Uuid, update: RoleUpdate) -> StoreResult<RoleResponse>;

    async fn delete_role(&self, id: &Uuid) -> StoreResult<()>;

    async fn create_role_assignment(
        &self,
        request: RoleAssignmentRequest,
    ) -> StoreResult<RoleAssignmentResponse>;

    async fn get_role_assignment(&self, id: &Uuid) -> StoreResult<RoleAssignmentResponse>;

    async fn list_role_assignments(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<RoleAssignmentResponse>>;

    async fn delete_role_assignment(&self, id: &Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait FlavorStore: Send + Sync {
    async fn create_flavor(&self, request: FlavorRequest) -> StoreResult<FlavorResponse>;

    async fn get_flavor(&self, id: &Uuid) -> StoreResult<FlavorResponse>;

    async fn list_flavors(&self, filter: &FilterDescriptor) -> StoreResult<Page<FlavorResponse>>;

    async fn update_flavor(&self, id: &Uuid, update: FlavorUpdate) -> StoreResult<FlavorResponse>;

    async fn delete_flavor(&self, id: &Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait ComponentStore: Send + Sync {
    async fn create_component(&self, request: ComponentRequest) -> StoreResult<ComponentResponse>;

    async fn get_component(&self, id: &Uuid) -> StoreResult<ComponentResponse>;

    async fn list_components(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<ComponentResponse>>;

    async fn update_component(
        &self,
        id: &Uuid,
        update: ComponentUpdate,
    ) -> StoreResult<ComponentResponse>;

    async fn delete_component(&self, id: &Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait StackStore: Send + Sync {
    async fn create_stack(&self, request: StackRequest) -> StoreResult<StackResponse>;

    async fn get_stack(&self, id: &Uuid) -> StoreResult<StackResponse>;

    /// Supports the derived `component_id` filter
    async fn list_stacks(&self, filter: &FilterDescriptor) -> StoreResult<Page<StackResponse>>;

    async fn update_stack(&self, id: &Uuid, update: StackUpdate) -> StoreResult<StackResponse>;

    async fn delete_stack(&self, id: &Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn create_pipeline(&self, request: PipelineRequest) -> StoreResult<PipelineResponse>;

    async fn get_pipeline(&self, id: &Uuid) -> StoreResult<PipelineResponse>;

    async fn list_pipelines(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<PipelineResponse>>;

    async fn update_pipeline(
        &self,
        id: &Uuid,
        update: PipelineUpdate,
    ) -> StoreResult<PipelineResponse>;

    /// Deletes the pipeline's runs as well
    async fn delete_pipeline(&self, id: &Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, request: RunRequest) -> StoreResult<RunResponse>;

    async fn get_run(&self, id: &Uuid) -> StoreResult<RunResponse>;

    async fn list_runs(&self, filter: &FilterDescriptor) -> StoreResult<Page<RunResponse>>;

    async fn update_run(&self, id: &Uuid, update: RunUpdate) -> StoreResult<RunResponse>;

    async fn delete_run(&self, id: &Uuid) -> StoreResult<()>;

    /// Create a run, or return the existing one if the request collides with it.
    ///
    /// Returns `(run, true)` when created. On a uniqueness conflict the run is
    /// looked up by the request's id (if any), then by name, and returned as
    /// `(run, false)`.
    async fn get_or_create_run(&self, request: RunRequest) -> StoreResult<(RunResponse, bool)>;
}

/// Everything a backend implements
pub trait ResourceStore:
    WorkspaceStore
    + UserStore
    + RoleStore
    + FlavorStore
    + ComponentStore
    + StackStore
    + PipelineStore
    + RunStore
    + Send
    + Sync
{
    /// Short backend name for logs (`"sql"`, `"rest"`)
    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // The umbrella trait must stay object safe
    #[allow(dead_code)]
    fn takes_dyn(store: Arc<dyn ResourceStore>) -> Arc<dyn ResourceStore> {
        store
    }

    #[allow(dead_code)]
    async fn generic_get<S: StackStore + ?Sized>(store: &S, id: &Uuid) -> StoreResult<StackResponse> {
        store.get_stack(id).await
    }

    #[test]
    fn test_traits_compile() {}
}
