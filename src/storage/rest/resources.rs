//! Store trait implementations for [`RestStore`]

use super::{RestStore, decode_pair};
use crate::core::error::StoreResult;
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
use reqwest::Method;
use uuid::Uuid;

/// Implement one store trait as plain CRUD calls on the resource's URL segment
macro_rules! rest_crud {
    (
        $store:ident, $resp:ty, $req:ty, $upd:ty,
        $create:ident, $get:ident, $list:ident, $update:ident, $delete:ident
    ) => {
        #[async_trait]
        impl $store for RestStore {
            async fn $create(&self, request: $req) -> StoreResult<$resp> {
                self.post_resource(<$resp>::resource_name(), &request).await
            }

            async fn $get(&self, id: &Uuid) -> StoreResult<$resp> {
                self.get_resource(<$resp>::resource_name(), id).await
            }

            async fn $list(&self, filter: &FilterDescriptor) -> StoreResult<Page<$resp>> {
                filter.ensure_for(<$resp>::filter_fields())?;
                self.list_resources(<$resp>::resource_name(), filter).await
            }

            async fn $update(&self, id: &Uuid, update: $upd) -> StoreResult<$resp> {
                self.put_resource(<$resp>::resource_name(), id, &update).await
            }

            async fn $delete(&self, id: &Uuid) -> StoreResult<()> {
                self.delete_resource(<$resp>::resource_name(), id).await
            }
        }
    };
}

rest_crud!(
    WorkspaceStore, WorkspaceResponse, WorkspaceRequest, WorkspaceUpdate,
    create_workspace, get_workspace, list_workspaces, update_workspace, delete_workspace
);

rest_crud!(
    UserStore, UserResponse, UserRequest, UserUpdate,
    create_user, get_user, list_users, update_user, delete_user
);

rest_crud!(
    FlavorStore, FlavorResponse, FlavorRequest, FlavorUpdate,
    create_flavor, get_flavor, list_flavors, update_flavor, delete_flavor
);

rest_crud!(
    ComponentStore, ComponentResponse, ComponentRequest, ComponentUpdate,
    create_component, get_component, list_components, update_component, delete_component
);

rest_crud!(
    StackStore, StackResponse, StackRequest, StackUpdate,
    create_stack, get_stack, list_stacks, update_stack, delete_stack
);

rest_crud!(
    PipelineStore, PipelineResponse, PipelineRequest, PipelineUpdate,
    create_pipeline, get_pipeline, list_pipelines, update_pipeline, delete_pipeline
);

#[async_trait]
impl RoleStore for RestStore {
    async fn create_role(&self, request: RoleRequest) -> StoreResult<RoleResponse> {
        self.post_resource(RoleResponse::resource_name(), &request).await
    }

    async fn get_role(&self, id: &Uuid) -> StoreResult<RoleResponse> {
        self.get_resource(RoleResponse::resource_name(), id).await
    }

    async fn list_roles(&self, filter: &FilterDescriptor) -> StoreResult<Page<RoleResponse>> {
        filter.ensure_for(RoleResponse::filter_fields())?;
        self.list_resources(RoleResponse::resource_name(), filter).await
    }

    async fn update_role(&self, id: &Uuid, update: RoleUpdate) -> StoreResult<RoleResponse> {
        self.put_resource(RoleResponse::resource_name(), id, &update).await
    }

    async fn delete_role(&self, id: &Uuid) -> StoreResult<()> {
        self.delete_resource(RoleResponse::resource_name(), id).await
    }

    async fn create_role_assignment(
        &self,
        request: RoleAssignmentRequest,
    ) -> StoreResult<RoleAssignmentResponse> {
        self.post_resource(RoleAssignmentResponse::resource_name(), &request)
            .await
    }

    async fn get_role_assignment(&self, id: &Uuid) -> StoreResult<RoleAssignmentResponse> {
        self.get_resource(RoleAssignmentResponse::resource_name(), id)
            .await
    }

    async fn list_role_assignments(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<RoleAssignmentResponse>> {
        filter.ensure_for(RoleAssignmentResponse::filter_fields())?;
        self.list_resources(RoleAssignmentResponse::resource_name(), filter)
            .await
    }

    async fn delete_role_assignment(&self, id: &Uuid) -> StoreResult<()> {
        self.delete_resource(RoleAssignmentResponse::resource_name(), id)
            .await
    }
}

#[async_trait]
impl RunStore for RestStore {
    async fn create_run(&self, request: RunRequest) -> StoreResult<RunResponse> {
        self.post_resource(RunResponse::resource_name(), &request).await
    }

    async fn get_run(&self, id: &Uuid) -> StoreResult<RunResponse> {
        self.get_resource(RunResponse::resource_name(), id).await
    }

    async fn list_runs(&self, filter: &FilterDescriptor) -> StoreResult<Page<RunResponse>> {
        filter.ensure_for(RunResponse::filter_fields())?;
        self.list_resources(RunResponse::resource_name(), filter).await
    }

    async fn update_run(&self, id: &Uuid, update: RunUpdate) -> StoreResult<RunResponse> {
        self.put_resource(RunResponse::resource_name(), id, &update).await
    }

    async fn delete_run(&self, id: &Uuid) -> StoreResult<()> {
        self.delete_resource(RunResponse::resource_name(), id).await
    }

    async fn get_or_create_run(&self, request: RunRequest) -> StoreResult<(RunResponse, bool)> {
        let body = serde_json::to_value(&request)?;
        let path = format!("{}/get-or-create", RunResponse::resource_name());
        let value = self.send(Method::POST, &path, &[], Some(&body)).await?;
        decode_pair(value)
    }
}

impl ResourceStore for RestStore {
    fn backend(&self) -> &'static str {
        "rest"
    }
}
