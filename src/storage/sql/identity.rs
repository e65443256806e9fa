//! Workspaces, users, roles and role assignments

use super::query::paginate;
use super::rows::{RoleAssignmentRow, RoleRow, UserRow, WorkspaceRow, now};
use super::{SqlStore, delete_row, ensure_exists, fetch_row, unique_violation};
use crate::core::error::{StoreError, StoreResult};
use crate::core::filter::FilterDescriptor;
use crate::core::page::Page;
use crate::core::resource::Resource;
use crate::core::store::{RoleStore, UserStore, WorkspaceStore};
use crate::entities::{
    ADMIN_ROLE, DEFAULT_NAME, GUEST_ROLE, RoleAssignmentRequest, RoleAssignmentResponse,
    RoleRequest, RoleResponse, RoleUpdate, UserRequest, UserResponse, UserUpdate,
    WorkspaceRequest, WorkspaceResponse, WorkspaceUpdate,
};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use uuid::Uuid;
use validator::Validate;

async fn name_taken(conn: &mut SqliteConnection, table: &str, name: &str) -> StoreResult<bool> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE name = ?", table))
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

// ---------------------------------------------------------------------------
// Workspaces
// ---------------------------------------------------------------------------

fn workspace_conflict(name: &str) -> StoreError {
    StoreError::already_exists("workspace", name, "globally")
}

pub(crate) async fn insert_workspace(conn: &mut SqliteConnection, row: &WorkspaceRow) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO workspaces (id, created, updated, name, description) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(&row.created)
    .bind(&row.updated)
    .bind(&row.name)
    .bind(&row.description)
    .execute(&mut *conn)
    .await
    .map_err(|e| unique_violation(e, || workspace_conflict(&row.name)))?;
    Ok(())
}

#[async_trait]
impl WorkspaceStore for SqlStore {
    async fn create_workspace(&self, request: WorkspaceRequest) -> StoreResult<WorkspaceResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        if name_taken(&mut tx, "workspaces", &request.name).await? {
            return Err(workspace_conflict(&request.name));
        }

        let row = WorkspaceRow::from_request(&request, Uuid::new_v4(), now());
        insert_workspace(&mut tx, &row).await?;
        tx.commit().await?;

        tracing::debug!(workspace = %row.name, "Created workspace");
        row.into_response()
    }

    async fn get_workspace(&self, id: &Uuid) -> StoreResult<WorkspaceResponse> {
        let mut conn = self.pool.acquire().await?;
        fetch_row::<WorkspaceRow>(&mut conn, "workspaces", "workspace", id)
            .await?
            .into_response()
    }

    async fn list_workspaces(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<WorkspaceResponse>> {
        filter.ensure_for(WorkspaceResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;
        let page = paginate::<WorkspaceRow>(&mut tx, "workspaces", filter).await?;
        tx.commit().await?;
        page.try_map(WorkspaceRow::into_response)
    }

    async fn update_workspace(
        &self,
        id: &Uuid,
        update: WorkspaceUpdate,
    ) -> StoreResult<WorkspaceResponse> {
        update.validate()?;
        let mut tx = self.begin_write().await?;
        let mut row = fetch_row::<WorkspaceRow>(&mut tx, "workspaces", "workspace", id).await?;

        if let Some(name) = update.name.as_deref().filter(|name| *name != row.name) {
            if row.name == DEFAULT_NAME {
                return Err(StoreError::IllegalOperation(
                    "The default workspace cannot be renamed".to_string(),
                ));
            }
            if name_taken(&mut tx, "workspaces", name).await? {
                return Err(workspace_conflict(name));
            }
        }

        row.apply(update, now());
        sqlx::query("UPDATE workspaces SET name = ?, description = ?, updated = ? WHERE id = ?")
            .bind(&row.name)
            .bind(&row.description)
            .bind(&row.updated)
            .bind(&row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, || workspace_conflict(&row.name)))?;
        tx.commit().await?;

        row.into_response()
    }

    async fn delete_workspace(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let row = fetch_row::<WorkspaceRow>(&mut tx, "workspaces", "workspace", id).await?;
        if row.name == DEFAULT_NAME {
            return Err(StoreError::IllegalOperation(
                "The default workspace cannot be deleted".to_string(),
            ));
        }

        delete_row(&mut tx, "workspaces", "workspace", id).await?;
        tx.commit().await?;

        tracing::debug!(workspace = %row.name, "Deleted workspace");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

fn user_conflict(name: &str) -> StoreError {
    StoreError::already_exists("user", name, "globally")
}

#[async_trait]
impl UserStore for SqlStore {
    async fn create_user(&self, request: UserRequest) -> StoreResult<UserResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        if name_taken(&mut tx, "users", &request.name).await? {
            return Err(user_conflict(&request.name));
        }

        let row = UserRow::from_request(&request, Uuid::new_v4(), now());
        sqlx::query(
            "INSERT INTO users (id, created, updated, name, full_name, email, active) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.created)
        .bind(&row.updated)
        .bind(&row.name)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(row.active)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || user_conflict(&row.name)))?;
        tx.commit().await?;

        tracing::debug!(user = %row.name, "Created user");
        row.into_response()
    }

    async fn get_user(&self, id: &Uuid) -> StoreResult<UserResponse> {
        let mut conn = self.pool.acquire().await?;
        fetch_row::<UserRow>(&mut conn, "users", "user", id)
            .await?
            .into_response()
    }

    async fn list_users(&self, filter: &FilterDescriptor) -> StoreResult<Page<UserResponse>> {
        filter.ensure_for(UserResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;
        let page = paginate::<UserRow>(&mut tx, "users", filter).await?;
        tx.commit().await?;
        page.try_map(UserRow::into_response)
    }

    async fn update_user(&self, id: &Uuid, update: UserUpdate) -> StoreResult<UserResponse> {
        update.validate()?;
        let mut tx = self.begin_write().await?;
        let mut row = fetch_row::<UserRow>(&mut tx, "users", "user", id).await?;

        if let Some(name) = update.name.as_deref().filter(|name| *name != row.name) {
            if row.name == DEFAULT_NAME {
                return Err(StoreError::IllegalOperation(
                    "The default user cannot be renamed".to_string(),
                ));
            }
            if name_taken(&mut tx, "users", name).await? {
                return Err(user_conflict(name));
            }
        }

        row.apply(update, now());
        sqlx::query(
            "UPDATE users SET name = ?, full_name = ?, email = ?, active = ?, updated = ? WHERE id = ?",
        )
        .bind(&row.name)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(row.active)
        .bind(&row.updated)
        .bind(&row.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || user_conflict(&row.name)))?;
        tx.commit().await?;

        row.into_response()
    }

    async fn delete_user(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let row = fetch_row::<UserRow>(&mut tx, "users", "user", id).await?;
        if row.name == DEFAULT_NAME {
            return Err(StoreError::IllegalOperation(
                "The default user cannot be deleted".to_string(),
            ));
        }

        // Owned resources become ownerless, which must not duplicate an ownerless name
        let (components, stacks) = ownerless_collisions(&mut tx, &row.id).await?;
        if components + stacks > 0 {
            return Err(StoreError::IllegalOperation(format!(
                "User '{}' cannot be deleted: {} stack component(s) and {} stack(s) it owns \
                 share a name with existing resources that have no owner",
                row.name, components, stacks
            )));
        }

        delete_row(&mut tx, "users", "user", id).await?;
        tx.commit().await?;

        tracing::debug!(user = %row.name, "Deleted user");
        Ok(())
    }
}

/// Count the user's components and stacks whose key matches an ownerless one
async fn ownerless_collisions(conn: &mut SqliteConnection, user: &str) -> StoreResult<(i64, i64)> {
    let components: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stack_components owned JOIN stack_components unowned \
         ON unowned.name = owned.name AND unowned.type = owned.type \
         AND unowned.workspace_id = owned.workspace_id AND unowned.user_id IS NULL \
         WHERE owned.user_id = ?",
    )
    .bind(user)
    .fetch_one(&mut *conn)
    .await?;

    let stacks: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stacks owned JOIN stacks unowned \
         ON unowned.name = owned.name AND unowned.workspace_id = owned.workspace_id \
         AND unowned.user_id IS NULL \
         WHERE owned.user_id = ?",
    )
    .bind(user)
    .fetch_one(&mut *conn)
    .await?;

    Ok((components, stacks))
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

fn role_conflict(name: &str) -> StoreError {
    StoreError::already_exists("role", name, "globally")
}

fn is_builtin_role(name: &str) -> bool {
    name == ADMIN_ROLE || name == GUEST_ROLE
}

fn assignment_conflict(request: &RoleAssignmentRequest) -> StoreError {
    StoreError::AlreadyExists(format!(
        "Unable to assign role '{}' to user '{}': the user already has this role in workspace '{}'",
        request.role, request.user, request.workspace
    ))
}

#[async_trait]
impl RoleStore for SqlStore {
    async fn create_role(&self, request: RoleRequest) -> StoreResult<RoleResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        if name_taken(&mut tx, "roles", &request.name).await? {
            return Err(role_conflict(&request.name));
        }

        let row = RoleRow::from_request(&request, Uuid::new_v4(), now())?;
        sqlx::query("INSERT INTO roles (id, created, updated, name, permissions) VALUES (?, ?, ?, ?, ?)")
            .bind(&row.id)
            .bind(&row.created)
            .bind(&row.updated)
            .bind(&row.name)
            .bind(&row.permissions)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, || role_conflict(&row.name)))?;
        tx.commit().await?;

        tracing::debug!(role = %row.name, "Created role");
        row.into_response()
    }

    async fn get_role(&self, id: &Uuid) -> StoreResult<RoleResponse> {
        let mut conn = self.pool.acquire().await?;
        fetch_row::<RoleRow>(&mut conn, "roles", "role", id)
            .await?
            .into_response()
    }

    async fn list_roles(&self, filter: &FilterDescriptor) -> StoreResult<Page<RoleResponse>> {
        filter.ensure_for(RoleResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;
        let page = paginate::<RoleRow>(&mut tx, "roles", filter).await?;
        tx.commit().await?;
        page.try_map(RoleRow::into_response)
    }

    async fn update_role(&self, id: &Uuid, update: RoleUpdate) -> StoreResult<RoleResponse> {
        update.validate()?;
        let mut tx = self.begin_write().await?;
        let mut row = fetch_row::<RoleRow>(&mut tx, "roles", "role", id).await?;

        if is_builtin_role(&row.name) {
            return Err(StoreError::IllegalOperation(format!(
                "The built-in role '{}' cannot be updated",
                row.name
            )));
        }
        if let Some(name) = update.name.as_deref().filter(|name| *name != row.name)
            && name_taken(&mut tx, "roles", name).await?
        {
            return Err(role_conflict(name));
        }

        row.apply(update, now())?;
        sqlx::query("UPDATE roles SET name = ?, permissions = ?, updated = ? WHERE id = ?")
            .bind(&row.name)
            .bind(&row.permissions)
            .bind(&row.updated)
            .bind(&row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, || role_conflict(&row.name)))?;
        tx.commit().await?;

        row.into_response()
    }

    async fn delete_role(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let row = fetch_row::<RoleRow>(&mut tx, "roles", "role", id).await?;

        if is_builtin_role(&row.name) {
            return Err(StoreError::IllegalOperation(format!(
                "The built-in role '{}' cannot be deleted",
                row.name
            )));
        }

        let assigned: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM role_assignments WHERE role_id = ?")
                .bind(&row.id)
                .fetch_one(&mut *tx)
                .await?;
        if assigned > 0 {
            return Err(StoreError::IllegalOperation(format!(
                "Role '{}' cannot be deleted: it is still assigned {} time(s)",
                row.name, assigned
            )));
        }

        delete_row(&mut tx, "roles", "role", id).await?;
        tx.commit().await?;

        tracing::debug!(role = %row.name, "Deleted role");
        Ok(())
    }

    async fn create_role_assignment(
        &self,
        request: RoleAssignmentRequest,
    ) -> StoreResult<RoleAssignmentResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        ensure_exists(&mut tx, "roles", "role", &request.role).await?;
        ensure_exists(&mut tx, "users", "user", &request.user).await?;
        ensure_exists(&mut tx, "workspaces", "workspace", &request.workspace).await?;

        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM role_assignments WHERE role_id = ? AND user_id = ? AND workspace_id = ?",
        )
        .bind(request.role.to_string())
        .bind(request.user.to_string())
        .bind(request.workspace.to_string())
        .fetch_one(&mut *tx)
        .await?;
        if taken > 0 {
            return Err(assignment_conflict(&request));
        }

        let row = RoleAssignmentRow::from_request(&request, Uuid::new_v4(), now());
        sqlx::query(
            "INSERT INTO role_assignments (id, created, updated, role_id, user_id, workspace_id) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.created)
        .bind(&row.updated)
        .bind(&row.role_id)
        .bind(&row.user_id)
        .bind(&row.workspace_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || assignment_conflict(&request)))?;
        tx.commit().await?;

        row.into_response()
    }

    async fn get_role_assignment(&self, id: &Uuid) -> StoreResult<RoleAssignmentResponse> {
        let mut conn = self.pool.acquire().await?;
        fetch_row::<RoleAssignmentRow>(&mut conn, "role_assignments", "role assignment", id)
            .await?
            .into_response()
    }

    async fn list_role_assignments(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<RoleAssignmentResponse>> {
        filter.ensure_for(RoleAssignmentResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;
        let page = paginate::<RoleAssignmentRow>(&mut tx, "role_assignments", filter).await?;
        tx.commit().await?;
        page.try_map(RoleAssignmentRow::into_response)
    }

    async fn delete_role_assignment(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        delete_row(&mut tx, "role_assignments", "role assignment", id).await?;
        tx.commit().await?;
        Ok(())
    }
}
