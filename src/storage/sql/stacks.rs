//! Flavors, stack components and stacks

use super::query::{CustomFetch, paginate, paginate_custom, push_predicate};
use super::rows::{CompositionRow, ComponentRow, FlavorRow, StackRow, format_timestamp, now};
use super::{SqlStore, delete_row, ensure_exists, fetch_row, owner_scope, unique_violation};
use crate::core::error::{StoreError, StoreResult};
use crate::core::filter::FilterDescriptor;
use crate::core::page::Page;
use crate::core::resource::Resource;
use crate::core::store::{ComponentStore, FlavorStore, StackStore};
use crate::entities::{
    ComponentRequest, ComponentResponse, ComponentType, ComponentUpdate, DEFAULT_NAME,
    FlavorRequest, FlavorResponse, FlavorUpdate, StackRequest, StackResponse, StackUpdate,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;
use validator::Validate;

// ---------------------------------------------------------------------------
// Flavors
// ---------------------------------------------------------------------------

fn flavor_conflict(name: &str, component_type: &str) -> StoreError {
    StoreError::already_exists(
        "flavor",
        name,
        format!("for component type '{}'", component_type),
    )
}

pub(crate) async fn insert_flavor(conn: &mut SqliteConnection, row: &FlavorRow) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO flavors (id, created, updated, name, type, source, integration, \
         config_schema, is_custom, user_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(&row.created)
    .bind(&row.updated)
    .bind(&row.name)
    .bind(&row.component_type)
    .bind(&row.source)
    .bind(&row.integration)
    .bind(&row.config_schema)
    .bind(row.is_custom)
    .bind(&row.user_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| unique_violation(e, || flavor_conflict(&row.name, &row.component_type)))?;
    Ok(())
}

#[async_trait]
impl FlavorStore for SqlStore {
    async fn create_flavor(&self, request: FlavorRequest) -> StoreResult<FlavorResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        if let Some(user) = &request.user {
            ensure_exists(&mut tx, "users", "user", user).await?;
        }

        let taken: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM flavors WHERE name = ? AND type = ?")
                .bind(&request.name)
                .bind(request.component_type.as_str())
                .fetch_one(&mut *tx)
                .await?;
        if taken > 0 {
            return Err(flavor_conflict(&request.name, request.component_type.as_str()));
        }

        let row = FlavorRow::from_request(&request, Uuid::new_v4(), now())?;
        insert_flavor(&mut tx, &row).await?;
        tx.commit().await?;

        tracing::debug!(flavor = %row.name, component_type = %row.component_type, "Created flavor");
        row.into_response()
    }

    async fn get_flavor(&self, id: &Uuid) -> StoreResult<FlavorResponse> {
        let mut conn = self.pool.acquire().await?;
        fetch_row::<FlavorRow>(&mut conn, "flavors", "flavor", id)
            .await?
            .into_response()
    }

    async fn list_flavors(&self, filter: &FilterDescriptor) -> StoreResult<Page<FlavorResponse>> {
        filter.ensure_for(FlavorResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;
        let page = paginate::<FlavorRow>(&mut tx, "flavors", filter).await?;
        tx.commit().await?;
        page.try_map(FlavorRow::into_response)
    }

    async fn update_flavor(&self, id: &Uuid, update: FlavorUpdate) -> StoreResult<FlavorResponse> {
        update.validate()?;
        let mut tx = self.begin_write().await?;
        let mut row = fetch_row::<FlavorRow>(&mut tx, "flavors", "flavor", id).await?;

        row.apply(update, now())?;
        sqlx::query(
            "UPDATE flavors SET source = ?, integration = ?, config_schema = ?, updated = ? WHERE id = ?",
        )
        .bind(&row.source)
        .bind(&row.integration)
        .bind(&row.config_schema)
        .bind(&row.updated)
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        row.into_response()
    }

    async fn delete_flavor(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let row = fetch_row::<FlavorRow>(&mut tx, "flavors", "flavor", id).await?;

        if !row.is_custom {
            return Err(StoreError::IllegalOperation(format!(
                "The built-in flavor '{}' for component type '{}' cannot be deleted",
                row.name, row.component_type
            )));
        }

        let used: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stack_components WHERE flavor = ? AND type = ?")
                .bind(&row.name)
                .bind(&row.component_type)
                .fetch_one(&mut *tx)
                .await?;
        if used > 0 {
            return Err(StoreError::IllegalOperation(format!(
                "Flavor '{}' cannot be deleted: it is in use by {} component(s)",
                row.name, used
            )));
        }

        delete_row(&mut tx, "flavors", "flavor", id).await?;
        tx.commit().await?;

        tracing::debug!(flavor = %row.name, "Deleted flavor");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stack components
// ---------------------------------------------------------------------------

fn component_conflict(name: &str, component_type: &str, workspace: &Uuid, user: Option<&Uuid>) -> StoreError {
    StoreError::AlreadyExists(format!(
        "Unable to register {} '{}': a component with this name and type already exists {}",
        component_type,
        name,
        owner_scope(workspace, user)
    ))
}

async fn component_taken(
    conn: &mut SqliteConnection,
    name: &str,
    component_type: &str,
    workspace: &Uuid,
    user: Option<&Uuid>,
) -> StoreResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stack_components \
         WHERE name = ? AND type = ? AND workspace_id = ? AND user_id IS ?",
    )
    .bind(name)
    .bind(component_type)
    .bind(workspace.to_string())
    .bind(user.map(|u| u.to_string()))
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

#[async_trait]
impl ComponentStore for SqlStore {
    async fn create_component(&self, request: ComponentRequest) -> StoreResult<ComponentResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        ensure_exists(&mut tx, "workspaces", "workspace", &request.workspace).await?;
        if let Some(user) = &request.user {
            ensure_exists(&mut tx, "users", "user", user).await?;
        }

        let component_type = request.component_type.as_str();
        let flavors: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM flavors WHERE name = ? AND type = ?")
                .bind(&request.flavor)
                .bind(component_type)
                .fetch_one(&mut *tx)
                .await?;
        if flavors == 0 {
            return Err(StoreError::NotFound(format!(
                "Unable to find flavor '{}' for component type '{}'",
                request.flavor, component_type
            )));
        }

        if component_taken(
            &mut tx,
            &request.name,
            component_type,
            &request.workspace,
            request.user.as_ref(),
        )
        .await?
        {
            return Err(component_conflict(
                &request.name,
                component_type,
                &request.workspace,
                request.user.as_ref(),
            ));
        }

        let row = ComponentRow::from_request(&request, Uuid::new_v4(), now())?;
        sqlx::query(
            "INSERT INTO stack_components (id, created, updated, name, type, flavor, configuration, \
             workspace_id, user_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.created)
        .bind(&row.updated)
        .bind(&row.name)
        .bind(&row.component_type)
        .bind(&row.flavor)
        .bind(&row.configuration)
        .bind(&row.workspace_id)
        .bind(&row.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                component_conflict(
                    &request.name,
                    component_type,
                    &request.workspace,
                    request.user.as_ref(),
                )
            })
        })?;
        tx.commit().await?;

        tracing::debug!(component = %row.name, component_type, "Created stack component");
        row.into_response()
    }

    async fn get_component(&self, id: &Uuid) -> StoreResult<ComponentResponse> {
        let mut conn = self.pool.acquire().await?;
        fetch_row::<ComponentRow>(&mut conn, "stack_components", "stack component", id)
            .await?
            .into_response()
    }

    async fn list_components(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<ComponentResponse>> {
        filter.ensure_for(ComponentResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;
        let page = paginate::<ComponentRow>(&mut tx, "stack_components", filter).await?;
        tx.commit().await?;
        page.try_map(ComponentRow::into_response)
    }

    async fn update_component(
        &self,
        id: &Uuid,
        update: ComponentUpdate,
    ) -> StoreResult<ComponentResponse> {
        update.validate()?;
        let mut tx = self.begin_write().await?;
        let mut row =
            fetch_row::<ComponentRow>(&mut tx, "stack_components", "stack component", id).await?;
        let current = row.clone().into_response()?;

        if let Some(name) = update.name.as_deref().filter(|name| *name != row.name) {
            if row.name == DEFAULT_NAME {
                return Err(StoreError::IllegalOperation(format!(
                    "The default {} cannot be renamed",
                    row.component_type
                )));
            }
            if component_taken(
                &mut tx,
                name,
                &row.component_type,
                &current.workspace,
                current.user.as_ref(),
            )
            .await?
            {
                return Err(component_conflict(
                    name,
                    &row.component_type,
                    &current.workspace,
                    current.user.as_ref(),
                ));
            }
        }

        row.apply(update, now())?;
        sqlx::query(
            "UPDATE stack_components SET name = ?, configuration = ?, updated = ? WHERE id = ?",
        )
        .bind(&row.name)
        .bind(&row.configuration)
        .bind(&row.updated)
        .bind(&row.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                component_conflict(
                    &row.name,
                    &row.component_type,
                    &current.workspace,
                    current.user.as_ref(),
                )
            })
        })?;
        tx.commit().await?;

        row.into_response()
    }

    async fn delete_component(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let row =
            fetch_row::<ComponentRow>(&mut tx, "stack_components", "stack component", id).await?;

        if row.name == DEFAULT_NAME {
            return Err(StoreError::IllegalOperation(format!(
                "The default {} cannot be deleted",
                row.component_type
            )));
        }

        let stacks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stack_compositions WHERE component_id = ?")
                .bind(&row.id)
                .fetch_one(&mut *tx)
                .await?;
        if stacks > 0 {
            return Err(StoreError::IllegalOperation(format!(
                "Stack component '{}' cannot be deleted: it is in use by {} stack(s)",
                row.name, stacks
            )));
        }

        delete_row(&mut tx, "stack_components", "stack component", id).await?;
        tx.commit().await?;

        tracing::debug!(component = %row.name, "Deleted stack component");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

/// Keeps stacks whose compositions match every derived `component_id` filter
struct CompositionFetch;

#[async_trait]
impl CustomFetch<StackRow> for CompositionFetch {
    async fn fetch(
        &self,
        conn: &mut SqliteConnection,
        rows: Vec<StackRow>,
        filter: &FilterDescriptor,
    ) -> StoreResult<Vec<StackRow>> {
        let mut keep: Option<HashSet<String>> = None;

        for derived in filter.derived_filters() {
            if derived.field.name != "component_id" {
                return Err(StoreError::InvalidArgument(format!(
                    "Field '{}' cannot be used to filter stacks",
                    derived.field.name
                )));
            }

            let mut qb =
                QueryBuilder::<Sqlite>::new("SELECT DISTINCT stack_id FROM stack_compositions WHERE ");
            push_predicate(&mut qb, "component_id", derived);
            let ids: HashSet<String> = qb
                .build_query_scalar::<String>()
                .fetch(&mut *conn)
                .try_collect()
                .await?;

            keep = Some(match keep {
                Some(previous) => previous.intersection(&ids).cloned().collect(),
                None => ids,
            });
        }

        Ok(match keep {
            Some(keep) => rows.into_iter().filter(|row| keep.contains(&row.id)).collect(),
            None => rows,
        })
    }
}

fn stack_conflict(name: &str, workspace: &Uuid, user: Option<&Uuid>) -> StoreError {
    StoreError::already_exists("stack", name, owner_scope(workspace, user))
}

async fn stack_taken(
    conn: &mut SqliteConnection,
    name: &str,
    workspace: &Uuid,
    user: Option<&Uuid>,
) -> StoreResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stacks WHERE name = ? AND workspace_id = ? AND user_id IS ?",
    )
    .bind(name)
    .bind(workspace.to_string())
    .bind(user.map(|u| u.to_string()))
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

/// Every component must exist, match its slot and live in the stack's workspace
async fn validate_components(
    conn: &mut SqliteConnection,
    workspace: &Uuid,
    components: &BTreeMap<ComponentType, Uuid>,
) -> StoreResult<()> {
    for required in [ComponentType::Orchestrator, ComponentType::ArtifactStore] {
        if !components.contains_key(&required) {
            return Err(StoreError::InvalidArgument(format!(
                "A stack must contain an {} component",
                required.as_str().replace('_', " ")
            )));
        }
    }

    for (slot, id) in components {
        let component = fetch_row::<ComponentRow>(conn, "stack_components", "stack component", id)
            .await?
            .into_response()?;
        if component.component_type != *slot {
            return Err(StoreError::InvalidArgument(format!(
                "Component '{}' is a {}, not a {}",
                component.name, component.component_type, slot
            )));
        }
        if component.workspace != *workspace {
            return Err(StoreError::InvalidArgument(format!(
                "Component '{}' belongs to workspace '{}', not to the stack's workspace '{}'",
                component.name, component.workspace, workspace
            )));
        }
    }
    Ok(())
}

async fn write_compositions(
    conn: &mut SqliteConnection,
    stack_id: &str,
    components: &BTreeMap<ComponentType, Uuid>,
) -> StoreResult<()> {
    sqlx::query("DELETE FROM stack_compositions WHERE stack_id = ?")
        .bind(stack_id)
        .execute(&mut *conn)
        .await?;
    for (slot, id) in components {
        sqlx::query(
            "INSERT INTO stack_compositions (stack_id, component_type, component_id) VALUES (?, ?, ?)",
        )
        .bind(stack_id)
        .bind(slot.as_str())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_compositions(
    conn: &mut SqliteConnection,
    stack_ids: &[&str],
) -> StoreResult<Vec<CompositionRow>> {
    if stack_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT stack_id, component_type, component_id FROM stack_compositions WHERE stack_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in stack_ids {
        ids.push_bind(id.to_string());
    }
    qb.push(")");
    Ok(qb.build_query_as::<CompositionRow>().fetch_all(&mut *conn).await?)
}

async fn load_stack(conn: &mut SqliteConnection, id: &Uuid) -> StoreResult<StackResponse> {
    let row = fetch_row::<StackRow>(conn, "stacks", "stack", id).await?;
    let compositions = load_compositions(conn, &[row.id.as_str()]).await?;
    row.into_response(&compositions)
}

#[async_trait]
impl StackStore for SqlStore {
    async fn create_stack(&self, request: StackRequest) -> StoreResult<StackResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        ensure_exists(&mut tx, "workspaces", "workspace", &request.workspace).await?;
        if let Some(user) = &request.user {
            ensure_exists(&mut tx, "users", "user", user).await?;
        }
        validate_components(&mut tx, &request.workspace, &request.components).await?;

        if stack_taken(&mut tx, &request.name, &request.workspace, request.user.as_ref()).await? {
            return Err(stack_conflict(
                &request.name,
                &request.workspace,
                request.user.as_ref(),
            ));
        }

        let id = Uuid::new_v4();
        let created = format_timestamp(&now());
        sqlx::query(
            "INSERT INTO stacks (id, created, updated, name, description, workspace_id, user_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&created)
        .bind(&created)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.workspace.to_string())
        .bind(request.user.map(|u| u.to_string()))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                stack_conflict(&request.name, &request.workspace, request.user.as_ref())
            })
        })?;
        write_compositions(&mut tx, &id.to_string(), &request.components).await?;

        let stack = load_stack(&mut tx, &id).await?;
        tx.commit().await?;

        tracing::debug!(stack = %stack.name, workspace = %stack.workspace, "Created stack");
        Ok(stack)
    }

    async fn get_stack(&self, id: &Uuid) -> StoreResult<StackResponse> {
        let mut conn = self.pool.acquire().await?;
        load_stack(&mut conn, id).await
    }

    async fn list_stacks(&self, filter: &FilterDescriptor) -> StoreResult<Page<StackResponse>> {
        filter.ensure_for(StackResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;

        let page = if filter.derived_filters().next().is_some() {
            paginate_custom::<StackRow>(&mut tx, "stacks", filter, &CompositionFetch).await?
        } else {
            paginate::<StackRow>(&mut tx, "stacks", filter).await?
        };

        let ids: Vec<&str> = page.items.iter().map(|row| row.id.as_str()).collect();
        let compositions = load_compositions(&mut tx, &ids).await?;
        tx.commit().await?;

        page.try_map(|row| row.into_response(&compositions))
    }

    async fn update_stack(&self, id: &Uuid, update: StackUpdate) -> StoreResult<StackResponse> {
        update.validate()?;
        let mut tx = self.begin_write().await?;
        let current = load_stack(&mut tx, id).await?;

        if current.name == DEFAULT_NAME {
            return Err(StoreError::IllegalOperation(
                "The default stack cannot be updated".to_string(),
            ));
        }

        let name = update.name.unwrap_or_else(|| current.name.clone());
        if name != current.name
            && stack_taken(&mut tx, &name, &current.workspace, current.user.as_ref()).await?
        {
            return Err(stack_conflict(&name, &current.workspace, current.user.as_ref()));
        }
        if let Some(components) = &update.components {
            validate_components(&mut tx, &current.workspace, components).await?;
            write_compositions(&mut tx, &id.to_string(), components).await?;
        }

        let description = update.description.unwrap_or_else(|| current.description.clone());
        sqlx::query("UPDATE stacks SET name = ?, description = ?, updated = ? WHERE id = ?")
            .bind(&name)
            .bind(&description)
            .bind(format_timestamp(&now()))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                unique_violation(e, || {
                    stack_conflict(&name, &current.workspace, current.user.as_ref())
                })
            })?;

        let stack = load_stack(&mut tx, id).await?;
        tx.commit().await?;
        Ok(stack)
    }

    async fn delete_stack(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let row = fetch_row::<StackRow>(&mut tx, "stacks", "stack", id).await?;

        if row.name == DEFAULT_NAME {
            return Err(StoreError::IllegalOperation(
                "The default stack cannot be deleted".to_string(),
            ));
        }

        delete_row(&mut tx, "stacks", "stack", id).await?;
        tx.commit().await?;

        tracing::debug!(stack = %row.name, "Deleted stack");
        Ok(())
    }
}
