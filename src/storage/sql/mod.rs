//! SQLite storage backend using sqlx.
//!
//! [`SqlStore`] implements every store trait over one `SqlitePool`. Each
//! public method runs in its own transaction; any early return drops the
//! transaction, which rolls it back. Writes start with `BEGIN IMMEDIATE` so
//! concurrent writers queue on the database lock (bounded by
//! [`BUSY_TIMEOUT`]) instead of failing on a lock upgrade.
//!
//! # Feature flag
//!
//! This module is gated behind the `sqlite` feature flag (on by default).
//!
//! # Schema
//!
//! One table per resource kind plus `stack_compositions` linking stacks to
//! their components. Ownership is expressed with foreign keys: deleting a
//! workspace cascades to everything scoped to it, deleting a user clears the
//! owner of the resources it owned. Dependents that must block a delete are
//! checked explicitly so the error can name them.
//!
//! # Bootstrap
//!
//! [`SqlStore::initialize`] migrates the schema (see [`migrations`]),
//! re-registers the built-in flavors when the schema revision changed and
//! makes sure the default user, roles, workspace, components and stack exist.

pub mod migrations;
pub mod query;
pub mod rows;

mod identity;
mod pipelines;
mod stacks;

use crate::core::error::{StoreError, StoreResult};
use crate::core::store::ResourceStore;
use crate::entities::{
    ADMIN_ROLE, ComponentRequest, ComponentType, DEFAULT_NAME, GUEST_ROLE, Permission,
    RoleAssignmentRequest, RoleRequest, StackRequest, UserRequest, WorkspaceRequest,
    builtin_flavors,
};
use crate::core::store::{ComponentStore, RoleStore, StackStore, UserStore, WorkspaceStore};
use migrations::{MigrationTool, SqliteMigrator};
use rows::{FlavorRow, now};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub use migrations::{BASELINE_REVISION, MIGRATIONS, Migration};
pub use query::CustomFetch;

/// How long a connection waits for another writer before reporting the database as locked
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Resource store backed by a SQLite database
///
/// # Example
///
/// ```rust,ignore
/// use pipeline_store::storage::SqlStore;
///
/// let store = SqlStore::open("sqlite://pipelines.db", 5).await?;
/// let workspace = store.create_workspace(WorkspaceRequest::new("research")).await?;
/// ```
#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
    migrator: Arc<dyn MigrationTool>,
}

impl std::fmt::Debug for SqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStore").field("pool", &self.pool).finish()
    }
}

impl SqlStore {
    /// Connect to `url`, creating the database file if needed, and initialize it
    pub async fn open(url: &str, max_connections: u32) -> StoreResult<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if in_memory {
            // Each connection would see its own private database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        tracing::info!(url, max_connections, "Opened SQL store");

        let store = Self::new(pool);
        store.initialize().await?;
        Ok(store)
    }

    /// Fresh, initialized in-memory store
    pub async fn in_memory() -> StoreResult<Self> {
        Self::open("sqlite::memory:", 1).await
    }

    /// Wrap an existing pool without initializing it
    pub fn new(pool: SqlitePool) -> Self {
        let migrator = Arc::new(SqliteMigrator::new(pool.clone()));
        Self::with_migrator(pool, migrator)
    }

    /// Wrap an existing pool with a specific migration engine
    pub fn with_migrator(pool: SqlitePool, migrator: Arc<dyn MigrationTool>) -> Self {
        Self { pool, migrator }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Transaction that takes the write lock before its first read
    pub(crate) async fn begin_write(&self) -> StoreResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Migrate the schema and create the built-in resources.
    ///
    /// Safe to call on every startup.
    pub async fn initialize(&self) -> StoreResult<()> {
        let changed = migrations::bootstrap(self.migrator.as_ref()).await?;
        if changed {
            self.register_builtin_flavors().await?;
        }
        self.ensure_defaults().await
    }

    /// Replace every built-in flavor with the current definitions
    async fn register_builtin_flavors(&self) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;

        let purged = sqlx::query("DELETE FROM flavors WHERE is_custom = 0")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut registered = 0;
        for request in builtin_flavors() {
            let taken: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM flavors WHERE name = ? AND type = ?")
                    .bind(&request.name)
                    .bind(request.component_type.as_str())
                    .fetch_one(&mut *tx)
                    .await?;
            if taken > 0 {
                tracing::warn!(
                    flavor = %request.name,
                    component_type = %request.component_type,
                    "Custom flavor shadows a built-in flavor, skipping"
                );
                continue;
            }

            let row = FlavorRow::from_request(&request, Uuid::new_v4(), now())?;
            stacks::insert_flavor(&mut tx, &row).await?;
            registered += 1;
        }

        tx.commit().await?;
        tracing::info!(purged, registered, "Registered built-in flavors");
        Ok(())
    }

    /// Create the default user, roles, workspace, components and stack if missing
    async fn ensure_defaults(&self) -> StoreResult<()> {
        let user = match self.find_id("users", DEFAULT_NAME, None).await? {
            Some(id) => id,
            None => self.create_user(UserRequest::new(DEFAULT_NAME)).await?.id,
        };

        let admin = match self.find_id("roles", ADMIN_ROLE, None).await? {
            Some(id) => id,
            None => {
                self.create_role(RoleRequest::new(
                    ADMIN_ROLE,
                    [Permission::Read, Permission::Write, Permission::Me],
                ))
                .await?
                .id
            }
        };
        if self.find_id("roles", GUEST_ROLE, None).await?.is_none() {
            self.create_role(RoleRequest::new(GUEST_ROLE, [Permission::Read, Permission::Me]))
                .await?;
        }

        let workspace = match self.find_id("workspaces", DEFAULT_NAME, None).await? {
            Some(id) => id,
            None => {
                let workspace = self
                    .create_workspace(WorkspaceRequest::new(DEFAULT_NAME))
                    .await?;
                self.create_role_assignment(RoleAssignmentRequest {
                    role: admin,
                    user,
                    workspace: workspace.id,
                })
                .await?;
                workspace.id
            }
        };

        if self.find_id("stacks", DEFAULT_NAME, Some(&workspace)).await?.is_some() {
            return Ok(());
        }

        let mut components = Vec::new();
        for component_type in [ComponentType::Orchestrator, ComponentType::ArtifactStore] {
            let id = match self
                .find_component(DEFAULT_NAME, component_type, &workspace)
                .await?
            {
                Some(id) => id,
                None => {
                    let mut request =
                        ComponentRequest::new(DEFAULT_NAME, component_type, "local", workspace);
                    request.user = Some(user);
                    self.create_component(request).await?.id
                }
            };
            components.push((component_type, id));
        }

        let mut stack = StackRequest::new(DEFAULT_NAME, workspace, components);
        stack.user = Some(user);
        self.create_stack(stack).await?;

        tracing::info!(%workspace, "Created default stack");
        Ok(())
    }

    async fn find_id(
        &self,
        table: &str,
        name: &str,
        workspace: Option<&Uuid>,
    ) -> StoreResult<Option<Uuid>> {
        let sql = match workspace {
            Some(_) => format!("SELECT id FROM {} WHERE name = ? AND workspace_id = ? LIMIT 1", table),
            None => format!("SELECT id FROM {} WHERE name = ? LIMIT 1", table),
        };
        let mut query = sqlx::query_scalar::<_, String>(&sql).bind(name);
        if let Some(workspace) = workspace {
            query = query.bind(workspace.to_string());
        }
        let id = query.fetch_optional(&self.pool).await?;
        id.as_deref().map(rows::parse_uuid).transpose()
    }

    async fn find_component(
        &self,
        name: &str,
        component_type: ComponentType,
        workspace: &Uuid,
    ) -> StoreResult<Option<Uuid>> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM stack_components WHERE name = ? AND type = ? AND workspace_id = ? LIMIT 1",
        )
        .bind(name)
        .bind(component_type.as_str())
        .bind(workspace.to_string())
        .fetch_optional(&self.pool)
        .await?;
        id.as_deref().map(rows::parse_uuid).transpose()
    }
}

impl ResourceStore for SqlStore {
    fn backend(&self) -> &'static str {
        "sql"
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the resource areas
// ---------------------------------------------------------------------------

/// Load one row by id, `NotFound` naming the resource if absent
pub(crate) async fn fetch_row<R>(
    conn: &mut SqliteConnection,
    table: &str,
    resource: &str,
    id: &Uuid,
) -> StoreResult<R>
where
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    sqlx::query_as::<_, R>(&format!("SELECT * FROM {} WHERE id = ?", table))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found(resource, id))
}

/// `NotFound` unless a row with this id exists
pub(crate) async fn ensure_exists(
    conn: &mut SqliteConnection,
    table: &str,
    resource: &str,
    id: &Uuid,
) -> StoreResult<()> {
    let found: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE id = ?", table))
        .bind(id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    if found == 0 {
        return Err(StoreError::not_found(resource, id));
    }
    Ok(())
}

/// Delete one row by id, `NotFound` if nothing was deleted
pub(crate) async fn delete_row(
    conn: &mut SqliteConnection,
    table: &str,
    resource: &str,
    id: &Uuid,
) -> StoreResult<()> {
    let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(StoreError::not_found(resource, id));
    }
    Ok(())
}

/// Convert a unique-constraint violation into the domain conflict error
pub(crate) fn unique_violation(err: sqlx::Error, conflict: impl FnOnce() -> StoreError) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict(),
        _ => err.into(),
    }
}

/// Describe an optional owner for conflict messages
pub(crate) fn owner_scope(workspace: &Uuid, user: Option<&Uuid>) -> String {
    match user {
        Some(user) => format!("in workspace '{}' for user '{}'", workspace, user),
        None => format!("in workspace '{}' without an owner", workspace),
    }
}
