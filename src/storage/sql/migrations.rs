//! Schema migrations for the SQL store
//!
//! Migrations are embedded, ordered and identified by a revision string. The
//! `migration_history` table records which revisions a database has applied.
//! [`MigrationTool`] is the seam the store bootstraps through, so a different
//! migration engine can be plugged in without touching the store.

use crate::core::error::{StoreError, StoreResult};
use crate::storage::sql::rows::{format_timestamp, now};
use async_trait::async_trait;
use sqlx::{Connection, SqlitePool};

/// Baseline schema
const MIGRATION_0001_BASELINE: &str = r#"
CREATE TABLE workspaces (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE users (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL DEFAULT '',
    email TEXT,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE roles (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    permissions TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE role_assignments (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    role_id TEXT NOT NULL REFERENCES roles(id),
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    UNIQUE (role_id, user_id, workspace_id)
);

CREATE TABLE flavors (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    source TEXT NOT NULL,
    config_schema TEXT NOT NULL DEFAULT '{}',
    is_custom INTEGER NOT NULL DEFAULT 1,
    user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    UNIQUE (name, type)
);

CREATE TABLE stack_components (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    flavor TEXT NOT NULL,
    configuration TEXT NOT NULL DEFAULT '{}',
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    UNIQUE (name, type, workspace_id, user_id)
);

CREATE TABLE stacks (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    UNIQUE (name, workspace_id, user_id)
);

CREATE TABLE stack_compositions (
    stack_id TEXT NOT NULL REFERENCES stacks(id) ON DELETE CASCADE,
    component_type TEXT NOT NULL,
    component_id TEXT NOT NULL REFERENCES stack_components(id),
    PRIMARY KEY (stack_id, component_type)
);

CREATE TABLE pipelines (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    docstring TEXT,
    spec TEXT NOT NULL DEFAULT '{}',
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    UNIQUE (name, version, workspace_id)
);

CREATE TABLE pipeline_runs (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    pipeline_id TEXT REFERENCES pipelines(id) ON DELETE CASCADE,
    stack_id TEXT REFERENCES stacks(id) ON DELETE SET NULL,
    status TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT,
    config TEXT NOT NULL DEFAULT '{}',
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id TEXT REFERENCES users(id) ON DELETE SET NULL
);

CREATE INDEX ix_stack_compositions_component ON stack_compositions(component_id);
CREATE INDEX ix_stack_components_flavor ON stack_components(flavor, type);
CREATE INDEX ix_pipeline_runs_pipeline ON pipeline_runs(pipeline_id);
"#;

/// Flavors record which integration ships them
const MIGRATION_0002_FLAVOR_INTEGRATION: &str = r#"
ALTER TABLE flavors ADD COLUMN integration TEXT NOT NULL DEFAULT '';
"#;

/// Runs record how many steps they have
const MIGRATION_0003_RUN_STEPS: &str = r#"
ALTER TABLE pipeline_runs ADD COLUMN num_steps INTEGER;
"#;

/// One embedded schema change
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub revision: &'static str,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Every migration, in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        revision: "0001",
        description: "baseline schema",
        sql: MIGRATION_0001_BASELINE,
    },
    Migration {
        revision: "0002",
        description: "flavor integration",
        sql: MIGRATION_0002_FLAVOR_INTEGRATION,
    },
    Migration {
        revision: "0003",
        description: "run step count",
        sql: MIGRATION_0003_RUN_STEPS,
    },
];

/// Revision a pre-existing, untracked schema is assumed to be at
pub const BASELINE_REVISION: &str = "0001";

const HISTORY_TABLE: &str = "CREATE TABLE IF NOT EXISTS migration_history (
    revision TEXT PRIMARY KEY NOT NULL,
    applied_at TEXT NOT NULL
)";

/// Engine that moves a database schema between revisions
#[async_trait]
pub trait MigrationTool: Send + Sync {
    /// Whether the database holds no schema tables, ignoring migration bookkeeping
    async fn db_is_empty(&self) -> StoreResult<bool>;

    /// Applied revisions, in order; empty when nothing is tracked
    async fn current_revisions(&self) -> StoreResult<Vec<String>>;

    /// Record `revision` and every earlier one as applied without running them
    async fn stamp(&self, revision: &str) -> StoreResult<()>;

    /// Apply every pending migration, returning the revisions applied
    async fn upgrade(&self) -> StoreResult<Vec<String>>;
}

/// [`MigrationTool`] over the embedded migration list
#[derive(Clone)]
pub struct SqliteMigrator {
    pool: SqlitePool,
    migrations: &'static [Migration],
}

impl SqliteMigrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_migrations(pool, MIGRATIONS)
    }

    /// Migrator over a subset of migrations, e.g. to reproduce an older schema
    pub fn with_migrations(pool: SqlitePool, migrations: &'static [Migration]) -> Self {
        Self { pool, migrations }
    }

    async fn ensure_history_table(&self) -> StoreResult<()> {
        sqlx::query(HISTORY_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

/// Split a migration script into statements, dropping comment lines
fn statements(sql: &str) -> impl Iterator<Item = String> + '_ {
    sql.split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|statement| !statement.trim().is_empty())
}

#[async_trait]
impl MigrationTool for SqliteMigrator {
    async fn db_is_empty(&self) -> StoreResult<bool> {
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != 'migration_history'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(tables == 0)
    }

    async fn current_revisions(&self) -> StoreResult<Vec<String>> {
        let tracked: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'migration_history'",
        )
        .fetch_one(&self.pool)
        .await?;
        if tracked == 0 {
            return Ok(Vec::new());
        }

        let revisions =
            sqlx::query_scalar("SELECT revision FROM migration_history ORDER BY revision")
                .fetch_all(&self.pool)
                .await?;
        Ok(revisions)
    }

    async fn stamp(&self, revision: &str) -> StoreResult<()> {
        let position = self
            .migrations
            .iter()
            .position(|m| m.revision == revision)
            .ok_or_else(|| {
                StoreError::InvalidArgument(format!("Unknown migration revision '{}'", revision))
            })?;

        self.ensure_history_table().await?;
        let applied_at = format_timestamp(&now());
        for migration in &self.migrations[..=position] {
            sqlx::query("INSERT OR IGNORE INTO migration_history (revision, applied_at) VALUES (?, ?)")
                .bind(migration.revision)
                .bind(&applied_at)
                .execute(&self.pool)
                .await?;
        }

        tracing::info!(revision, "Stamped database revision");
        Ok(())
    }

    async fn upgrade(&self) -> StoreResult<Vec<String>> {
        self.ensure_history_table().await?;
        let current = self.current_revisions().await?;
        let mut applied = Vec::new();

        let mut conn = self.pool.acquire().await?;
        for migration in self.migrations {
            if current.iter().any(|r| r == migration.revision) {
                tracing::debug!(revision = migration.revision, "Migration already applied, skipping");
                continue;
            }

            tracing::info!(
                revision = migration.revision,
                description = migration.description,
                "Applying migration"
            );

            let mut tx = conn.begin().await?;
            for statement in statements(migration.sql) {
                sqlx::query(&statement).execute(&mut *tx).await.map_err(|e| {
                    StoreError::Database(format!(
                        "Failed to apply migration '{}': {}",
                        migration.revision, e
                    ))
                })?;
            }
            sqlx::query("INSERT INTO migration_history (revision, applied_at) VALUES (?, ?)")
                .bind(migration.revision)
                .bind(format_timestamp(&now()))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            applied.push(migration.revision.to_string());
        }

        Ok(applied)
    }
}

/// Bring a database of any supported state up to date.
///
/// - empty: run every migration
/// - tables but no history: stamp the baseline, then upgrade
/// - tracked: upgrade
///
/// Returns whether the set of applied revisions changed.
pub async fn bootstrap(tool: &dyn MigrationTool) -> StoreResult<bool> {
    let before = tool.current_revisions().await?;

    if tool.db_is_empty().await? {
        tracing::info!("Empty database, creating schema");
    } else if before.is_empty() {
        tracing::info!(
            revision = BASELINE_REVISION,
            "Untracked schema found, stamping baseline revision"
        );
        tool.stamp(BASELINE_REVISION).await?;
    }
    tool.upgrade().await?;

    let after = tool.current_revisions().await?;
    if before != after {
        tracing::info!(from = ?before.last(), to = ?after.last(), "Database schema migrated");
    }
    Ok(before != after)
}
