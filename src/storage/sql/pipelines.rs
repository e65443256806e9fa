//! Pipelines and pipeline runs

use super::query::paginate;
use super::rows::{PipelineRow, RunRow, now};
use super::{SqlStore, delete_row, ensure_exists, fetch_row, unique_violation};
use crate::core::error::{StoreError, StoreResult};
use crate::core::filter::FilterDescriptor;
use crate::core::page::Page;
use crate::core::resource::Resource;
use crate::core::store::{PipelineStore, RunStore};
use crate::entities::{
    PipelineRequest, PipelineResponse, PipelineUpdate, RunRequest, RunResponse, RunUpdate,
};
use async_trait::async_trait;
use uuid::Uuid;
use validator::Validate;

fn pipeline_conflict(name: &str, version: &str, workspace: &Uuid) -> StoreError {
    StoreError::AlreadyExists(format!(
        "Unable to register pipeline '{}' version '{}': a pipeline with this name and version \
         already exists in workspace '{}'",
        name, version, workspace
    ))
}

fn run_conflict(name: &str) -> StoreError {
    StoreError::already_exists("pipeline run", name, "globally")
}

#[async_trait]
impl PipelineStore for SqlStore {
    async fn create_pipeline(&self, request: PipelineRequest) -> StoreResult<PipelineResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        ensure_exists(&mut tx, "workspaces", "workspace", &request.workspace).await?;
        if let Some(user) = &request.user {
            ensure_exists(&mut tx, "users", "user", user).await?;
        }

        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pipelines WHERE name = ? AND version = ? AND workspace_id = ?",
        )
        .bind(&request.name)
        .bind(&request.version)
        .bind(request.workspace.to_string())
        .fetch_one(&mut *tx)
        .await?;
        if taken > 0 {
            return Err(pipeline_conflict(
                &request.name,
                &request.version,
                &request.workspace,
            ));
        }

        let row = PipelineRow::from_request(&request, Uuid::new_v4(), now())?;
        sqlx::query(
            "INSERT INTO pipelines (id, created, updated, name, version, docstring, spec, \
             workspace_id, user_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.created)
        .bind(&row.updated)
        .bind(&row.name)
        .bind(&row.version)
        .bind(&row.docstring)
        .bind(&row.spec)
        .bind(&row.workspace_id)
        .bind(&row.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                pipeline_conflict(&request.name, &request.version, &request.workspace)
            })
        })?;
        tx.commit().await?;

        tracing::debug!(pipeline = %row.name, version = %row.version, "Created pipeline");
        row.into_response()
    }

    async fn get_pipeline(&self, id: &Uuid) -> StoreResult<PipelineResponse> {
        let mut conn = self.pool.acquire().await?;
        fetch_row::<PipelineRow>(&mut conn, "pipelines", "pipeline", id)
            .await?
            .into_response()
    }

    async fn list_pipelines(
        &self,
        filter: &FilterDescriptor,
    ) -> StoreResult<Page<PipelineResponse>> {
        filter.ensure_for(PipelineResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;
        let page = paginate::<PipelineRow>(&mut tx, "pipelines", filter).await?;
        tx.commit().await?;
        page.try_map(PipelineRow::into_response)
    }

    async fn update_pipeline(
        &self,
        id: &Uuid,
        update: PipelineUpdate,
    ) -> StoreResult<PipelineResponse> {
        update.validate()?;
        let mut tx = self.begin_write().await?;
        let mut row = fetch_row::<PipelineRow>(&mut tx, "pipelines", "pipeline", id).await?;

        row.apply(update, now())?;
        sqlx::query("UPDATE pipelines SET docstring = ?, spec = ?, updated = ? WHERE id = ?")
            .bind(&row.docstring)
            .bind(&row.spec)
            .bind(&row.updated)
            .bind(&row.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        row.into_response()
    }

    async fn delete_pipeline(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        delete_row(&mut tx, "pipelines", "pipeline", id).await?;
        tx.commit().await?;

        tracing::debug!(pipeline = %id, "Deleted pipeline and its runs");
        Ok(())
    }
}

#[async_trait]
impl RunStore for SqlStore {
    async fn create_run(&self, request: RunRequest) -> StoreResult<RunResponse> {
        request.validate()?;
        let mut tx = self.begin_write().await?;

        ensure_exists(&mut tx, "workspaces", "workspace", &request.workspace).await?;
        if let Some(user) = &request.user {
            ensure_exists(&mut tx, "users", "user", user).await?;
        }
        if let Some(pipeline) = &request.pipeline {
            ensure_exists(&mut tx, "pipelines", "pipeline", pipeline).await?;
        }
        if let Some(stack) = &request.stack {
            ensure_exists(&mut tx, "stacks", "stack", stack).await?;
        }

        let id = request.id.unwrap_or_else(Uuid::new_v4);
        let taken: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pipeline_runs WHERE name = ? OR id = ?")
                .bind(&request.name)
                .bind(id.to_string())
                .fetch_one(&mut *tx)
                .await?;
        if taken > 0 {
            return Err(run_conflict(&request.name));
        }

        let row = RunRow::from_request(&request, id, now())?;
        sqlx::query(
            "INSERT INTO pipeline_runs (id, created, updated, name, pipeline_id, stack_id, status, \
             num_steps, start_time, end_time, config, workspace_id, user_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.created)
        .bind(&row.updated)
        .bind(&row.name)
        .bind(&row.pipeline_id)
        .bind(&row.stack_id)
        .bind(&row.status)
        .bind(row.num_steps)
        .bind(&row.start_time)
        .bind(&row.end_time)
        .bind(&row.config)
        .bind(&row.workspace_id)
        .bind(&row.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || run_conflict(&request.name)))?;
        tx.commit().await?;

        tracing::debug!(run = %row.name, status = %row.status, "Created pipeline run");
        row.into_response()
    }

    async fn get_run(&self, id: &Uuid) -> StoreResult<RunResponse> {
        let mut conn = self.pool.acquire().await?;
        fetch_row::<RunRow>(&mut conn, "pipeline_runs", "pipeline run", id)
            .await?
            .into_response()
    }

    async fn list_runs(&self, filter: &FilterDescriptor) -> StoreResult<Page<RunResponse>> {
        filter.ensure_for(RunResponse::filter_fields())?;
        let mut tx = self.pool.begin().await?;
        let page = paginate::<RunRow>(&mut tx, "pipeline_runs", filter).await?;
        tx.commit().await?;
        page.try_map(RunRow::into_response)
    }

    async fn update_run(&self, id: &Uuid, update: RunUpdate) -> StoreResult<RunResponse> {
        update.validate()?;
        let mut tx = self.begin_write().await?;
        let mut row = fetch_row::<RunRow>(&mut tx, "pipeline_runs", "pipeline run", id).await?;

        row.apply(update, now());
        sqlx::query(
            "UPDATE pipeline_runs SET status = ?, num_steps = ?, end_time = ?, updated = ? WHERE id = ?",
        )
        .bind(&row.status)
        .bind(row.num_steps)
        .bind(&row.end_time)
        .bind(&row.updated)
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        row.into_response()
    }

    async fn delete_run(&self, id: &Uuid) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        delete_row(&mut tx, "pipeline_runs", "pipeline run", id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_or_create_run(&self, request: RunRequest) -> StoreResult<(RunResponse, bool)> {
        let conflict = match self.create_run(request.clone()).await {
            Ok(run) => return Ok((run, true)),
            Err(err @ StoreError::AlreadyExists(_)) => err,
            Err(err) => return Err(err),
        };

        if let Some(id) = &request.id {
            match self.get_run(id).await {
                Ok(run) => return Ok((run, false)),
                Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let existing = sqlx::query_as::<_, RunRow>("SELECT * FROM pipeline_runs WHERE name = ?")
            .bind(&request.name)
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(row) => {
                tracing::debug!(run = %row.name, "Returning existing pipeline run");
                Ok((row.into_response()?, false))
            }
            // Lost between the conflict and the lookup
            None => Err(conflict),
        }
    }
}
