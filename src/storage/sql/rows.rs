//! Table rows and their conversions to and from the resource types
//!
//! Identifiers are stored as hyphenated lowercase TEXT, timestamps as TEXT in
//! [`TIMESTAMP_FORMAT`] (fixed width, so lexical order is time order) and JSON
//! documents as TEXT.

use crate::core::error::{StoreError, StoreResult};
use crate::entities::{
    ComponentRequest, ComponentResponse, ComponentType, ComponentUpdate, FlavorRequest,
    FlavorResponse, FlavorUpdate, Permission, PipelineRequest, PipelineResponse, PipelineUpdate,
    RoleAssignmentRequest, RoleAssignmentResponse, RoleRequest, RoleResponse, RoleUpdate,
    RunRequest, RunResponse, RunUpdate, StackResponse, UserRequest, UserResponse, UserUpdate,
    WorkspaceRequest, WorkspaceResponse, WorkspaceUpdate,
};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Storage format of every timestamp column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current time at storage precision
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::Database(format!("Corrupt timestamp '{}': {}", raw, e)))
}

fn parse_opt_timestamp(raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

pub fn parse_uuid(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Database(format!("Corrupt identifier '{}': {}", raw, e)))
}

fn parse_opt_uuid(raw: Option<String>) -> StoreResult<Option<Uuid>> {
    raw.as_deref().map(parse_uuid).transpose()
}

fn parse_json(raw: &str) -> StoreResult<Value> {
    Ok(serde_json::from_str(raw)?)
}

fn to_json(value: &impl serde::Serialize) -> StoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkspaceRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub name: String,
    pub description: String,
}

impl WorkspaceRow {
    pub fn from_request(request: &WorkspaceRequest, id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            created: format_timestamp(&now),
            updated: format_timestamp(&now),
            name: request.name.clone(),
            description: request.description.clone(),
        }
    }

    pub fn apply(&mut self, update: WorkspaceUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        self.updated = format_timestamp(&now);
    }

    pub fn into_response(self) -> StoreResult<WorkspaceResponse> {
        Ok(WorkspaceResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            name: self.name,
            description: self.description,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub active: bool,
}

impl UserRow {
    pub fn from_request(request: &UserRequest, id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            created: format_timestamp(&now),
            updated: format_timestamp(&now),
            name: request.name.clone(),
            full_name: request.full_name.clone(),
            email: request.email.clone(),
            active: request.active,
        }
    }

    pub fn apply(&mut self, update: UserUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(full_name) = update.full_name {
            self.full_name = full_name;
        }
        if let Some(email) = update.email {
            self.email = Some(email);
        }
        if let Some(active) = update.active {
            self.active = active;
        }
        self.updated = format_timestamp(&now);
    }

    pub fn into_response(self) -> StoreResult<UserResponse> {
        Ok(UserResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            name: self.name,
            full_name: self.full_name,
            email: self.email,
            active: self.active,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub name: String,
    pub permissions: String,
}

impl RoleRow {
    pub fn from_request(request: &RoleRequest, id: Uuid, now: DateTime<Utc>) -> StoreResult<Self> {
        Ok(Self {
            id: id.to_string(),
            created: format_timestamp(&now),
            updated: format_timestamp(&now),
            name: request.name.clone(),
            permissions: to_json(&request.permissions)?,
        })
    }

    pub fn apply(&mut self, update: RoleUpdate, now: DateTime<Utc>) -> StoreResult<()> {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(permissions) = update.permissions {
            self.permissions = to_json(&permissions)?;
        }
        self.updated = format_timestamp(&now);
        Ok(())
    }

    pub fn into_response(self) -> StoreResult<RoleResponse> {
        let permissions: BTreeSet<Permission> = serde_json::from_str(&self.permissions)?;
        Ok(RoleResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            name: self.name,
            permissions,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleAssignmentRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub role_id: String,
    pub user_id: String,
    pub workspace_id: String,
}

impl RoleAssignmentRow {
    pub fn from_request(request: &RoleAssignmentRequest, id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            created: format_timestamp(&now),
            updated: format_timestamp(&now),
            role_id: request.role.to_string(),
            user_id: request.user.to_string(),
            workspace_id: request.workspace.to_string(),
        }
    }

    pub fn into_response(self) -> StoreResult<RoleAssignmentResponse> {
        Ok(RoleAssignmentResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            role: parse_uuid(&self.role_id)?,
            user: parse_uuid(&self.user_id)?,
            workspace: parse_uuid(&self.workspace_id)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlavorRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub name: String,
    #[sqlx(rename = "type")]
    pub component_type: String,
    pub source: String,
    pub integration: String,
    pub config_schema: String,
    pub is_custom: bool,
    pub user_id: Option<String>,
}

impl FlavorRow {
    pub fn from_request(request: &FlavorRequest, id: Uuid, now: DateTime<Utc>) -> StoreResult<Self> {
        Ok(Self {
            id: id.to_string(),
            created: format_timestamp(&now),
            updated: format_timestamp(&now),
            name: request.name.clone(),
            component_type: request.component_type.to_string(),
            source: request.source.clone(),
            integration: request.integration.clone(),
            config_schema: to_json(&request.config_schema)?,
            is_custom: request.is_custom,
            user_id: request.user.map(|u| u.to_string()),
        })
    }

    pub fn apply(&mut self, update: FlavorUpdate, now: DateTime<Utc>) -> StoreResult<()> {
        if let Some(source) = update.source {
            self.source = source;
        }
        if let Some(integration) = update.integration {
            self.integration = integration;
        }
        if let Some(schema) = update.config_schema {
            self.config_schema = to_json(&schema)?;
        }
        self.updated = format_timestamp(&now);
        Ok(())
    }

    pub fn into_response(self) -> StoreResult<FlavorResponse> {
        Ok(FlavorResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            name: self.name,
            component_type: self.component_type.parse()?,
            source: self.source,
            integration: self.integration,
            config_schema: parse_json(&self.config_schema)?,
            is_custom: self.is_custom,
            user: parse_opt_uuid(self.user_id)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ComponentRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub name: String,
    #[sqlx(rename = "type")]
    pub component_type: String,
    pub flavor: String,
    pub configuration: String,
    pub workspace_id: String,
    pub user_id: Option<String>,
}

impl ComponentRow {
    pub fn from_request(
        request: &ComponentRequest,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Self> {
        Ok(Self {
            id: id.to_string(),
            created: format_timestamp(&now),
            updated: format_timestamp(&now),
            name: request.name.clone(),
            component_type: request.component_type.to_string(),
            flavor: request.flavor.clone(),
            configuration: to_json(&request.configuration)?,
            workspace_id: request.workspace.to_string(),
            user_id: request.user.map(|u| u.to_string()),
        })
    }

    pub fn apply(&mut self, update: ComponentUpdate, now: DateTime<Utc>) -> StoreResult<()> {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(configuration) = update.configuration {
            self.configuration = to_json(&configuration)?;
        }
        self.updated = format_timestamp(&now);
        Ok(())
    }

    pub fn into_response(self) -> StoreResult<ComponentResponse> {
        Ok(ComponentResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            name: self.name,
            component_type: self.component_type.parse()?,
            flavor: self.flavor,
            configuration: parse_json(&self.configuration)?,
            workspace: parse_uuid(&self.workspace_id)?,
            user: parse_opt_uuid(self.user_id)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StackRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub name: String,
    pub description: String,
    pub workspace_id: String,
    pub user_id: Option<String>,
}

/// One (stack, component) link of the `stack_compositions` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompositionRow {
    pub stack_id: String,
    pub component_type: String,
    pub component_id: String,
}

impl StackRow {
    pub fn into_response(self, compositions: &[CompositionRow]) -> StoreResult<StackResponse> {
        let mut components: BTreeMap<ComponentType, Uuid> = BTreeMap::new();
        for link in compositions.iter().filter(|link| link.stack_id == self.id) {
            components.insert(link.component_type.parse()?, parse_uuid(&link.component_id)?);
        }

        Ok(StackResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            name: self.name,
            description: self.description,
            components,
            workspace: parse_uuid(&self.workspace_id)?,
            user: parse_opt_uuid(self.user_id)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub name: String,
    pub version: String,
    pub docstring: Option<String>,
    pub spec: String,
    pub workspace_id: String,
    pub user_id: Option<String>,
}

impl PipelineRow {
    pub fn from_request(
        request: &PipelineRequest,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Self> {
        Ok(Self {
            id: id.to_string(),
            created: format_timestamp(&now),
            updated: format_timestamp(&now),
            name: request.name.clone(),
            version: request.version.clone(),
            docstring: request.docstring.clone(),
            spec: to_json(&request.spec)?,
            workspace_id: request.workspace.to_string(),
            user_id: request.user.map(|u| u.to_string()),
        })
    }

    pub fn apply(&mut self, update: PipelineUpdate, now: DateTime<Utc>) -> StoreResult<()> {
        if let Some(docstring) = update.docstring {
            self.docstring = Some(docstring);
        }
        if let Some(spec) = update.spec {
            self.spec = to_json(&spec)?;
        }
        self.updated = format_timestamp(&now);
        Ok(())
    }

    pub fn into_response(self) -> StoreResult<PipelineResponse> {
        Ok(PipelineResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            name: self.name,
            version: self.version,
            docstring: self.docstring,
            spec: parse_json(&self.spec)?,
            workspace: parse_uuid(&self.workspace_id)?,
            user: parse_opt_uuid(self.user_id)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: String,
    pub created: String,
    pub updated: String,
    pub name: String,
    pub pipeline_id: Option<String>,
    pub stack_id: Option<String>,
    pub status: String,
    pub num_steps: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub config: String,
    pub workspace_id: String,
    pub user_id: Option<String>,
}

impl RunRow {
    pub fn from_request(request: &RunRequest, id: Uuid, now: DateTime<Utc>) -> StoreResult<Self> {
        Ok(Self {
            id: id.to_string(),
            created: format_timestamp(&now),
            updated: format_timestamp(&now),
            name: request.name.clone(),
            pipeline_id: request.pipeline.map(|u| u.to_string()),
            stack_id: request.stack.map(|u| u.to_string()),
            status: request.status.to_string(),
            num_steps: request.num_steps,
            start_time: request.start_time.as_ref().map(format_timestamp),
            end_time: request.end_time.as_ref().map(format_timestamp),
            config: to_json(&request.config)?,
            workspace_id: request.workspace.to_string(),
            user_id: request.user.map(|u| u.to_string()),
        })
    }

    pub fn apply(&mut self, update: RunUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status.to_string();
        }
        if let Some(num_steps) = update.num_steps {
            self.num_steps = Some(num_steps);
        }
        if let Some(end_time) = update.end_time {
            self.end_time = Some(format_timestamp(&end_time));
        }
        self.updated = format_timestamp(&now);
    }

    pub fn into_response(self) -> StoreResult<RunResponse> {
        Ok(RunResponse {
            id: parse_uuid(&self.id)?,
            created: parse_timestamp(&self.created)?,
            updated: parse_timestamp(&self.updated)?,
            name: self.name,
            pipeline: parse_opt_uuid(self.pipeline_id)?,
            stack: parse_opt_uuid(self.stack_id)?,
            status: self.status.parse()?,
            num_steps: self.num_steps,
            start_time: parse_opt_timestamp(self.start_time)?,
            end_time: parse_opt_timestamp(self.end_time)?,
            config: parse_json(&self.config)?,
            workspace: parse_uuid(&self.workspace_id)?,
            user: parse_opt_uuid(self.user_id)?,
        })
    }
}
