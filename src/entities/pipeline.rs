//! Pipelines and pipeline runs

use crate::core::error::StoreError;
use crate::core::filter::{FieldKind, FieldRegistry, FieldSpec};
use crate::{base_filter_fields, impl_resource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PipelineRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(min = 1, max = 255))]
    pub version: String,

    #[serde(default)]
    pub docstring: Option<String>,

    /// Step graph as produced by the SDK
    #[serde(default)]
    pub spec: Value,

    pub workspace: Uuid,

    #[serde(default)]
    pub user: Option<Uuid>,
}

impl PipelineRequest {
    pub fn new(name: impl Into<String>, version: impl Into<String>, workspace: Uuid) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            docstring: None,
            spec: Value::Object(Default::default()),
            workspace,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct PipelineUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    pub version: String,
    pub docstring: Option<String>,
    pub spec: Value,
    pub workspace: Uuid,
    pub user: Option<Uuid>,
}

pub static PIPELINE_FIELDS: FieldRegistry = FieldRegistry {
    resource: "pipeline",
    fields: base_filter_fields![
        FieldSpec::column("name", FieldKind::Str),
        FieldSpec::column("version", FieldKind::Str),
        FieldSpec::column("docstring", FieldKind::Str),
        FieldSpec::mapped("workspace", "workspace_id", FieldKind::Id),
        FieldSpec::mapped("user", "user_id", FieldKind::Id),
    ],
};

impl_resource!(PipelineResponse, "pipelines", "pipeline", PIPELINE_FIELDS);

// ---------------------------------------------------------------------------
// Pipeline run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Initializing,
    Running,
    Completed,
    Failed,
    Cached,
}

impl RunStatus {
    pub const ALL: &'static [RunStatus] = &[
        RunStatus::Initializing,
        RunStatus::Running,
        RunStatus::Completed,
        RunStatus::Failed,
        RunStatus::Cached,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Initializing => "initializing",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cached => "cached",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cached)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StoreError::InvalidArgument(format!("Unknown run status '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RunRequest {
    /// Client-chosen identifier, used to recognize a retried create
    #[serde(default)]
    pub id: Option<Uuid>,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default)]
    pub pipeline: Option<Uuid>,

    #[serde(default)]
    pub stack: Option<Uuid>,

    #[serde(default)]
    pub status: RunStatus,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub num_steps: Option<i64>,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub config: Value,

    pub workspace: Uuid,

    #[serde(default)]
    pub user: Option<Uuid>,
}

impl RunRequest {
    pub fn new(name: impl Into<String>, workspace: Uuid) -> Self {
        Self {
            id: None,
            name: name.into(),
            pipeline: None,
            stack: None,
            status: RunStatus::default(),
            num_steps: None,
            start_time: None,
            end_time: None,
            config: Value::Object(Default::default()),
            workspace,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct RunUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub num_steps: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    pub pipeline: Option<Uuid>,
    pub stack: Option<Uuid>,
    pub status: RunStatus,
    pub num_steps: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub config: Value,
    pub workspace: Uuid,
    pub user: Option<Uuid>,
}

pub static RUN_FIELDS: FieldRegistry = FieldRegistry {
    resource: "pipeline run",
    fields: base_filter_fields![
        FieldSpec::column("name", FieldKind::Str),
        FieldSpec::column("status", FieldKind::Str),
        FieldSpec::column("num_steps", FieldKind::Numeric),
        FieldSpec::column("start_time", FieldKind::Datetime),
        FieldSpec::column("end_time", FieldKind::Datetime),
        FieldSpec::mapped("pipeline", "pipeline_id", FieldKind::Id),
        FieldSpec::mapped("stack", "stack_id", FieldKind::Id),
        FieldSpec::mapped("workspace", "workspace_id", FieldKind::Id),
        FieldSpec::mapped("user", "user_id", FieldKind::Id),
    ],
};

impl_resource!(RunResponse, "runs", "pipeline run", RUN_FIELDS);
