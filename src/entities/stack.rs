//! Flavors, stack components and stacks

use crate::core::error::StoreError;
use crate::core::filter::{FieldKind, FieldRegistry, FieldSpec};
use crate::{base_filter_fields, impl_resource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Role a component plays inside a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Orchestrator,
    ArtifactStore,
    ContainerRegistry,
    StepOperator,
    ExperimentTracker,
    ModelDeployer,
    Alerter,
    ImageBuilder,
}

impl ComponentType {
    pub const ALL: &'static [ComponentType] = &[
        ComponentType::Orchestrator,
        ComponentType::ArtifactStore,
        ComponentType::ContainerRegistry,
        ComponentType::StepOperator,
        ComponentType::ExperimentTracker,
        ComponentType::ModelDeployer,
        ComponentType::Alerter,
        ComponentType::ImageBuilder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Orchestrator => "orchestrator",
            ComponentType::ArtifactStore => "artifact_store",
            ComponentType::ContainerRegistry => "container_registry",
            ComponentType::StepOperator => "step_operator",
            ComponentType::ExperimentTracker => "experiment_tracker",
            ComponentType::ModelDeployer => "model_deployer",
            ComponentType::Alerter => "alerter",
            ComponentType::ImageBuilder => "image_builder",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::InvalidArgument(format!("Unknown component type '{}'", s)))
    }
}

// ---------------------------------------------------------------------------
// Flavor
// ---------------------------------------------------------------------------

/// Integration name of flavors shipped with the store
pub const BUILTIN_INTEGRATION: &str = "built-in";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FlavorRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(rename = "type")]
    pub component_type: ComponentType,

    /// Import path of the implementation
    #[validate(length(min = 1))]
    pub source: String,

    #[serde(default)]
    pub integration: String,

    #[serde(default)]
    pub config_schema: Value,

    #[serde(default = "default_true")]
    pub is_custom: bool,

    #[serde(default)]
    pub user: Option<Uuid>,
}

fn default_true() -> bool {
    true
}

impl FlavorRequest {
    pub fn new(name: impl Into<String>, component_type: ComponentType, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type,
            source: source.into(),
            integration: String::new(),
            config_schema: Value::Object(Default::default()),
            is_custom: true,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct FlavorUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub source: String,
    pub integration: String,
    pub config_schema: Value,
    pub is_custom: bool,
    pub user: Option<Uuid>,
}

pub static FLAVOR_FIELDS: FieldRegistry = FieldRegistry {
    resource: "flavor",
    fields: base_filter_fields![
        FieldSpec::column("name", FieldKind::Str),
        FieldSpec::column("type", FieldKind::Str),
        FieldSpec::column("source", FieldKind::Str),
        FieldSpec::column("integration", FieldKind::Str),
        FieldSpec::column("is_custom", FieldKind::Bool),
        FieldSpec::mapped("user", "user_id", FieldKind::Id),
    ],
};

impl_resource!(FlavorResponse, "flavors", "flavor", FLAVOR_FIELDS);

/// Flavors registered (and re-registered after migrations) by the SQL store
pub fn builtin_flavors() -> Vec<FlavorRequest> {
    [
        ("local", ComponentType::Orchestrator, "pipeline_store.orchestrators.LocalOrchestratorFlavor"),
        ("local_docker", ComponentType::Orchestrator, "pipeline_store.orchestrators.LocalDockerOrchestratorFlavor"),
        ("local", ComponentType::ArtifactStore, "pipeline_store.artifact_stores.LocalArtifactStoreFlavor"),
        ("default", ComponentType::ContainerRegistry, "pipeline_store.container_registries.DefaultContainerRegistryFlavor"),
        ("local", ComponentType::ImageBuilder, "pipeline_store.image_builders.LocalImageBuilderFlavor"),
    ]
    .into_iter()
    .map(|(name, component_type, source)| FlavorRequest {
        integration: BUILTIN_INTEGRATION.to_string(),
        is_custom: false,
        ..FlavorRequest::new(name, component_type, source)
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Stack component
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ComponentRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(rename = "type")]
    pub component_type: ComponentType,

    /// Name of a flavor registered for `component_type`
    #[validate(length(min = 1))]
    pub flavor: String,

    #[serde(default)]
    pub configuration: Value,

    pub workspace: Uuid,

    #[serde(default)]
    pub user: Option<Uuid>,
}

impl ComponentRequest {
    pub fn new(
        name: impl Into<String>,
        component_type: ComponentType,
        flavor: impl Into<String>,
        workspace: Uuid,
    ) -> Self {
        Self {
            name: name.into(),
            component_type,
            flavor: flavor.into(),
            configuration: Value::Object(Default::default()),
            workspace,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ComponentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub flavor: String,
    pub configuration: Value,
    pub workspace: Uuid,
    pub user: Option<Uuid>,
}

pub static COMPONENT_FIELDS: FieldRegistry = FieldRegistry {
    resource: "stack component",
    fields: base_filter_fields![
        FieldSpec::column("name", FieldKind::Str),
        FieldSpec::column("type", FieldKind::Str),
        FieldSpec::column("flavor", FieldKind::Str),
        FieldSpec::mapped("workspace", "workspace_id", FieldKind::Id),
        FieldSpec::mapped("user", "user_id", FieldKind::Id),
    ],
};

impl_resource!(ComponentResponse, "components", "stack component", COMPONENT_FIELDS);

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StackRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// At most one component per type
    pub components: BTreeMap<ComponentType, Uuid>,

    pub workspace: Uuid,

    #[serde(default)]
    pub user: Option<Uuid>,
}

impl StackRequest {
    pub fn new(
        name: impl Into<String>,
        workspace: Uuid,
        components: impl IntoIterator<Item = (ComponentType, Uuid)>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            components: components.into_iter().collect(),
            workspace,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct StackUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<BTreeMap<ComponentType, Uuid>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub components: BTreeMap<ComponentType, Uuid>,
    pub workspace: Uuid,
    pub user: Option<Uuid>,
}

impl StackResponse {
    pub fn contains_component(&self, component: &Uuid) -> bool {
        self.components.values().any(|id| id == component)
    }
}

pub static STACK_FIELDS: FieldRegistry = FieldRegistry {
    resource: "stack",
    fields: base_filter_fields![
        FieldSpec::column("name", FieldKind::Str),
        FieldSpec::column("description", FieldKind::Str),
        FieldSpec::mapped("workspace", "workspace_id", FieldKind::Id),
        FieldSpec::mapped("user", "user_id", FieldKind::Id),
        FieldSpec::derived("component_id", FieldKind::Id),
    ],
};

impl_resource!(StackResponse, "stacks", "stack", STACK_FIELDS);
