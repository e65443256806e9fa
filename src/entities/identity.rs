//! Workspaces, users, roles and role assignments

use crate::core::filter::{FieldKind, FieldRegistry, FieldSpec};
use crate::{base_filter_fields, impl_resource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;
use validator::Validate;

/// Name of the workspace, user and stack created at bootstrap
pub const DEFAULT_NAME: &str = "default";

/// Roles created at bootstrap, never updated or deleted
pub const ADMIN_ROLE: &str = "admin";
pub const GUEST_ROLE: &str = "guest";

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WorkspaceRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default)]
    pub description: String,
}

impl WorkspaceRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct WorkspaceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    pub description: String,
}

pub static WORKSPACE_FIELDS: FieldRegistry = FieldRegistry {
    resource: "workspace",
    fields: base_filter_fields![
        FieldSpec::column("name", FieldKind::Str),
        FieldSpec::column("description", FieldKind::Str),
    ],
};

impl_resource!(WorkspaceResponse, "workspaces", "workspace", WORKSPACE_FIELDS);

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct UserRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default)]
    pub full_name: String,

    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,

    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl UserRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: String::new(),
            email: None,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email)]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub active: bool,
}

pub static USER_FIELDS: FieldRegistry = FieldRegistry {
    resource: "user",
    fields: base_filter_fields![
        FieldSpec::column("name", FieldKind::Str),
        FieldSpec::column("full_name", FieldKind::Str),
        FieldSpec::column("email", FieldKind::Str),
        FieldSpec::column("active", FieldKind::Bool),
    ],
};

impl_resource!(UserResponse, "users", "user", USER_FIELDS);

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Coarse permission granted by a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Me,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RoleRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl RoleRequest {
    pub fn new(name: impl Into<String>, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct RoleUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeSet<Permission>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub name: String,
    pub permissions: BTreeSet<Permission>,
}

pub static ROLE_FIELDS: FieldRegistry = FieldRegistry {
    resource: "role",
    fields: base_filter_fields![FieldSpec::column("name", FieldKind::Str)],
};

impl_resource!(RoleResponse, "roles", "role", ROLE_FIELDS);

// ---------------------------------------------------------------------------
// Role assignment
// ---------------------------------------------------------------------------

/// Grants a role to a user within a workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RoleAssignmentRequest {
    pub role: Uuid,
    pub user: Uuid,
    pub workspace: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignmentResponse {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub role: Uuid,
    pub user: Uuid,
    pub workspace: Uuid,
}

pub static ROLE_ASSIGNMENT_FIELDS: FieldRegistry = FieldRegistry {
    resource: "role assignment",
    fields: base_filter_fields![
        FieldSpec::mapped("role", "role_id", FieldKind::Id),
        FieldSpec::mapped("user", "user_id", FieldKind::Id),
        FieldSpec::mapped("workspace", "workspace_id", FieldKind::Id),
    ],
};

impl_resource!(
    RoleAssignmentResponse,
    "role_assignments",
    "role assignment",
    ROLE_ASSIGNMENT_FIELDS
);
