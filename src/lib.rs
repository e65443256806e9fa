//! # pipeline-store
//!
//! A resource store for ML-pipeline metadata with pluggable backends.
//!
//! ## Features
//!
//! - **One Store Contract**: workspaces, users, roles, flavors, stack components,
//!   stacks, pipelines and runs behind the traits of [`core::store`]
//! - **SQL Backend**: SQLite through sqlx, with embedded schema migrations and
//!   built-in defaults (`sqlite` feature)
//! - **REST Backend**: proxies every call to a remote server, with token
//!   re-negotiation on `401` (`rest` feature)
//! - **Filtering**: typed per-field filters (`"<op>:<value>"`), sorting and
//!   pagination shared by both backends
//! - **HTTP Exposure**: an axum router serving any store with bearer-token auth
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipeline_store::prelude::*;
//!
//! let store = SqlStore::in_memory().await?;
//! let workspace = store.create_workspace(WorkspaceRequest::new("research")).await?;
//!
//! let filter = FilterDescriptor::builder(StackResponse::filter_fields())
//!     .filter("workspace", workspace.id)
//!     .filter("name", "startswith:prod")
//!     .sort_by("desc:created")
//!     .size(50)
//!     .build()?;
//! let stacks = store.list_stacks(&filter).await?;
//! println!("{} of {} stacks", stacks.len(), stacks.total);
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core Traits ===
    pub use crate::core::{
        ComponentStore, FlavorStore, PipelineStore, Resource, ResourceStore, RoleStore, RunStore,
        StackStore, UserStore, WorkspaceStore,
    };

    // === Filtering ===
    pub use crate::core::{
        FieldKind, FieldRegistry, FieldSpec, FilterDescriptor, LogicalOperator, Operator, Page,
        SortOrder, StoreError, StoreResult,
    };

    // === Resources ===
    pub use crate::entities::*;

    // === Storage ===
    #[cfg(feature = "rest")]
    pub use crate::storage::{Credentials, RestStore};
    #[cfg(feature = "sqlite")]
    pub use crate::storage::SqlStore;

    // === Config ===
    pub use crate::config::{AuthConfig, ServerConfig, StoreConfig, connect};

    // === Server ===
    pub use crate::server::{AppState, ServerBuilder, TokenAuthority, router};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;
}
