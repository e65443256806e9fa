//! Resource kinds served by every store
//!
//! Each kind has a request type (create), an update type (partial, `None`
//! keeps the stored value) and a response type implementing
//! [`Resource`](crate::core::resource::Resource) with its static filter
//! registry.

#[macro_use]
pub mod macros;

pub mod identity;
pub mod pipeline;
pub mod stack;

pub use identity::{
    ADMIN_ROLE, DEFAULT_NAME, GUEST_ROLE, Permission, RoleAssignmentRequest,
    RoleAssignmentResponse, RoleRequest, RoleResponse, RoleUpdate, UserRequest, UserResponse,
    UserUpdate, WorkspaceRequest, WorkspaceResponse, WorkspaceUpdate,
};
pub use pipeline::{
    PipelineRequest, PipelineResponse, PipelineUpdate, RunRequest, RunResponse, RunStatus,
    RunUpdate,
};
pub use stack::{
    BUILTIN_INTEGRATION, ComponentRequest, ComponentResponse, ComponentType, ComponentUpdate,
    FlavorRequest, FlavorResponse, FlavorUpdate, StackRequest, StackResponse, StackUpdate,
    builtin_flavors,
};
