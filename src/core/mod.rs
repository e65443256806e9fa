//! Core module containing the store contract and the filter/page machinery

pub mod error;
pub mod filter;
pub mod page;
pub mod resource;
pub mod store;

pub use error::{ErrorResponse, StoreError, StoreResult};
pub use filter::{
    FieldFilter, FieldKind, FieldRegistry, FieldSource, FieldSpec, FilterBuilder,
    FilterDescriptor, FilterValue, LogicalOperator, Operator, SortOrder,
};
pub use page::Page;
pub use resource::Resource;
pub use store::{
    ComponentStore, FlavorStore, PipelineStore, ResourceStore, RoleStore, RunStore, StackStore,
    UserStore, WorkspaceStore,
};
