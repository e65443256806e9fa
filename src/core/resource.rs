//! Resource trait shared by every response type

use crate::core::filter::FieldRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Base trait for all resources flowing through a store.
///
/// Implemented by the response types. Every resource has:
/// - id: Unique identifier
/// - created: Creation timestamp
/// - updated: Last modification timestamp
///
/// plus a static [`FieldRegistry`] naming the fields it can be filtered and
/// sorted by. Use [`impl_resource!`](crate::impl_resource) rather than
/// implementing this by hand.
pub trait Resource: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// The plural resource name used in URLs (e.g., "stacks", "runs")
    fn resource_name() -> &'static str;

    /// The singular resource name used in messages (e.g., "stack", "run")
    fn resource_name_singular() -> &'static str;

    /// Declared filterable fields
    fn filter_fields() -> &'static FieldRegistry;

    fn id(&self) -> Uuid;

    fn created(&self) -> DateTime<Utc>;

    fn updated(&self) -> DateTime<Utc>;
}
