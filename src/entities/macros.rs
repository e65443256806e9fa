//! Macros for reducing boilerplate when defining resources
//!
//! These macros generate the repetitive trait implementations needed
//! for each response type.

/// Implement [`Resource`](crate::core::resource::Resource) for a response type
///
/// The type must have `id`, `created` and `updated` fields.
///
/// # Example
/// ```rust,ignore
/// static STACK_FIELDS: FieldRegistry = FieldRegistry { resource: "stack", fields: &[...] };
///
/// impl_resource!(StackResponse, "stacks", "stack", STACK_FIELDS);
/// ```
#[macro_export]
macro_rules! impl_resource {
    ($type:ident, $plural:expr, $singular:expr, $fields:ident) => {
        impl $crate::core::resource::Resource for $type {
            fn resource_name() -> &'static str {
                $plural
            }

            fn resource_name_singular() -> &'static str {
                $singular
            }

            fn filter_fields() -> &'static $crate::core::filter::FieldRegistry {
                &$fields
            }

            fn id(&self) -> ::uuid::Uuid {
                self.id
            }

            fn created(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.created
            }

            fn updated(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.updated
            }
        }
    };
}

/// Field specs every resource declares: `id`, `created`, `updated`
#[macro_export]
macro_rules! base_filter_fields {
    ($($field:expr),* $(,)?) => {
        &[
            $crate::core::filter::FieldSpec::column("id", $crate::core::filter::FieldKind::Id),
            $crate::core::filter::FieldSpec::column("created", $crate::core::filter::FieldKind::Datetime),
            $crate::core::filter::FieldSpec::column("updated", $crate::core::filter::FieldKind::Datetime),
            $($field),*
        ]
    };
}
