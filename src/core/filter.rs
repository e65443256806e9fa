//! Filter, sort and page descriptors
//!
//! A [`FilterDescriptor`] is the validated form of the query parameters a
//! caller passes to a `list_*` operation. Construction parses every raw value
//! against the resource's static [`FieldRegistry`], so an invalid operator,
//! an unparsable value or an unknown sort column is rejected before any
//! backend sees the query.
//!
//! # Value syntax
//!
//! - `"foo"`                  → `equals foo`
//! - `"contains:foo"`         → substring match
//! - `"gte:5"`                → numeric / datetime ordering
//! - `"lt:2024-01-01 00:00:00"` → datetimes use [`FILTERING_DATETIME_FORMAT`]
//!
//! # Example
//!
//! ```rust,ignore
//! let filter = FilterDescriptor::builder(StackResponse::filter_fields())
//!     .filter("name", "startswith:prod")
//!     .sort_by("desc:created")
//!     .size(50)
//!     .build()?;
//! let page = store.list_stacks(&filter).await?;
//! ```

use crate::core::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Default number of items per page
pub const PAGE_SIZE_DEFAULT: u32 = 20;

/// Largest page size a caller may request
pub const PAGE_SIZE_MAXIMUM: u32 = 10_000;

/// Pagination and sorting controls, never treated as data filters
pub const FILTER_EXCLUDE_FIELDS: &[&str] = &["page", "size", "sort_by", "logical_operator"];

/// Format accepted for datetime filter values
pub const FILTERING_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column sorted on when the caller does not say otherwise
pub const DEFAULT_SORT_COLUMN: &str = "created";

/// Comparison applied by a single field filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    /// Every operator, in the order they are documented
    pub const ALL: &'static [Operator] = &[
        Operator::Equals,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
    ];

    /// The token used in `"<op>:<value>"` strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Contains => "contains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
        }
    }

    /// Parse an operator token, `None` if unrecognized
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == token)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the individual field filters are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "and",
            LogicalOperator::Or => "or",
        }
    }

    pub fn parse(value: &str) -> StoreResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "and" => Ok(LogicalOperator::And),
            "or" => Ok(LogicalOperator::Or),
            other => Err(StoreError::InvalidArgument(format!(
                "Invalid logical operator '{}': expected one of [and, or]",
                other
            ))),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Declared type of a filterable field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Str,
    Numeric,
    Datetime,
    Id,
}

impl FieldKind {
    /// Operators a filter on a field of this kind may use
    pub fn allowed_operators(&self) -> &'static [Operator] {
        match self {
            FieldKind::Bool => &[Operator::Equals],
            FieldKind::Str | FieldKind::Id => &[
                Operator::Equals,
                Operator::Contains,
                Operator::StartsWith,
                Operator::EndsWith,
            ],
            FieldKind::Numeric | FieldKind::Datetime => &[
                Operator::Equals,
                Operator::Gt,
                Operator::Gte,
                Operator::Lt,
                Operator::Lte,
            ],
        }
    }
}

/// Where the value of a filterable field comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// A column of the resource's table
    Column(&'static str),
    /// A property computed by the backend's custom fetch step
    Derived,
}

/// One declared filterable field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub source: FieldSource,
}

impl FieldSpec {
    /// A field backed by the column of the same name
    pub const fn column(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            source: FieldSource::Column(name),
        }
    }

    /// A field whose column is named differently, e.g. `workspace` -> `workspace_id`
    pub const fn mapped(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            source: FieldSource::Column(column),
        }
    }

    /// A field resolved outside of SQL
    pub const fn derived(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            source: FieldSource::Derived,
        }
    }
}

/// Static table of the fields a resource kind can be filtered and sorted by
#[derive(Debug, PartialEq, Eq)]
pub struct FieldRegistry {
    /// Singular resource name, used in error messages
    pub resource: &'static str,
    pub fields: &'static [FieldSpec],
}

impl FieldRegistry {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    fn field_names(&self) -> String {
        self.fields
            .iter()
            .map(|spec| spec.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Typed value of a parsed field filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Bool(bool),
    Str(String),
    Numeric(f64),
    Datetime(DateTime<Utc>),
    Id(String),
}

/// A validated (field, operator, value) triple
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: &'static FieldSpec,
    pub operation: Operator,
    pub value: FilterValue,
}

impl FieldFilter {
    /// Parse a raw `"<op>:<value>"` (or bare `"<value>"`) for a declared field
    pub fn parse(field: &'static FieldSpec, raw: &str) -> StoreResult<Self> {
        let (operation, value) = split_operator(raw);

        let allowed = field.kind.allowed_operators();
        if !allowed.contains(&operation) {
            return Err(StoreError::InvalidArgument(format!(
                "Invalid operator '{}' for field '{}': allowed operators are [{}]",
                operation,
                field.name,
                allowed
                    .iter()
                    .map(Operator::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let value = match field.kind {
            FieldKind::Bool => FilterValue::Bool(parse_bool(field.name, value)?),
            FieldKind::Str => FilterValue::Str(value.to_string()),
            FieldKind::Numeric => FilterValue::Numeric(value.trim().parse::<f64>().map_err(
                |_| {
                    StoreError::InvalidArgument(format!(
                        "Invalid value '{}' for numeric field '{}'",
                        value, field.name
                    ))
                },
            )?),
            FieldKind::Datetime => FilterValue::Datetime(parse_datetime(field.name, value)?),
            FieldKind::Id => {
                if operation == Operator::Equals {
                    let id = Uuid::parse_str(value.trim()).map_err(|_| {
                        StoreError::InvalidArgument(format!(
                            "Invalid UUID '{}' for field '{}'",
                            value, field.name
                        ))
                    })?;
                    FilterValue::Id(id.to_string())
                } else {
                    FilterValue::Id(value.to_string())
                }
            }
        };

        Ok(Self {
            field,
            operation,
            value,
        })
    }

    /// SQL column backing this filter, `None` for derived fields
    pub fn column(&self) -> Option<&'static str> {
        match self.field.source {
            FieldSource::Column(column) => Some(column),
            FieldSource::Derived => None,
        }
    }
}

/// Split a leading recognized operator token from a raw filter value
fn split_operator(raw: &str) -> (Operator, &str) {
    if let Some((token, rest)) = raw.split_once(':')
        && let Some(op) = Operator::parse(token)
    {
        return (op, rest);
    }
    (Operator::Equals, raw)
}

fn parse_bool(field: &str, value: &str) -> StoreResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(StoreError::InvalidArgument(format!(
            "Invalid value '{}' for boolean field '{}': expected true or false",
            value, field
        ))),
    }
}

fn parse_datetime(field: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), FILTERING_DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            StoreError::InvalidArgument(format!(
                "Invalid datetime '{}' for field '{}': expected format '{}'",
                value, field, FILTERING_DATETIME_FORMAT
            ))
        })
}

/// Validated description of which rows, in what order, which page
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDescriptor {
    registry: &'static FieldRegistry,
    page: u32,
    size: u32,
    sort_by: String,
    sort_column: &'static str,
    sort_order: SortOrder,
    logical_operator: LogicalOperator,
    filters: Vec<FieldFilter>,
    raw: BTreeMap<String, String>,
}

impl FilterDescriptor {
    /// Start building a descriptor for a resource kind
    pub fn builder(registry: &'static FieldRegistry) -> FilterBuilder {
        FilterBuilder::new(registry)
    }

    /// Descriptor with defaults only: first page, default size, sorted by creation
    pub fn all(registry: &'static FieldRegistry) -> StoreResult<Self> {
        FilterBuilder::new(registry).build()
    }

    /// Build a descriptor from query-string pairs.
    ///
    /// `page`, `size`, `sort_by` and `logical_operator` are the reserved names;
    /// every other key must be a declared field.
    pub fn from_query_pairs<I, K, V>(registry: &'static FieldRegistry, pairs: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = FilterBuilder::new(registry);
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "page" => builder.page = parse_u32("page", value)?,
                "size" => builder.size = parse_u32("size", value)?,
                "sort_by" => builder.sort_by = Some(value.to_string()),
                "logical_operator" => {
                    builder.logical_operator = LogicalOperator::parse(value)?;
                }
                _ => {
                    builder.raw.insert(key.to_string(), value.to_string());
                }
            }
        }
        builder.build()
    }

    pub fn registry(&self) -> &'static FieldRegistry {
        self.registry
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of rows skipped before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.size) * u64::from(self.page - 1)
    }

    pub fn sort_column(&self) -> &'static str {
        self.sort_column
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn logical_operator(&self) -> LogicalOperator {
        self.logical_operator
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    /// Filters on column-backed fields
    pub fn column_filters(&self) -> impl Iterator<Item = &FieldFilter> {
        self.filters.iter().filter(|f| f.column().is_some())
    }

    /// Filters on derived fields
    pub fn derived_filters(&self) -> impl Iterator<Item = &FieldFilter> {
        self.filters.iter().filter(|f| f.column().is_none())
    }

    /// Filter on a specific field, if present
    pub fn filter_for(&self, field: &str) -> Option<&FieldFilter> {
        self.filters.iter().find(|f| f.field.name == field)
    }

    /// Reject a descriptor built for a different resource kind
    pub fn ensure_for(&self, registry: &'static FieldRegistry) -> StoreResult<()> {
        if std::ptr::eq(self.registry, registry) || self.registry == registry {
            Ok(())
        } else {
            Err(StoreError::InvalidArgument(format!(
                "Filter built for '{}' cannot be used to list '{}'",
                self.registry.resource, registry.resource
            )))
        }
    }

    /// Serialize back to query-string pairs, preserving raw operator prefixes
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.size.to_string()),
            ("sort_by".to_string(), self.sort_by.clone()),
            (
                "logical_operator".to_string(),
                self.logical_operator.as_str().to_string(),
            ),
        ];
        pairs.extend(self.raw.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

fn parse_u32(name: &str, value: &str) -> StoreResult<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        StoreError::InvalidArgument(format!(
            "Invalid value '{}' for '{}': expected a positive integer",
            value, name
        ))
    })
}

/// Builder collecting raw filter values before validation
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    registry: &'static FieldRegistry,
    page: u32,
    size: u32,
    sort_by: Option<String>,
    logical_operator: LogicalOperator,
    raw: BTreeMap<String, String>,
}

impl FilterBuilder {
    fn new(registry: &'static FieldRegistry) -> Self {
        Self {
            registry,
            page: 1,
            size: PAGE_SIZE_DEFAULT,
            sort_by: None,
            logical_operator: LogicalOperator::And,
            raw: BTreeMap::new(),
        }
    }

    /// Add a field filter as `"<op>:<value>"` or a bare value
    pub fn filter(mut self, field: &str, value: impl ToString) -> Self {
        self.raw.insert(field.to_string(), value.to_string());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn sort_by(mut self, sort_by: &str) -> Self {
        self.sort_by = Some(sort_by.to_string());
        self
    }

    pub fn logical_operator(mut self, op: LogicalOperator) -> Self {
        self.logical_operator = op;
        self
    }

    /// Validate everything and produce the descriptor
    pub fn build(self) -> StoreResult<FilterDescriptor> {
        if self.page < 1 {
            return Err(StoreError::InvalidArgument(format!(
                "Invalid page {}: pages start at 1",
                self.page
            )));
        }
        if self.size < 1 || self.size > PAGE_SIZE_MAXIMUM {
            return Err(StoreError::InvalidArgument(format!(
                "Invalid page size {}: must be between 1 and {}",
                self.size, PAGE_SIZE_MAXIMUM
            )));
        }

        let sort_by = self
            .sort_by
            .unwrap_or_else(|| DEFAULT_SORT_COLUMN.to_string());
        let (sort_order, sort_name) = split_sort(&sort_by, self.registry.resource);
        let sort_column = resolve_sort_column(self.registry, sort_name)?;

        let mut filters = Vec::with_capacity(self.raw.len());
        for (name, raw) in &self.raw {
            if FILTER_EXCLUDE_FIELDS.contains(&name.as_str()) {
                continue;
            }
            let spec = self.registry.field(name).ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "Unknown filter field '{}' for {}: valid fields are [{}]",
                    name,
                    self.registry.resource,
                    self.registry.field_names()
                ))
            })?;
            filters.push(FieldFilter::parse(spec, raw)?);
        }

        Ok(FilterDescriptor {
            registry: self.registry,
            page: self.page,
            size: self.size,
            sort_by,
            sort_column,
            sort_order,
            logical_operator: self.logical_operator,
            filters,
            raw: self.raw,
        })
    }
}

/// Strip an optional `asc:` / `desc:` prefix from a sort expression
fn split_sort<'a>(sort_by: &'a str, resource: &str) -> (SortOrder, &'a str) {
    match sort_by.split_once(':') {
        Some(("asc", column)) => (SortOrder::Ascending, column),
        Some(("desc", column)) => (SortOrder::Descending, column),
        Some((prefix, column)) => {
            tracing::warn!(
                resource,
                prefix,
                "Unknown sort operator, falling back to ascending order"
            );
            (SortOrder::Ascending, column)
        }
        None => (SortOrder::Ascending, sort_by),
    }
}

fn resolve_sort_column(registry: &'static FieldRegistry, name: &str) -> StoreResult<&'static str> {
    if FILTER_EXCLUDE_FIELDS.contains(&name) {
        return Err(StoreError::InvalidArgument(format!(
            "Invalid sort column '{}': pagination controls cannot be sorted on",
            name
        )));
    }
    match registry.field(name).map(|spec| spec.source) {
        Some(FieldSource::Column(column)) => Ok(column),
        Some(FieldSource::Derived) => Err(StoreError::InvalidArgument(format!(
            "Invalid sort column '{}': derived fields cannot be sorted on",
            name
        ))),
        None => Err(StoreError::InvalidArgument(format!(
            "Invalid sort column '{}' for {}: valid columns are [{}]",
            name,
            registry.resource,
            registry.field_names()
        ))),
    }
}
