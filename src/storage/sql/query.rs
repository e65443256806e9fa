//! Translate filter descriptors into SQLite queries
//!
//! Each column-backed [`FieldFilter`] becomes one bound predicate, joined by
//! the descriptor's logical operator. String matches use `GLOB`, which is
//! case-sensitive in SQLite (unlike `LIKE`), with `*`, `?` and `[` escaped so
//! user input is always matched literally.
//!
//! Pagination counts the filtered rows first, rejects out-of-range pages and
//! then fetches one `LIMIT`/`OFFSET` slice. Queries needing a property that is
//! not a column go through [`paginate_custom`] instead: a [`CustomFetch`]
//! strategy trims the full filtered, sorted row set in memory and the page is
//! sliced with the same arithmetic.

use crate::core::error::StoreResult;
use crate::core::filter::{FieldFilter, FilterDescriptor, FilterValue, LogicalOperator, Operator, SortOrder};
use crate::core::page::{Page, check_page};
use crate::storage::sql::rows::format_timestamp;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

/// In-memory filtering step for properties that are not columns
#[async_trait]
pub trait CustomFetch<R>: Send + Sync {
    /// Receive every row matching the column predicates, in sort order, and
    /// return the rows to keep
    async fn fetch(
        &self,
        conn: &mut SqliteConnection,
        rows: Vec<R>,
        filter: &FilterDescriptor,
    ) -> StoreResult<Vec<R>>;
}

/// Escape GLOB metacharacters so the value matches literally
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("[*]"),
            '?' => escaped.push_str("[?]"),
            '[' => escaped.push_str("[[]"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// GLOB pattern for a substring operator, `None` for the other operators
fn glob_pattern(operation: Operator, value: &str) -> Option<String> {
    let value = escape_glob(value);
    match operation {
        Operator::Contains => Some(format!("*{}*", value)),
        Operator::StartsWith => Some(format!("{}*", value)),
        Operator::EndsWith => Some(format!("*{}", value)),
        _ => None,
    }
}

fn comparison(operation: Operator) -> &'static str {
    match operation {
        Operator::Gt => " > ",
        Operator::Gte => " >= ",
        Operator::Lt => " < ",
        Operator::Lte => " <= ",
        _ => " = ",
    }
}

/// Push the predicate for one filter against `column`
pub fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, filter: &FieldFilter) {
    match &filter.value {
        FilterValue::Bool(value) => {
            qb.push(column).push(" = ").push_bind(*value);
        }
        FilterValue::Str(value) => match glob_pattern(filter.operation, value) {
            Some(pattern) => {
                qb.push(column).push(" GLOB ").push_bind(pattern);
            }
            None => {
                qb.push(column).push(" = ").push_bind(value.clone());
            }
        },
        FilterValue::Numeric(value) => {
            qb.push(column)
                .push(comparison(filter.operation))
                .push_bind(*value);
        }
        FilterValue::Datetime(value) => {
            if filter.operation == Operator::Equals {
                // Filter values have second precision, stored values microseconds
                let next = *value + chrono::Duration::seconds(1);
                qb.push("(")
                    .push(column)
                    .push(" >= ")
                    .push_bind(format_timestamp(value))
                    .push(" AND ")
                    .push(column)
                    .push(" < ")
                    .push_bind(format_timestamp(&next))
                    .push(")");
            } else {
                qb.push(column)
                    .push(comparison(filter.operation))
                    .push_bind(format_timestamp(value));
            }
        }
        FilterValue::Id(value) => match glob_pattern(filter.operation, value) {
            Some(pattern) => {
                qb.push("CAST(")
                    .push(column)
                    .push(" AS TEXT) GLOB ")
                    .push_bind(pattern);
            }
            None => {
                qb.push(column).push(" = ").push_bind(value.clone());
            }
        },
    }
}

/// Push ` WHERE <predicate>` combining every column-backed filter
pub fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, filter: &FilterDescriptor) {
    qb.push(" WHERE ");

    let filters: Vec<(&str, &FieldFilter)> = filter
        .column_filters()
        .filter_map(|f| f.column().map(|column| (column, f)))
        .collect();

    if filters.is_empty() {
        // An empty OR holds for nothing, unless derived filters carry the query
        let matches_nothing =
            filter.logical_operator() == LogicalOperator::Or && filter.filters().is_empty();
        qb.push(if matches_nothing { "1 = 0" } else { "1 = 1" });
        return;
    }

    let joiner = match filter.logical_operator() {
        LogicalOperator::And => " AND ",
        LogicalOperator::Or => " OR ",
    };

    qb.push("(");
    for (i, (column, f)) in filters.into_iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_predicate(qb, column, f);
    }
    qb.push(")");
}

/// Push ` ORDER BY <column> <dir>, id ASC`
pub fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, filter: &FilterDescriptor) {
    let direction = match filter.sort_order() {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    qb.push(" ORDER BY ")
        .push(filter.sort_column())
        .push(" ")
        .push(direction)
        .push(", id ASC");
}

/// Count the rows of `table` matching the filter
pub async fn count(
    conn: &mut SqliteConnection,
    table: &str,
    filter: &FilterDescriptor,
) -> StoreResult<u64> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", table));
    push_where(&mut qb, filter);
    let total: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
    Ok(total.max(0) as u64)
}

/// One page of `table` rows, sliced by the database
pub async fn paginate<R>(
    conn: &mut SqliteConnection,
    table: &str,
    filter: &FilterDescriptor,
) -> StoreResult<Page<R>>
where
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let total = count(conn, table, filter).await?;
    let total_pages = check_page(filter.page(), filter.size(), total)?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", table));
    push_where(&mut qb, filter);
    push_order(&mut qb, filter);
    qb.push(" LIMIT ")
        .push_bind(i64::from(filter.size()))
        .push(" OFFSET ")
        .push_bind(filter.offset() as i64);

    let items = qb.build_query_as::<R>().fetch_all(&mut *conn).await?;

    tracing::debug!(
        table,
        total,
        page = filter.page(),
        returned = items.len(),
        "Paginated query"
    );

    Ok(Page {
        items,
        total,
        total_pages,
        index: filter.page(),
        max_size: filter.size(),
    })
}

/// One page of `table` rows, filtered further by `fetch` and sliced in memory
pub async fn paginate_custom<R>(
    conn: &mut SqliteConnection,
    table: &str,
    filter: &FilterDescriptor,
    fetch: &dyn CustomFetch<R>,
) -> StoreResult<Page<R>>
where
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", table));
    push_where(&mut qb, filter);
    push_order(&mut qb, filter);

    let rows = qb.build_query_as::<R>().fetch_all(&mut *conn).await?;
    let kept = fetch.fetch(conn, rows, filter).await?;

    tracing::debug!(table, kept = kept.len(), "Custom fetch");

    Page::from_rows(kept, filter)
}
