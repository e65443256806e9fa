//! Paginated result envelope and page arithmetic

use crate::core::error::{StoreError, StoreResult};
use crate::core::filter::FilterDescriptor;
use serde::{Deserialize, Serialize};

/// A bounded slice of a filtered, sorted result set
///
/// Serialized as the list envelope every backend produces and the REST
/// backend consumes:
///
/// ```json
/// {"items": [...], "total": 42, "total_pages": 3, "index": 1, "max_size": 20}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,

    /// Total number of items matching the filter
    pub total: u64,

    /// Number of pages at this page size, at least 1
    pub total_pages: u64,

    /// 1-based index of this page
    pub index: u32,

    /// Requested page size
    pub max_size: u32,
}

/// Number of pages needed for `total` items, never less than one
pub fn total_pages(total: u64, size: u32) -> u64 {
    let size = u64::from(size.max(1));
    if total == 0 { 1 } else { total.div_ceil(size) }
}

/// Check a requested page against the result size and return the page count
pub fn check_page(page: u32, size: u32, total: u64) -> StoreResult<u64> {
    let pages = total_pages(total, size);
    if u64::from(page) > pages {
        return Err(StoreError::InvalidArgument(format!(
            "Invalid page {}: with size {} there are {} item(s), so the last valid page is {}",
            page, size, total, pages
        )));
    }
    Ok(pages)
}

impl<T> Page<T> {
    /// Empty first page for a descriptor
    pub fn empty(filter: &FilterDescriptor) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            total_pages: 1,
            index: filter.page(),
            max_size: filter.size(),
        }
    }

    /// Slice an already filtered and sorted collection in memory.
    ///
    /// Uses the same arithmetic as the SQL paginator, so both paths reject the
    /// same out-of-range pages.
    pub fn from_rows(rows: Vec<T>, filter: &FilterDescriptor) -> StoreResult<Self> {
        let total = rows.len() as u64;
        let total_pages = check_page(filter.page(), filter.size(), total)?;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let items = rows
            .into_iter()
            .skip(offset)
            .take(filter.size() as usize)
            .collect();

        Ok(Self {
            items,
            total,
            total_pages,
            index: filter.page(),
            max_size: filter.size(),
        })
    }

    /// Convert every item, keeping the metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            total_pages: self.total_pages,
            index: self.index,
            max_size: self.max_size,
        }
    }

    /// Fallible [`Page::map`]
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?,
            total: self.total,
            total_pages: self.total_pages,
            index: self.index,
            max_size: self.max_size,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a later page exists
    pub fn has_next(&self) -> bool {
        u64::from(self.index) < self.total_pages
    }
}
