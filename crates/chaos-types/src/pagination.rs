//! Page requests and paginated responses.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A validated request for one page of a list.
///
/// Pages are 1-based and the limit is always positive. There is no
/// `Deserialize` impl so the invariant cannot be bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PageRequest {
    page: u64,
    limit: u64,
}

impl PageRequest {
    /// Build a page request, rejecting a zero page or limit.
    pub const fn new(page: u64, limit: u64) -> Option<Self> {
        if page == 0 || limit == 0 {
            None
        } else {
            Some(Self { page, limit })
        }
    }

    /// The first page with the given limit (clamped to at least 1).
    pub const fn first(limit: u64) -> Self {
        Self {
            page: 1,
            limit: if limit == 0 { 1 } else { limit },
        }
    }

    /// 1-based page number.
    pub const fn page(self) -> u64 {
        self.page
    }

    /// Maximum items per page.
    pub const fn limit(self) -> u64 {
        self.limit
    }

    /// Number of items to skip before this page.
    pub const fn offset(self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of results plus totals for the whole filtered set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: u64,
    /// Requested page size.
    pub limit: u64,
    /// Total items across all pages.
    pub total_items: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Assemble a page from its items and the total count.
    pub const fn new(items: Vec<T>, request: PageRequest, total_items: u64) -> Self {
        Self {
            items,
            page: request.page,
            limit: request.limit,
            total_items,
            total_pages: total_items.div_ceil(request.limit),
        }
    }

    /// An empty page, used when list scoping leaves nothing visible.
    pub const fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    /// Convert every item while keeping the totals.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

/// Slice an in-memory collection into one page.
pub fn paginate<T>(all: Vec<T>, request: PageRequest) -> Page<T> {
    let total = u64::try_from(all.len()).unwrap_or(u64::MAX);
    let skip = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let take = usize::try_from(request.limit()).unwrap_or(usize::MAX);
    let items = all.into_iter().skip(skip).take(take).collect();
    Page::new(items, request, total)
}
