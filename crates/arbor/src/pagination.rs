//! Page-number pagination for listings.

use serde::Serialize;

use crate::error::{Error, Result};

/// Page size used when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Creates a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `page` is zero or `page_size` is
    /// outside `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, page_size: u32) -> Result<Self> {
        if page == 0 {
            return Err(Error::Validation("page must be at least 1".into()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::Validation(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, page_size })
    }

    /// A single page large enough for any realistic listing.
    #[must_use]
    pub fn all() -> Self {
        Self {
            page: 1,
            page_size: u32::MAX,
        }
    }

    /// 1-based page number.
    #[must_use]
    pub fn page(self) -> u32 {
        self.page
    }

    /// Items per page.
    #[must_use]
    pub fn page_size(self) -> u32 {
        self.page_size
    }

    /// Rows to skip.
    #[must_use]
    pub fn offset(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Rows to return.
    #[must_use]
    pub fn limit(self) -> u64 {
        u64::from(self.page_size)
    }
}

/// One page of results with navigation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Items across all pages.
    pub total_items: u64,
    /// Number of pages, at least 1.
    pub total_pages: u64,
    /// A later page exists.
    pub has_next: bool,
    /// An earlier page exists.
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Wraps `items` fetched for `request` out of `total_items`.
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total_items: u64) -> Self {
        let total_pages = total_items.div_ceil(request.limit()).max(1);
        let page = u64::from(request.page());
        Self {
            items,
            page: request.page(),
            page_size: request.page_size(),
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    /// Maps the items, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_items: self.total_items,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}
