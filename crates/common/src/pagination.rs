//! Pagination utilities shared by the service and HTTP layers
//!
//! Provides a simple `Pagination` struct, helpers to normalize inputs and the
//! `Page` wrapper returned by listing queries.

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Pagination {
    /// 1-based page index
    #[serde(default = "default_page")]
    pub page: u32,
    /// items per page
    #[serde(default = "default_per_page", alias = "limit")]
    pub per_page: u32,
}

fn default_page() -> u32 { 1 }
fn default_per_page() -> u32 { 10 }

impl Pagination {
    /// Clamp to sane defaults and convert to `u64`
    pub fn normalize(self) -> (u64, u64) {
        let page = if self.page == 0 { 1 } else { self.page };
        let per_page = self.per_page.clamp(1, 100);
        ((page - 1) as u64, per_page as u64)
    }

    /// Slice an already ordered collection to the requested page.
    pub fn slice<T>(self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let (idx, per) = self.normalize();
        let items = items
            .into_iter()
            .skip((idx * per) as usize)
            .take(per as usize)
            .collect();
        Page { items, pagination: PageInfo::new(self, total) }
    }
}

impl Default for Pagination {
    fn default() -> Self { Self { page: 1, per_page: 10 } }
}

/// Paging metadata echoed back to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u64,
    pub total_pages: u64,
    pub total: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageInfo {
    pub fn new(opts: Pagination, total: u64) -> Self {
        let (idx, per) = opts.normalize();
        let current_page = idx + 1;
        Self {
            current_page,
            total_pages: total.div_ceil(per),
            total,
            has_next: current_page * per < total,
            has_prev: current_page > 1,
        }
    }
}

/// One page of results.
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), pagination: self.pagination }
    }
}
