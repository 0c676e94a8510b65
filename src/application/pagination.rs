//! Offset pagination over an ordered result set.
//!
//! A requested page that cannot be parsed falls back to the first page; a
//! number past either end is clamped to the nearest existing page, so page
//! links never produce an error response.

use std::num::NonZeroU32;

/// Resolved position of one page inside a result set of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub per_page: u32,
    pub total: u64,
}

impl PageWindow {
    /// Resolve the raw `?page=` value against `total` items.
    pub fn resolve(total: u64, per_page: NonZeroU32, requested: Option<&str>) -> Self {
        let per_page_value = u64::from(per_page.get());
        let num_pages = total.div_ceil(per_page_value).max(1);

        let number = match parse_page_number(requested) {
            Some(number) if number < 1 => 1,
            Some(number) => (number as u64).min(num_pages),
            None => 1,
        };

        Self {
            number,
            num_pages,
            per_page: per_page.get(),
            total,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.number - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }

    pub fn next_number(&self) -> u64 {
        (self.number + 1).min(self.num_pages)
    }

    pub fn previous_number(&self) -> u64 {
        self.number.saturating_sub(1).max(1)
    }
}

/// Items of one page plus the window used to select them.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub window: PageWindow,
}

/// Only plain integers count; `"2.0"` or `"two"` is not a page number.
fn parse_page_number(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse::<i64>().ok()
}
