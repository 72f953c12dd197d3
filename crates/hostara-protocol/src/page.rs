// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pagination for list endpoints.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;
/// Highest page number whose offset still fits in an `i64`.
pub const MAX_PAGE_NUMBER: i64 = i64::MAX / MAX_PAGE_SIZE;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    /// Build a page from untrusted query values.
    ///
    /// Numbers are kept within 1..=[`MAX_PAGE_NUMBER`], a non-positive size
    /// becomes the default and sizes above the maximum are capped.
    pub fn parse(number: Option<i64>, size: Option<i64>) -> Self {
        let number = number.unwrap_or(1).clamp(1, MAX_PAGE_NUMBER);
        let size = match size.unwrap_or(DEFAULT_PAGE_SIZE) {
            s if s <= 0 => DEFAULT_PAGE_SIZE,
            s => s.min(MAX_PAGE_SIZE),
        };
        Self { number, size }
    }

    pub fn offset(&self) -> i64 {
        (self.number.max(1) - 1).saturating_mul(self.size.max(0))
    }

    pub fn limit(&self) -> i64 {
        self.size
    }
}

/// A page of results plus navigation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDocument<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> PageDocument<T> {
    pub fn new(items: Vec<T>, page: Page, total: i64) -> Self {
        let total_pages = if total <= 0 {
            0
        } else {
            (total + page.size - 1) / page.size
        };
        Self {
            items,
            page: page.number,
            size: page.size,
            total,
            total_pages,
            has_next: page.number < total_pages,
            has_prev: page.number > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clamps() {
        assert_eq!(Page::parse(None, None), Page::default());
        assert_eq!(Page::parse(Some(0), Some(0)), Page { number: 1, size: 10 });
        assert_eq!(Page::parse(Some(-3), Some(500)), Page { number: 1, size: 100 });
        assert_eq!(Page::parse(Some(4), Some(25)), Page { number: 4, size: 25 });
    }

    #[test]
    fn test_offset() {
        assert_eq!(Page::parse(Some(1), Some(20)).offset(), 0);
        assert_eq!(Page::parse(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn test_huge_page_number_does_not_overflow() {
        let page = Page::parse(Some(i64::MAX), Some(MAX_PAGE_SIZE));
        assert_eq!(page.number, MAX_PAGE_NUMBER);
        assert_eq!(page.offset(), (MAX_PAGE_NUMBER - 1) * MAX_PAGE_SIZE);

        let raw = Page {
            number: i64::MAX,
            size: MAX_PAGE_SIZE,
        };
        assert_eq!(raw.offset(), i64::MAX);
    }

    #[test]
    fn test_document_navigation() {
        let doc = PageDocument::new(vec![1, 2, 3], Page::parse(Some(2), Some(3)), 7);
        assert_eq!(doc.total_pages, 3);
        assert!(doc.has_next);
        assert!(doc.has_prev);

        let last = PageDocument::new(vec![7], Page::parse(Some(3), Some(3)), 7);
        assert!(!last.has_next);

        let empty: PageDocument<i32> = PageDocument::new(vec![], Page::default(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }
}
