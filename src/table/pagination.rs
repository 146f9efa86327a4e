//! Page slicing and page-state bookkeeping.

use serde::Serialize;

/// Metadata describing one page of the filtered set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Current page, 1-based.
    pub page: usize,
    pub page_size: usize,
    /// `ceil(total_records / page_size)`; zero for an empty set.
    pub total_pages: usize,
    /// Filtered record count.
    pub total_records: usize,
    /// 0-based slice start.
    pub start: usize,
    /// 0-based exclusive slice end, before clamping to the record count.
    pub end: usize,
    /// 1-based first displayed row, or 0 when the set is empty.
    pub pagination_start: usize,
    /// 1-based last displayed row.
    pub pagination_end: usize,
}

impl PageInfo {
    pub fn is_first_page(&self) -> bool {
        self.page <= 1
    }

    pub fn is_last_page(&self) -> bool {
        self.page >= self.total_pages
    }
}

/// A visible slice together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub info: PageInfo,
}

/// Number of pages needed for `total` records.
pub fn total_pages(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1))
}

/// Slices `records` for the given 1-based page.
///
/// A page number of 0 is treated as 1 and a page size of 0 as 1. Pages past
/// the end yield an empty slice.
pub fn paginate<T: Clone>(records: &[T], page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total_records = records.len();

    let start = (page - 1).saturating_mul(page_size);
    let end = start.saturating_add(page_size);
    let items = if start < total_records {
        records[start..end.min(total_records)].to_vec()
    } else {
        Vec::new()
    };

    Page {
        items,
        info: PageInfo {
            page,
            page_size,
            total_pages: total_pages(total_records, page_size),
            total_records,
            start,
            end,
            pagination_start: if total_records == 0 { 0 } else { start + 1 },
            pagination_end: page.saturating_mul(page_size).min(total_records),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PageState
// ─────────────────────────────────────────────────────────────────────────────

/// Current page and page size, owned by the table controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    current_page: usize,
    page_size: usize,
}

impl PageState {
    pub fn new(page_size: usize) -> Self {
        Self {
            current_page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn reset_to_first(&mut self) {
        self.current_page = 1;
    }

    /// Moves to `page`, clamped into `[1, max(total_pages, 1)]`.
    pub fn go_to(&mut self, page: usize, total_records: usize) {
        let last = total_pages(total_records, self.page_size).max(1);
        self.current_page = page.clamp(1, last);
    }

    /// Changes the page size and returns to the first page.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.current_page = 1;
    }

    /// Snaps back to page 1 when the filtered set no longer reaches the
    /// current page. Returns true if the page changed.
    pub fn clamp_to(&mut self, total_records: usize) -> bool {
        let last = total_pages(total_records, self.page_size).max(1);
        if self.current_page > last {
            self.current_page = 1;
            true
        } else {
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
