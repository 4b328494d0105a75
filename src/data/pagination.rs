use tracing::debug;

use crate::api::models::DataChunk;

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Current page and page size, plus the bounds reported by the last response
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    page: usize,
    page_size: usize,
    total_pages: usize,
    total_records: usize,
    has_next: bool,
    has_prev: bool,
    in_flight: bool,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            total_pages: 0,
            total_records: 0,
            has_next: false,
            has_prev: false,
            in_flight: false,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn total_records(&self) -> usize {
        self.total_records
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn has_prev(&self) -> bool {
        self.has_prev
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }

    /// Move to `page` if it lies within `[1, total_pages]` of the last response
    pub fn go_to(&mut self, page: usize) -> bool {
        if self.in_flight || page < 1 || page > self.total_pages || page == self.page {
            return false;
        }
        debug!(target: "pagination", "Page {} -> {}", self.page, page);
        self.page = page;
        true
    }

    pub fn next(&mut self) -> bool {
        if self.in_flight || !self.has_next || self.page >= self.total_pages {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn prev(&mut self) -> bool {
        if self.in_flight || !self.has_prev || self.page <= 1 {
            return false;
        }
        self.page -= 1;
        true
    }

    /// Change the page size; the page always goes back to 1. Zero is ignored.
    pub fn set_page_size(&mut self, page_size: usize) -> bool {
        if page_size == 0 {
            return false;
        }
        self.page_size = page_size;
        self.page = 1;
        true
    }

    /// Back to page 1 without touching the page size
    pub fn reset(&mut self) {
        self.page = 1;
    }

    /// Set the page directly, bypassing the range check.
    /// Used when a search jump targets a page the last response never reported.
    pub fn force_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Adopt the bounds of a fresh response
    pub fn sync(&mut self, chunk: &DataChunk) {
        self.page = chunk.page.max(1);
        self.total_pages = chunk.total_pages;
        self.total_records = chunk.total_records;
        self.has_next = chunk.has_next;
        self.has_prev = chunk.has_prev;
    }

    /// Absolute row indices covered by the current page: `[start, end)`
    pub fn page_range(&self) -> (usize, usize) {
        let start = (self.page - 1) * self.page_size;
        (start, start + self.page_size)
    }
}
