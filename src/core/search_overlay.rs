//! SearchOverlay - global search results as a highlight layer over the grid
//!
//! Global search never narrows the server query. Its matches are absolute
//! row indices that are mapped onto whatever page is currently loaded.

use tracing::debug;

use crate::api::models::GlobalSearchResult;

/// Holds the last global search result and the highlights it produces
#[derive(Debug, Clone, Default)]
pub struct SearchOverlay {
    /// Last submitted query (kept even when the search failed)
    query: String,
    /// Most recent result, replaced wholesale on every search
    result: Option<GlobalSearchResult>,
    /// Error of the last search, separate from the grid's load error
    error: Option<String>,
    /// Row positions within the current page that match
    highlighted: Vec<usize>,
    /// Position in `matching_rows` for next/previous match navigation
    current_index: usize,
}

impl SearchOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    pub fn result(&self) -> Option<&GlobalSearchResult> {
        self.result.as_ref()
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }

    /// Replace the previous result; the overlay is never merged
    pub fn set_result(&mut self, result: GlobalSearchResult) {
        debug!(
            target: "search",
            "Global search '{}': {} matches ({} returned)",
            result.query,
            result.total_matches,
            result.matching_rows.len()
        );
        self.query = result.query.clone();
        self.result = Some(result);
        self.error = None;
        self.current_index = 0;
        self.highlighted.clear();
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.result = None;
        self.error = None;
        self.highlighted.clear();
        self.current_index = 0;
    }

    /// Lowest matching absolute index
    pub fn first_match(&self) -> Option<usize> {
        self.result
            .as_ref()
            .and_then(|r| r.matching_rows.iter().copied().min())
    }

    /// Page to move to when a new result arrives: the page of the first
    /// match, but only when the current page lies past it
    pub fn jump_target(&self, current_page: usize, page_size: usize) -> Option<usize> {
        let first = self.first_match()?;
        let target = page_of(first, page_size);
        (current_page > target).then_some(target)
    }

    /// Recompute highlights for the page that was just loaded
    pub fn refresh(&mut self, page: usize, page_size: usize, rows_on_page: usize) {
        self.highlighted = match &self.result {
            Some(result) => highlight_rows(&result.matching_rows, page, page_size, rows_on_page),
            None => Vec::new(),
        };
    }

    pub fn highlighted(&self) -> &[usize] {
        &self.highlighted
    }

    pub fn is_highlighted(&self, local_row: usize) -> bool {
        self.highlighted.contains(&local_row)
    }

    pub fn match_count(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.matching_rows.len())
    }

    /// Advance to the next match, wrapping at the end. Returns its absolute index.
    pub fn next_match(&mut self) -> Option<usize> {
        let rows = &self.result.as_ref()?.matching_rows;
        if rows.is_empty() {
            return None;
        }
        self.current_index = (self.current_index + 1) % rows.len();
        Some(rows[self.current_index])
    }

    /// Step back to the previous match, wrapping at the start
    pub fn prev_match(&mut self) -> Option<usize> {
        let rows = &self.result.as_ref()?.matching_rows;
        if rows.is_empty() {
            return None;
        }
        self.current_index = if self.current_index == 0 {
            rows.len() - 1
        } else {
            self.current_index - 1
        };
        Some(rows[self.current_index])
    }

    pub fn current_match(&self) -> Option<usize> {
        self.result
            .as_ref()
            .and_then(|r| r.matching_rows.get(self.current_index).copied())
    }
}

/// 1-based page holding absolute row `index`
pub fn page_of(index: usize, page_size: usize) -> usize {
    index / page_size.max(1) + 1
}

/// Map absolute matches into row positions of a loaded page.
///
/// Only matches inside `[(page-1)*page_size, page*page_size)` count, and a
/// position is kept only if the page actually returned that many rows.
pub fn highlight_rows(
    matching_rows: &[usize],
    page: usize,
    page_size: usize,
    rows_on_page: usize,
) -> Vec<usize> {
    let start = page.saturating_sub(1) * page_size;
    let end = start + page_size;
    let mut local: Vec<usize> = matching_rows
        .iter()
        .filter(|&&idx| idx >= start && idx < end)
        .map(|&idx| idx - start)
        .filter(|&pos| pos < rows_on_page)
        .collect();
    local.sort_unstable();
    local.dedup();
    local
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rows: Vec<usize>) -> GlobalSearchResult {
        GlobalSearchResult {
            total_matches: rows.len(),
            matching_rows: rows,
            query: "bar".to_string(),
            execution_time_ms: 1.0,
        }
    }

    #[test]
    fn test_highlight_intersects_page_range() {
        assert_eq!(highlight_rows(&[5, 130], 1, 50, 50), vec![5]);
        assert!(highlight_rows(&[5, 130], 2, 50, 50).is_empty());
        assert_eq!(highlight_rows(&[5, 130], 3, 50, 20), vec![0]);
    }

    #[test]
    fn test_highlight_drops_positions_past_returned_rows() {
        assert!(highlight_rows(&[140], 3, 50, 20).is_empty());
    }

    #[test]
    fn test_jump_only_when_past_first_match() {
        let mut overlay = SearchOverlay::new();
        overlay.set_result(result(vec![130, 5]));
        assert_eq!(overlay.first_match(), Some(5));
        assert_eq!(overlay.jump_target(1, 50), None);
        assert_eq!(overlay.jump_target(3, 50), Some(1));

        overlay.set_result(result(vec![130]));
        assert_eq!(overlay.jump_target(1, 50), None);
        assert_eq!(overlay.jump_target(2, 50), None);
    }

    #[test]
    fn test_empty_result_never_jumps() {
        let mut overlay = SearchOverlay::new();
        overlay.set_result(result(vec![]));
        assert_eq!(overlay.jump_target(4, 50), None);
        overlay.refresh(1, 50, 50);
        assert!(overlay.highlighted().is_empty());
    }

    #[test]
    fn test_match_navigation_wraps() {
        let mut overlay = SearchOverlay::new();
        overlay.set_result(result(vec![5, 60, 130]));
        assert_eq!(overlay.current_match(), Some(5));
        assert_eq!(overlay.next_match(), Some(60));
        assert_eq!(overlay.next_match(), Some(130));
        assert_eq!(overlay.next_match(), Some(5));
        assert_eq!(overlay.prev_match(), Some(130));
    }

    #[test]
    fn test_new_result_replaces_old() {
        let mut overlay = SearchOverlay::new();
        overlay.set_result(result(vec![1, 2]));
        overlay.refresh(1, 50, 50);
        assert_eq!(overlay.highlighted(), &[1, 2]);

        overlay.set_result(result(vec![3]));
        assert!(overlay.highlighted().is_empty());
        overlay.refresh(1, 50, 50);
        assert_eq!(overlay.highlighted(), &[3]);
    }
}
