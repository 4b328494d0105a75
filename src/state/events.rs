//! Grid events and the invalidation each one implies

use crate::api::models::SortRule;

/// Events emitted by the grid orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// A dataset was opened and the layout initialised
    DatasetOpened { dataset_id: String, columns: usize },

    /// Sort replaced (or cleared)
    SortChanged { sort: Option<SortRule> },

    /// Structured filter set, replaced or removed
    FiltersChanged { active_rules: usize },

    /// A column search box changed; `None` means cleared
    ColumnSearchChanged {
        column: String,
        query: Option<String>,
    },

    /// A new global search result arrived
    GlobalSearchChanged { query: String, matches: usize },

    /// Global search cleared
    GlobalSearchCleared,

    /// Page navigation
    PageChanged { from: usize, to: usize },

    PageSizeChanged { page_size: usize },

    /// Column visibility, order or width changed
    LayoutChanged { op: LayoutOp },

    /// A page response was applied
    DataLoaded {
        page: usize,
        rows: usize,
        total_records: usize,
    },

    /// A page request failed; the previous data is still shown
    LoadFailed { error: String },

    AnalysisStarted {
        column: String,
        task_id: Option<String>,
    },

    AnalysisProgress { task_id: String, progress: f64 },

    AnalysisCompleted { column: String },

    AnalysisFailed { column: String, error: String },

    AnalysisCancelled { task_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutOp {
    Visibility(String),
    Order,
    Width(String),
    ShowAll,
    HideAll,
    ResetWidths,
    FitToContent,
}

/// What the grid has to redo after an event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    pub reset_page: bool,
    pub reload: bool,
}

impl Invalidation {
    pub const NONE: Invalidation = Invalidation {
        reset_page: false,
        reload: false,
    };

    pub const RELOAD: Invalidation = Invalidation {
        reset_page: false,
        reload: true,
    };

    pub const RESET_AND_RELOAD: Invalidation = Invalidation {
        reset_page: true,
        reload: true,
    };
}

impl GridEvent {
    /// Query inputs that change the meaning of the current page send the
    /// grid back to page 1; a page change or a new search result only reloads.
    pub fn invalidation(&self) -> Invalidation {
        match self {
            GridEvent::DatasetOpened { .. }
            | GridEvent::SortChanged { .. }
            | GridEvent::FiltersChanged { .. }
            | GridEvent::ColumnSearchChanged { .. }
            | GridEvent::PageSizeChanged { .. } => Invalidation::RESET_AND_RELOAD,
            GridEvent::PageChanged { .. } | GridEvent::GlobalSearchChanged { .. } => {
                Invalidation::RELOAD
            }
            _ => Invalidation::NONE,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            GridEvent::DatasetOpened { .. } => "dataset_opened",
            GridEvent::SortChanged { .. } => "sort_changed",
            GridEvent::FiltersChanged { .. } => "filters_changed",
            GridEvent::ColumnSearchChanged { .. } => "column_search_changed",
            GridEvent::GlobalSearchChanged { .. } => "global_search_changed",
            GridEvent::GlobalSearchCleared => "global_search_cleared",
            GridEvent::PageChanged { .. } => "page_changed",
            GridEvent::PageSizeChanged { .. } => "page_size_changed",
            GridEvent::LayoutChanged { .. } => "layout_changed",
            GridEvent::DataLoaded { .. } => "data_loaded",
            GridEvent::LoadFailed { .. } => "load_failed",
            GridEvent::AnalysisStarted { .. } => "analysis_started",
            GridEvent::AnalysisProgress { .. } => "analysis_progress",
            GridEvent::AnalysisCompleted { .. } => "analysis_completed",
            GridEvent::AnalysisFailed { .. } => "analysis_failed",
            GridEvent::AnalysisCancelled { .. } => "analysis_cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_changes_reset_page() {
        let events = [
            GridEvent::SortChanged { sort: None },
            GridEvent::FiltersChanged { active_rules: 1 },
            GridEvent::ColumnSearchChanged {
                column: "b".into(),
                query: None,
            },
            GridEvent::PageSizeChanged { page_size: 25 },
        ];
        for event in events {
            assert_eq!(event.invalidation(), Invalidation::RESET_AND_RELOAD, "{:?}", event);
        }
    }

    #[test]
    fn test_navigation_and_search_only_reload() {
        assert_eq!(
            GridEvent::PageChanged { from: 1, to: 2 }.invalidation(),
            Invalidation::RELOAD
        );
        assert_eq!(
            GridEvent::GlobalSearchChanged {
                query: "bar".into(),
                matches: 2
            }
            .invalidation(),
            Invalidation::RELOAD
        );
    }

    #[test]
    fn test_layout_and_results_do_not_reload() {
        assert_eq!(
            GridEvent::LayoutChanged { op: LayoutOp::HideAll }.invalidation(),
            Invalidation::NONE
        );
        assert_eq!(
            GridEvent::LoadFailed {
                error: "boom".into()
            }
            .invalidation(),
            Invalidation::NONE
        );
        assert_eq!(GridEvent::GlobalSearchCleared.invalidation(), Invalidation::NONE);
    }
}
