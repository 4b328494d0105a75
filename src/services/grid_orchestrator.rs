use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::models::{
    AnalysisTask, DataChunk, DataRequest, DatasetInfo, DatasetOverview, ExportFormat, FilterRule,
    Row, SearchRequest, SortOrder, SortRule,
};
use crate::api::service::DataService;
use crate::config::config::Config;
use crate::core::search_overlay::{page_of, SearchOverlay};
use crate::data::column_layout::{
    ColumnLayout, WidthBounds, DEFAULT_COLUMN_WIDTH, DEFAULT_MAX_WIDTH, DEFAULT_MIN_WIDTH,
};
use crate::data::filter_composer::FilterComposer;
use crate::data::pagination::{Pagination, DEFAULT_PAGE_SIZE};
use crate::error::{ServiceError, ServiceResult};
use crate::services::analysis_store::AnalysisStore;
use crate::services::task_poller::{
    Submission, TaskOutcome, TaskPoller, DEFAULT_POLL_INTERVAL, DEFAULT_TASK_PREFIX,
};
use crate::state::dispatcher::{GridSubscriber, StateDispatcher};
use crate::state::events::{GridEvent, Invalidation, LayoutOp};

pub const DEFAULT_SEARCH_LIMIT: usize = 1000;

/// Tunables for a grid, usually taken from `Config`
#[derive(Debug, Clone)]
pub struct GridSettings {
    pub page_size: usize,
    pub width_bounds: WidthBounds,
    pub default_width: u32,
    pub poll_interval: Duration,
    pub task_name_prefix: String,
    pub search_limit: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            width_bounds: WidthBounds::new(DEFAULT_MIN_WIDTH, DEFAULT_MAX_WIDTH),
            default_width: DEFAULT_COLUMN_WIDTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            task_name_prefix: DEFAULT_TASK_PREFIX.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl From<&Config> for GridSettings {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.grid.page_size,
            width_bounds: WidthBounds::new(config.grid.min_column_width, config.grid.max_column_width),
            default_width: config.grid.default_column_width,
            poll_interval: Duration::from_millis(config.analysis.poll_interval_ms),
            task_name_prefix: config.analysis.task_name_prefix.clone(),
            search_limit: config.search.result_limit,
        }
    }
}

/// A data request that has been issued but not yet answered
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub seq: u64,
    pub request: DataRequest,
}

/// Composes layout, filters, pagination, global search and analysis tasks
/// into one request cycle against a `DataService`.
///
/// Every query input change goes through `emit`, which dispatches the event
/// and applies the invalidation it implies. Reloads are two-phase
/// (`prepare_request` then `apply_response`); each request carries a
/// sequence number and only the response to the newest one is applied.
pub struct GridOrchestrator {
    service: Arc<dyn DataService>,
    dataset: Option<DatasetInfo>,
    layout: ColumnLayout,
    composer: FilterComposer,
    pagination: Pagination,
    sort: Option<SortRule>,
    overlay: SearchOverlay,
    poller: TaskPoller,
    dispatcher: StateDispatcher,
    chunk: Option<DataChunk>,
    loading: bool,
    error: Option<String>,
    /// Page of the last request that failed; `retry` asks for it again
    failed_page: Option<usize>,
    request_seq: u64,
    search_limit: usize,
}

impl GridOrchestrator {
    pub fn new(service: Arc<dyn DataService>, settings: GridSettings) -> Self {
        Self {
            poller: TaskPoller::with_settings(
                Arc::clone(&service),
                settings.poll_interval,
                &settings.task_name_prefix,
            ),
            service,
            dataset: None,
            layout: ColumnLayout::new(settings.width_bounds, settings.default_width),
            composer: FilterComposer::new(),
            pagination: Pagination::new(settings.page_size),
            sort: None,
            overlay: SearchOverlay::new(),
            dispatcher: StateDispatcher::new(),
            chunk: None,
            loading: false,
            error: None,
            failed_page: None,
            request_seq: 0,
            search_limit: settings.search_limit,
        }
    }

    pub fn with_defaults(service: Arc<dyn DataService>) -> Self {
        Self::new(service, GridSettings::default())
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn GridSubscriber>) {
        self.dispatcher.subscribe(subscriber);
    }

    // ----- Dataset -----

    /// Start over on a dataset: clears query state, highlights and analyses,
    /// initialises the layout and loads page 1
    pub async fn open_dataset(&mut self, info: DatasetInfo) -> bool {
        info!(
            target: "grid",
            "Opening dataset {} ({} records, {} columns)",
            info.id,
            info.total_records,
            info.columns.len()
        );
        self.composer.clear();
        self.sort = None;
        self.overlay.clear();
        self.poller.clear();
        self.chunk = None;
        self.error = None;
        self.failed_page = None;
        self.layout.initialize(&info.columns);

        let event = GridEvent::DatasetOpened {
            dataset_id: info.id.clone(),
            columns: info.columns.len(),
        };
        self.dataset = Some(info);
        self.emit(event).await
    }

    /// Fetch dataset metadata by id and open it
    pub async fn open_dataset_by_id(&mut self, dataset_id: &str) -> ServiceResult<()> {
        let info = self.service.get_dataset_info(dataset_id).await?;
        self.open_dataset(info).await;
        Ok(())
    }

    /// Ask the service to load a file from its filesystem and open it
    pub async fn load_path(&mut self, path: &str) -> ServiceResult<()> {
        let info = self.service.load_from_path(path).await?;
        self.open_dataset(info).await;
        Ok(())
    }

    // ----- Request cycle -----

    /// The canonical request for the current inputs, without side effects
    pub fn build_request(&self) -> Option<DataRequest> {
        let dataset = self.dataset.as_ref()?;
        let mut request = DataRequest::new(
            dataset.id.clone(),
            self.pagination.page(),
            self.pagination.page_size(),
        );
        request.sort = self.sort.iter().cloned().collect();
        request.filters = self.composer.compose();
        Some(request)
    }

    /// Phase one: tag a new request and mark the grid as loading
    pub fn prepare_request(&mut self) -> Option<PendingRequest> {
        let request = self.build_request()?;
        self.request_seq += 1;
        self.loading = true;
        self.pagination.set_in_flight(true);
        debug!(
            target: "grid",
            "Request #{} page={} size={} filters={}",
            self.request_seq,
            request.page,
            request.page_size,
            self.composer.active_rule_count()
        );
        Some(PendingRequest {
            seq: self.request_seq,
            request,
        })
    }

    /// Phase two: apply a response. Responses to anything but the newest
    /// request are discarded. Returns whether the response was applied.
    pub fn apply_response(&mut self, seq: u64, result: ServiceResult<DataChunk>) -> bool {
        if seq != self.request_seq {
            debug!(
                target: "grid",
                "Discarding stale response #{} (latest #{})",
                seq,
                self.request_seq
            );
            return false;
        }

        self.loading = false;
        self.pagination.set_in_flight(false);

        match result {
            Ok(chunk) => {
                self.failed_page = None;
                self.pagination.sync(&chunk);
                self.overlay.refresh(
                    self.pagination.page(),
                    self.pagination.page_size(),
                    chunk.data.len(),
                );
                self.error = None;
                let event = GridEvent::DataLoaded {
                    page: chunk.page,
                    rows: chunk.data.len(),
                    total_records: chunk.total_records,
                };
                self.chunk = Some(chunk);
                self.dispatcher.dispatch(event);
            }
            Err(err) => {
                warn!(target: "grid", "Failed to load data: {}", err);
                let error = err.to_string();
                // The page stays on what is displayed
                let shown = self.chunk.as_ref().map(|c| c.page).unwrap_or(1);
                self.failed_page = Some(self.pagination.page());
                self.pagination.force_page(shown);
                self.error = Some(error.clone());
                self.dispatcher.dispatch(GridEvent::LoadFailed { error });
            }
        }
        true
    }

    /// Build, send and apply the current request
    pub async fn reload(&mut self) -> bool {
        let Some(pending) = self.prepare_request() else {
            return false;
        };
        let service = Arc::clone(&self.service);
        let result = service.submit_query(&pending.request).await;
        self.apply_response(pending.seq, result)
    }

    /// Request the page of the last failed load again, or the current page
    /// when nothing failed
    pub async fn retry(&mut self) -> bool {
        if self.loading {
            return false;
        }
        if let Some(page) = self.failed_page.take() {
            self.pagination.force_page(page);
        }
        self.reload().await
    }

    /// Dispatch an event and apply its page reset, without reloading
    fn notify(&mut self, event: GridEvent) -> Invalidation {
        let invalidation = event.invalidation();
        self.dispatcher.dispatch(event);
        if invalidation.reset_page {
            self.pagination.reset();
        }
        invalidation
    }

    async fn emit(&mut self, event: GridEvent) -> bool {
        if self.notify(event).reload {
            self.reload().await
        } else {
            false
        }
    }

    // ----- Sort -----

    pub async fn set_sort(&mut self, column: &str, order: SortOrder) -> bool {
        let rule = SortRule {
            column: column.to_string(),
            order,
        };
        if self.sort.as_ref() == Some(&rule) {
            return false;
        }
        self.sort = Some(rule.clone());
        self.emit(GridEvent::SortChanged { sort: Some(rule) }).await
    }

    /// Header click: ascending first, then flip
    pub async fn toggle_sort(&mut self, column: &str) -> bool {
        let order = match &self.sort {
            Some(rule) if rule.column == column => rule.order.toggle(),
            _ => SortOrder::Asc,
        };
        self.set_sort(column, order).await
    }

    pub async fn clear_sort(&mut self) -> bool {
        if self.sort.take().is_none() {
            return false;
        }
        self.emit(GridEvent::SortChanged { sort: None }).await
    }

    // ----- Filters and column searches -----

    pub async fn set_filter(&mut self, rule: FilterRule) -> bool {
        if !self.composer.set_filter(rule) {
            return false;
        }
        self.filters_changed().await
    }

    pub async fn remove_filter(&mut self, column: &str) -> bool {
        if !self.composer.remove_filter(column) {
            return false;
        }
        self.filters_changed().await
    }

    pub async fn clear_filters(&mut self) -> bool {
        if !self.composer.clear_filters() {
            return false;
        }
        self.filters_changed().await
    }

    async fn filters_changed(&mut self) -> bool {
        let active_rules = self.composer.active_rule_count();
        self.emit(GridEvent::FiltersChanged { active_rules }).await
    }

    pub async fn set_column_search(&mut self, column: &str, query: &str) -> bool {
        if !self.composer.set_column_search(column, query) {
            return false;
        }
        let query = self.composer.column_search(column).map(str::to_string);
        self.emit(GridEvent::ColumnSearchChanged {
            column: column.to_string(),
            query,
        })
        .await
    }

    pub async fn clear_column_search(&mut self, column: &str) -> bool {
        self.set_column_search(column, "").await
    }

    // ----- Global search -----

    /// Search every column and overlay the matches. An empty query is ignored;
    /// a failed search only sets the search error.
    pub async fn global_search(&mut self, query: &str) -> bool {
        if query.trim().is_empty() {
            return false;
        }
        let Some(dataset_id) = self.dataset.as_ref().map(|d| d.id.clone()) else {
            return false;
        };

        let request = SearchRequest {
            file_id: dataset_id,
            query: query.to_string(),
            column: None,
            regex: None,
            limit: Some(self.search_limit),
        };
        let service = Arc::clone(&self.service);
        match service.search(&request).await {
            Ok(result) => {
                let matches = result.matching_rows.len();
                self.overlay.set_result(result);
                if let Some(target) = self
                    .overlay
                    .jump_target(self.pagination.page(), self.pagination.page_size())
                {
                    info!(target: "grid", "Jumping to page {} for first match", target);
                    self.pagination.force_page(target);
                }
                self.emit(GridEvent::GlobalSearchChanged {
                    query: query.to_string(),
                    matches,
                })
                .await
            }
            Err(err) => {
                warn!(target: "grid", "Global search failed: {}", err);
                self.overlay.set_query(query);
                self.overlay.set_error(err.to_string());
                false
            }
        }
    }

    pub fn clear_global_search(&mut self) {
        if !self.overlay.has_result() && self.overlay.error().is_none() {
            return;
        }
        self.overlay.clear();
        self.notify(GridEvent::GlobalSearchCleared);
    }

    /// Move to the page holding the next global-search match
    pub async fn next_match(&mut self) -> Option<usize> {
        let index = self.overlay.next_match()?;
        self.show_row(index).await;
        Some(index)
    }

    pub async fn prev_match(&mut self) -> Option<usize> {
        let index = self.overlay.prev_match()?;
        self.show_row(index).await;
        Some(index)
    }

    async fn show_row(&mut self, index: usize) {
        let page = page_of(index, self.pagination.page_size());
        if page != self.pagination.page() {
            self.go_to_page(page).await;
        }
    }

    // ----- Pagination -----

    pub async fn go_to_page(&mut self, page: usize) -> bool {
        let from = self.pagination.page();
        if self.loading || !self.pagination.go_to(page) {
            return false;
        }
        self.emit(GridEvent::PageChanged { from, to: page }).await
    }

    pub async fn next_page(&mut self) -> bool {
        let from = self.pagination.page();
        if self.loading || !self.pagination.next() {
            return false;
        }
        let to = self.pagination.page();
        self.emit(GridEvent::PageChanged { from, to }).await
    }

    pub async fn prev_page(&mut self) -> bool {
        let from = self.pagination.page();
        if self.loading || !self.pagination.prev() {
            return false;
        }
        let to = self.pagination.page();
        self.emit(GridEvent::PageChanged { from, to }).await
    }

    pub async fn set_page_size(&mut self, page_size: usize) -> bool {
        if !self.pagination.set_page_size(page_size) {
            return false;
        }
        self.emit(GridEvent::PageSizeChanged { page_size }).await
    }

    // ----- Column layout -----

    pub fn toggle_column(&mut self, name: &str) {
        self.layout.toggle_visibility(name);
        self.notify(GridEvent::LayoutChanged {
            op: LayoutOp::Visibility(name.to_string()),
        });
    }

    pub fn set_visible_columns(&mut self, names: Vec<String>) {
        self.layout.set_visible(names);
        self.notify(GridEvent::LayoutChanged { op: LayoutOp::Order });
    }

    pub fn set_column_order(&mut self, names: Vec<String>) {
        self.layout.set_order(names);
        self.notify(GridEvent::LayoutChanged { op: LayoutOp::Order });
    }

    pub fn move_column_left(&mut self, name: &str) {
        if self.layout.move_left(name) {
            self.notify(GridEvent::LayoutChanged { op: LayoutOp::Order });
        }
    }

    pub fn move_column_right(&mut self, name: &str) {
        if self.layout.move_right(name) {
            self.notify(GridEvent::LayoutChanged { op: LayoutOp::Order });
        }
    }

    pub fn show_all_columns(&mut self) {
        self.layout.show_all();
        self.notify(GridEvent::LayoutChanged { op: LayoutOp::ShowAll });
    }

    pub fn hide_all_columns(&mut self) {
        self.layout.hide_all();
        self.notify(GridEvent::LayoutChanged { op: LayoutOp::HideAll });
    }

    pub fn set_column_width(&mut self, name: &str, px: i64) -> u32 {
        let width = self.layout.set_width(name, px);
        self.notify(GridEvent::LayoutChanged {
            op: LayoutOp::Width(name.to_string()),
        });
        width
    }

    pub fn reset_column_widths(&mut self) {
        self.layout.reset_widths();
        self.notify(GridEvent::LayoutChanged {
            op: LayoutOp::ResetWidths,
        });
    }

    /// Size columns to the rows on the current page
    pub fn fit_columns_to_content(&mut self) {
        let rows = self.chunk.as_ref().map(|c| c.data.as_slice()).unwrap_or(&[]);
        self.layout.fit_to_content(rows);
        self.notify(GridEvent::LayoutChanged {
            op: LayoutOp::FitToContent,
        });
    }

    /// Columns to render, in order; everything when no layout exists yet
    pub fn visible_columns(&self) -> Vec<String> {
        match &self.dataset {
            Some(dataset) => self.layout.ordered_visible_or_all(&dataset.columns),
            None => self.layout.ordered_visible(),
        }
    }

    // ----- Analysis -----

    pub async fn analyze_column(&mut self, column: &str) -> ServiceResult<Submission> {
        let dataset_id = self
            .dataset
            .as_ref()
            .map(|d| d.id.clone())
            .ok_or_else(|| ServiceError::InvalidRequest("No dataset loaded".to_string()))?;

        match self.poller.submit(&dataset_id, column).await {
            Ok(submission) => {
                let event = match &submission {
                    Submission::Completed { column } => GridEvent::AnalysisCompleted {
                        column: column.clone(),
                    },
                    Submission::Started { task_id, column } => GridEvent::AnalysisStarted {
                        column: column.clone(),
                        task_id: Some(task_id.clone()),
                    },
                };
                self.dispatcher.dispatch(event);
                Ok(submission)
            }
            Err(err) => {
                self.dispatcher.dispatch(GridEvent::AnalysisFailed {
                    column: column.to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Apply poll results that have already arrived
    pub fn poll_analysis(&mut self) -> Vec<TaskOutcome> {
        let outcomes = self.poller.poll_updates();
        for outcome in &outcomes {
            self.dispatch_outcome(outcome);
        }
        outcomes
    }

    /// Wait for the next analysis update; `None` once no task is active
    pub async fn next_analysis_update(&mut self) -> Option<TaskOutcome> {
        let outcome = self.poller.next_update().await?;
        self.dispatch_outcome(&outcome);
        Some(outcome)
    }

    pub fn cancel_analysis(&mut self, task_id: &str) -> TaskOutcome {
        let outcome = self.poller.cancel(task_id);
        self.dispatch_outcome(&outcome);
        outcome
    }

    pub fn clear_analysis(&mut self, column: &str) {
        self.poller.store_mut().clear_column(column);
    }

    pub fn select_analysis_column(&mut self, column: Option<String>) {
        self.poller.store_mut().select_column(column);
    }

    fn dispatch_outcome(&mut self, outcome: &TaskOutcome) {
        let event = match outcome {
            TaskOutcome::Progress { task_id, progress } => GridEvent::AnalysisProgress {
                task_id: task_id.clone(),
                progress: *progress,
            },
            TaskOutcome::Completed { column, .. } => GridEvent::AnalysisCompleted {
                column: column.clone(),
            },
            TaskOutcome::Failed { column, error, .. } => GridEvent::AnalysisFailed {
                column: column.clone(),
                error: error.clone(),
            },
            TaskOutcome::Cancelled { task_id, .. } => GridEvent::AnalysisCancelled {
                task_id: task_id.clone(),
            },
            TaskOutcome::Ignored => return,
        };
        self.dispatcher.dispatch(event);
    }

    // ----- Export -----

    /// Export the current canonical request
    pub async fn export(&self, format: ExportFormat, include_stats: bool) -> ServiceResult<Vec<u8>> {
        let request = self
            .build_request()
            .ok_or_else(|| ServiceError::InvalidRequest("No dataset loaded".to_string()))?;
        info!(target: "grid", "Exporting page {} as {}", request.page, format);
        self.service
            .export_data(&request, format, include_stats)
            .await
    }

    /// Autocomplete values for a column search box
    pub async fn column_suggestions(&self, column: &str, prefix: &str) -> ServiceResult<Vec<String>> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidRequest("No dataset loaded".to_string()))?;
        self.service
            .search_suggestions(&dataset.id, column, prefix)
            .await
    }

    /// Summary of the whole open dataset; filters and paging do not apply
    pub async fn dataset_overview(&self) -> ServiceResult<DatasetOverview> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidRequest("No dataset loaded".to_string()))?;
        debug!(target: "grid", "Requesting overview of {}", dataset.id);
        self.service.get_dataset_overview(&dataset.id).await
    }

    // ----- Read-only views -----

    pub fn dataset(&self) -> Option<&DatasetInfo> {
        self.dataset.as_ref()
    }

    pub fn chunk(&self) -> Option<&DataChunk> {
        self.chunk.as_ref()
    }

    pub fn rows(&self) -> &[Row] {
        self.chunk.as_ref().map(|c| c.data.as_slice()).unwrap_or(&[])
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn search_error(&self) -> Option<&str> {
        self.overlay.error()
    }

    pub fn highlighted_rows(&self) -> &[usize] {
        self.overlay.highlighted()
    }

    pub fn search_overlay(&self) -> &SearchOverlay {
        &self.overlay
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn composer(&self) -> &FilterComposer {
        &self.composer
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn sort(&self) -> Option<&SortRule> {
        self.sort.as_ref()
    }

    pub fn active_tasks(&self) -> &[AnalysisTask] {
        self.poller.active_tasks()
    }

    pub fn analyses(&self) -> &AnalysisStore {
        self.poller.store()
    }

    pub fn task_poller(&self) -> &TaskPoller {
        &self.poller
    }

    pub fn events(&self) -> &StateDispatcher {
        &self.dispatcher
    }
}
