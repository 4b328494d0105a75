use async_trait::async_trait;

use crate::api::models::{
    AnalysisSubmission, AnalysisTask, DataChunk, DataRequest, DatasetInfo, DatasetOverview,
    ExportFormat, SearchRequest, SearchResponse,
};
use crate::error::ServiceResult;

/// Trait for the remote data/analysis/export service.
///
/// The grid never talks to a transport directly; it only sees this contract,
/// so the HTTP client and the in-memory JSONL source are interchangeable.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Fetch one page for the canonical request
    async fn submit_query(&self, request: &DataRequest) -> ServiceResult<DataChunk>;

    /// Unscoped (or single column) search returning absolute row indices
    async fn search(&self, request: &SearchRequest) -> ServiceResult<SearchResponse>;

    /// Start a statistical analysis of one column
    async fn submit_column_analysis(
        &self,
        dataset_id: &str,
        column: &str,
    ) -> ServiceResult<AnalysisSubmission>;

    async fn get_task_status(&self, task_id: &str) -> ServiceResult<AnalysisTask>;

    /// Export the rows described by `request`
    async fn export_data(
        &self,
        request: &DataRequest,
        format: ExportFormat,
        include_stats: bool,
    ) -> ServiceResult<Vec<u8>>;

    async fn get_dataset_info(&self, dataset_id: &str) -> ServiceResult<DatasetInfo>;

    /// Null/unique counts per column and dataset-wide completeness
    async fn get_dataset_overview(&self, dataset_id: &str) -> ServiceResult<DatasetOverview>;

    /// Ask the service to load a file it can see on its own filesystem
    async fn load_from_path(&self, path: &str) -> ServiceResult<DatasetInfo>;

    /// Autocomplete values for a column search box
    async fn search_suggestions(
        &self,
        dataset_id: &str,
        column: &str,
        prefix: &str,
    ) -> ServiceResult<Vec<String>>;
}
