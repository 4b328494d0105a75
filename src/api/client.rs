use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::models::{
    AnalysisSubmission, AnalysisTask, DataChunk, DataRequest, DatasetInfo, DatasetOverview,
    ExportFormat, ExportRequest, SearchRequest, SearchResponse,
};
use crate::api::service::DataService;
use crate::error::{ServiceError, ServiceResult};

const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Deserialize)]
struct SuggestionsResponse {
    suggestions: Vec<String>,
}

/// HTTP client for the JSONL viewer service
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// Turn a non-success status into `ServiceError::Http`, keeping the body as message
    async fn check(operation: &'static str, response: Response) -> ServiceResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("").to_string());
        warn!(target: "service", "{} returned {}: {}", operation, status, message);

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("{}: {}", operation, message)));
        }
        Err(ServiceError::Http {
            operation,
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> ServiceResult<T> {
        let response = Self::check(operation, response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl DataService for ApiClient {
    async fn submit_query(&self, request: &DataRequest) -> ServiceResult<DataChunk> {
        debug!(target: "service", "POST /data/ page={} size={}", request.page, request.page_size);
        let response = self
            .client
            .post(self.url("/data/"))
            .json(request)
            .send()
            .await?;
        Self::decode("get data", response).await
    }

    async fn search(&self, request: &SearchRequest) -> ServiceResult<SearchResponse> {
        debug!(target: "service", "POST /search/ query={:?}", request.query);
        let response = self
            .client
            .post(self.url("/search/"))
            .json(request)
            .send()
            .await?;
        Self::decode("search", response).await
    }

    async fn submit_column_analysis(
        &self,
        dataset_id: &str,
        column: &str,
    ) -> ServiceResult<AnalysisSubmission> {
        let response = self
            .client
            .post(self.url("/analysis/column"))
            .json(&json!({ "file_id": dataset_id, "column": column }))
            .send()
            .await?;
        Self::decode("analysis", response).await
    }

    async fn get_task_status(&self, task_id: &str) -> ServiceResult<AnalysisTask> {
        let response = self
            .client
            .get(self.url(&format!("/tasks/{}", task_id)))
            .send()
            .await?;
        Self::decode("get task status", response).await
    }

    async fn export_data(
        &self,
        request: &DataRequest,
        format: ExportFormat,
        include_stats: bool,
    ) -> ServiceResult<Vec<u8>> {
        let body = ExportRequest {
            data_request: request,
            format,
            include_stats,
        };
        let response = self
            .client
            .post(self.url("/export/"))
            .json(&body)
            .send()
            .await?;
        let response = Self::check("export", response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_dataset_info(&self, dataset_id: &str) -> ServiceResult<DatasetInfo> {
        let response = self
            .client
            .get(self.url(&format!("/files/{}", dataset_id)))
            .send()
            .await?;
        Self::decode("get file info", response).await
    }

    async fn get_dataset_overview(&self, dataset_id: &str) -> ServiceResult<DatasetOverview> {
        let response = self
            .client
            .get(self.url(&format!("/analysis/dataset-overview/{}", dataset_id)))
            .send()
            .await?;
        Self::decode("dataset overview", response).await
    }

    async fn load_from_path(&self, path: &str) -> ServiceResult<DatasetInfo> {
        let response = self
            .client
            .post(self.url("/files/load-path"))
            .json(&json!({ "path": path }))
            .send()
            .await?;
        Self::decode("load file", response).await
    }

    async fn search_suggestions(
        &self,
        dataset_id: &str,
        column: &str,
        prefix: &str,
    ) -> ServiceResult<Vec<String>> {
        let response = self
            .client
            .post(self.url("/search/suggestions"))
            .json(&json!({ "file_id": dataset_id, "column": column, "prefix": prefix }))
            .send()
            .await?;
        let body: SuggestionsResponse = Self::decode("get suggestions", response).await?;
        Ok(body.suggestions)
    }
}
