#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jsonl_viewer::api::models::{
    AnalysisSubmission, AnalysisTask, DataChunk, DataRequest, DatasetInfo, DatasetOverview,
    ExportFormat, Row, SearchRequest, SearchResponse, SubmissionStatus, TaskStatus,
};
use jsonl_viewer::api::service::DataService;
use jsonl_viewer::data::jsonl_datasource::{JsonlDataSource, LocalDataService};
use jsonl_viewer::error::{ServiceError, ServiceResult};

pub const DATASET_ID: &str = "ds1";

/// `count` rows of `{id, text}` where `text(i)` picks the text
pub fn rows(count: usize, text: impl Fn(usize) -> String) -> Vec<Row> {
    (0..count)
        .map(|i| match json!({ "id": i, "text": text(i) }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .collect()
}

pub fn task(id: &str, column: &str, status: TaskStatus, progress: f64) -> AnalysisTask {
    let mut task = AnalysisTask::pending(id, format!("Analyze column '{}'", column));
    task.status = status;
    task.progress = progress;
    task
}

pub fn http_error(status: u16) -> ServiceError {
    ServiceError::Http {
        operation: "Query",
        status,
        message: "boom".to_string(),
    }
}

#[derive(Default)]
struct Script {
    requests: Vec<DataRequest>,
    searches: Vec<SearchRequest>,
    query_failure: Option<ServiceError>,
    query_delays: VecDeque<Duration>,
    search_response: Option<ServiceResult<SearchResponse>>,
    submissions: VecDeque<ServiceResult<AnalysisSubmission>>,
    task_statuses: HashMap<String, VecDeque<ServiceResult<AnalysisTask>>>,
    status_calls: HashMap<String, usize>,
}

/// In-memory service with scripted overrides and a record of every call.
///
/// Queries and searches fall through to a real `LocalDataService` unless a
/// failure or response has been scripted.
pub struct ScriptedService {
    inner: LocalDataService,
    script: Mutex<Script>,
}

impl ScriptedService {
    pub async fn with_rows(rows: Vec<Row>) -> (Arc<Self>, DatasetInfo) {
        let inner = LocalDataService::new();
        let info = inner
            .insert(JsonlDataSource::from_rows(DATASET_ID, "test.jsonl", rows))
            .await;
        let service = Arc::new(Self {
            inner,
            script: Mutex::new(Script::default()),
        });
        (service, info)
    }

    pub fn requests(&self) -> Vec<DataRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> Option<DataRequest> {
        self.script.lock().unwrap().requests.last().cloned()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.script.lock().unwrap().searches.clone()
    }

    pub fn fail_queries(&self, error: Option<ServiceError>) {
        self.script.lock().unwrap().query_failure = error;
    }

    /// Delay the next queries, one entry per query
    pub fn delay_queries(&self, delays: &[Duration]) {
        self.script.lock().unwrap().query_delays.extend(delays);
    }

    pub fn respond_to_search(&self, response: ServiceResult<SearchResponse>) {
        self.script.lock().unwrap().search_response = Some(response);
    }

    pub fn queue_submission(&self, submission: ServiceResult<AnalysisSubmission>) {
        self.script.lock().unwrap().submissions.push_back(submission);
    }

    pub fn queue_started(&self, task_id: &str) {
        self.queue_submission(Ok(AnalysisSubmission {
            status: SubmissionStatus::Started,
            task_id: Some(task_id.to_string()),
            result: None,
        }));
    }

    /// Responses for successive status polls of `task_id`; the last one repeats
    pub fn script_task(&self, task_id: &str, statuses: Vec<ServiceResult<AnalysisTask>>) {
        self.script
            .lock()
            .unwrap()
            .task_statuses
            .insert(task_id.to_string(), statuses.into());
    }

    pub fn status_calls(&self, task_id: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .status_calls
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DataService for ScriptedService {
    async fn submit_query(&self, request: &DataRequest) -> ServiceResult<DataChunk> {
        let (failure, delay) = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request.clone());
            (script.query_failure.clone(), script.query_delays.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(err) => Err(err),
            None => self.inner.submit_query(request).await,
        }
    }

    async fn search(&self, request: &SearchRequest) -> ServiceResult<SearchResponse> {
        let scripted = {
            let mut script = self.script.lock().unwrap();
            script.searches.push(request.clone());
            script.search_response.clone()
        };
        match scripted {
            Some(response) => response,
            None => self.inner.search(request).await,
        }
    }

    async fn submit_column_analysis(
        &self,
        dataset_id: &str,
        column: &str,
    ) -> ServiceResult<AnalysisSubmission> {
        let scripted = self.script.lock().unwrap().submissions.pop_front();
        match scripted {
            Some(submission) => submission,
            None => self.inner.submit_column_analysis(dataset_id, column).await,
        }
    }

    async fn get_task_status(&self, task_id: &str) -> ServiceResult<AnalysisTask> {
        let mut script = self.script.lock().unwrap();
        *script.status_calls.entry(task_id.to_string()).or_default() += 1;
        let Some(queue) = script.task_statuses.get_mut(task_id) else {
            return Err(ServiceError::NotFound(format!("Task not found: {}", task_id)));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ServiceError::NotFound(task_id.to_string())))
        }
    }

    async fn export_data(
        &self,
        request: &DataRequest,
        format: ExportFormat,
        include_stats: bool,
    ) -> ServiceResult<Vec<u8>> {
        self.inner.export_data(request, format, include_stats).await
    }

    async fn get_dataset_info(&self, dataset_id: &str) -> ServiceResult<DatasetInfo> {
        self.inner.get_dataset_info(dataset_id).await
    }

    async fn get_dataset_overview(&self, dataset_id: &str) -> ServiceResult<DatasetOverview> {
        self.inner.get_dataset_overview(dataset_id).await
    }

    async fn load_from_path(&self, path: &str) -> ServiceResult<DatasetInfo> {
        self.inner.load_from_path(path).await
    }

    async fn search_suggestions(
        &self,
        dataset_id: &str,
        column: &str,
        prefix: &str,
    ) -> ServiceResult<Vec<String>> {
        self.inner
            .search_suggestions(dataset_id, column, prefix)
            .await
    }
}
