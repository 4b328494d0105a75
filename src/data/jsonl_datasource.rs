use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::models::{
    AnalysisSubmission, AnalysisTask, BasicInfo, ColumnAnalysis, ColumnInfo, ColumnOverview,
    DataChunk, DataQuality, DataRequest, DataType, DatasetInfo, DatasetOverview, ExportFormat, FilterOperator, FilterRequest, FilterRule,
    HistogramBin, LengthStats, LogicalOperator, NumericStats, Row, SearchRequest,
    SearchResponse, SortOrder, SubmissionStatus, ValueCount,
};
use crate::api::service::DataService;
use crate::error::{ServiceError, ServiceResult};

const SAMPLE_VALUES: usize = 5;
const HISTOGRAM_BINS: usize = 20;
const MOST_COMMON: usize = 10;
const MAX_SUGGESTIONS: usize = 10;
const OVERVIEW_TOP_VALUES: usize = 5;
const OVERVIEW_UNIQUE_CAP: usize = 10_000;

/// A JSONL file held in memory, queried with the same semantics as the service
#[derive(Debug, Clone)]
pub struct JsonlDataSource {
    id: String,
    filename: String,
    rows: Vec<Row>,
    columns: Vec<ColumnInfo>,
    file_size: u64,
}

impl JsonlDataSource {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut rows = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", idx + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line)
                .with_context(|| format!("Invalid JSON on line {}", idx + 1))?;
            match value {
                Value::Object(map) => rows.push(map),
                _ => return Err(anyhow!("Line {} is not a JSON object", idx + 1)),
            }
        }

        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        info!(target: "datasource", "Loaded {} records from {}", rows.len(), path.display());
        let mut source = Self::from_rows(dataset_id_for(&canonical.to_string_lossy()), filename, rows);
        source.file_size = file_size;
        Ok(source)
    }

    pub fn from_rows(id: impl Into<String>, filename: impl Into<String>, rows: Vec<Row>) -> Self {
        let columns = infer_columns(&rows);
        Self {
            id: id.into(),
            filename: filename.into(),
            rows,
            columns,
            file_size: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            id: self.id.clone(),
            filename: self.filename.clone(),
            total_records: self.rows.len(),
            columns: self.columns.clone(),
        }
    }

    /// Filter, search, sort and paginate
    pub fn query(&self, request: &DataRequest) -> ServiceResult<DataChunk> {
        if request.page == 0 || request.page_size == 0 {
            return Err(ServiceError::InvalidRequest(
                "page and page_size must be at least 1".to_string(),
            ));
        }

        let matched = self.matching_rows(request)?;
        let total_records = matched.len();
        let start = (request.page - 1) * request.page_size;
        let data: Vec<Row> = matched
            .into_iter()
            .skip(start)
            .take(request.page_size)
            .cloned()
            .collect();

        debug!(
            target: "datasource",
            "Query page {} returned {} of {} rows",
            request.page,
            data.len(),
            total_records
        );
        Ok(DataChunk::paginate(
            data,
            request.page,
            request.page_size,
            total_records,
        ))
    }

    /// Every row the request selects, sorted, without pagination
    pub fn matching_rows(&self, request: &DataRequest) -> ServiceResult<Vec<&Row>> {
        let compiled = match &request.filters {
            Some(filters) => Some(CompiledFilter::compile(filters)?),
            None => None,
        };
        let mut rows: Vec<&Row> = self
            .rows
            .iter()
            .filter(|row| compiled.as_ref().map_or(true, |f| f.matches(row)))
            .collect();

        if let Some(rule) = request.sort.first() {
            rows.sort_by(|a, b| {
                let ord = SortKey::of(a.get(&rule.column)).cmp(&SortKey::of(b.get(&rule.column)));
                match rule.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        Ok(rows)
    }

    /// Absolute indices of the rows matching `request.query`
    pub fn search(&self, request: &SearchRequest) -> ServiceResult<SearchResponse> {
        let started = Instant::now();
        if let Some(column) = &request.column {
            if !self.columns.iter().any(|c| &c.name == column) {
                return Err(ServiceError::NotFound(format!("Column not found: {}", column)));
            }
        }

        let matcher: Box<dyn Fn(&Value) -> bool> = if request.regex.unwrap_or(false) {
            let re = RegexBuilder::new(&request.query)
                .case_insensitive(true)
                .build()
                .map_err(|e| ServiceError::InvalidRequest(format!("Invalid regex: {}", e)))?;
            Box::new(move |v: &Value| !v.is_null() && re.is_match(&stringify(v)))
        } else {
            let needle = request.query.to_lowercase();
            Box::new(move |v: &Value| contains_ci(v, &needle))
        };

        let hits = self.rows.iter().enumerate().filter(|(_, row)| match &request.column {
            Some(column) => row.get(column).map_or(false, |v| matcher(v)),
            None => row.values().any(|v| matcher(v)),
        });

        let mut matching_rows = Vec::new();
        let mut total_matches = 0;
        for (idx, _) in hits {
            total_matches += 1;
            if request.limit.map_or(true, |limit| matching_rows.len() < limit) {
                matching_rows.push(idx);
            }
        }

        Ok(SearchResponse {
            matching_rows,
            total_matches,
            query: request.query.clone(),
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Distinct values of `column` starting with `prefix` (case-insensitive)
    pub fn suggestions(&self, column: &str, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_lowercase();
        let mut seen = BTreeSet::new();
        for row in &self.rows {
            if let Some(value) = row.get(column).filter(|v| !v.is_null()) {
                let text = stringify(value);
                if text.to_lowercase().starts_with(&prefix) {
                    seen.insert(text);
                }
            }
            if seen.len() >= MAX_SUGGESTIONS {
                break;
            }
        }
        seen.into_iter().collect()
    }

    pub fn analyze_column(&self, column: &str) -> ServiceResult<ColumnAnalysis> {
        let info = self
            .columns
            .iter()
            .find(|c| c.name == column)
            .ok_or_else(|| ServiceError::NotFound(format!("Column not found: {}", column)))?;

        let values: Vec<&Value> = self
            .rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|v| !v.is_null())
            .collect();
        let total_records = self.rows.len();
        let non_null_count = values.len();
        let null_count = total_records - non_null_count;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for value in &values {
            *counts.entry(stringify(value)).or_insert(0) += 1;
        }
        let unique_count = counts.len();
        let mut most_common: Vec<(String, usize)> = counts.into_iter().collect();
        most_common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_common.truncate(MOST_COMMON);

        let length_stats = match info.data_type {
            DataType::String => {
                let lengths: Vec<f64> = values
                    .iter()
                    .map(|v| stringify(v).chars().count() as f64)
                    .collect();
                Summary::of(&lengths).map(|s| LengthStats {
                    min: s.min,
                    max: s.max,
                    mean: s.mean,
                    median: s.median,
                    std_dev: s.std_dev,
                })
            }
            _ => None,
        };

        let numeric_stats = match info.data_type {
            DataType::Number => {
                let numbers: Vec<f64> = values.iter().filter_map(|v| as_number(v)).collect();
                Summary::of(&numbers).map(|s| NumericStats {
                    min: s.min,
                    max: s.max,
                    mean: s.mean,
                    median: s.median,
                    std_dev: s.std_dev,
                    q1: s.sorted[s.sorted.len() / 4],
                    q3: s.sorted[3 * s.sorted.len() / 4],
                    histogram: histogram(&s.sorted, HISTOGRAM_BINS),
                })
            }
            _ => None,
        };

        Ok(ColumnAnalysis {
            column: column.to_string(),
            data_type: info.data_type.as_str().to_string(),
            total_records,
            non_null_count,
            null_count,
            null_percentage: percentage(null_count, total_records),
            unique_count,
            unique_percentage: percentage(unique_count, non_null_count),
            most_common_values: most_common,
            length_stats,
            numeric_stats,
        })
    }

    /// Missing cells (absent, null or empty string) and value counts across the whole dataset
    pub fn overview(&self) -> DatasetOverview {
        let total_records = self.rows.len();
        let mut null_cells = 0;
        let mut empty_rows = 0;
        let mut nulls = vec![0usize; self.columns.len()];
        let mut counts: Vec<HashMap<String, usize>> = vec![HashMap::new(); self.columns.len()];

        for row in &self.rows {
            let mut row_nulls = 0;
            for (idx, column) in self.columns.iter().enumerate() {
                let value = row.get(&column.name);
                match value {
                    Some(value) if !is_missing(Some(value)) => {
                        let seen = &mut counts[idx];
                        let text = stringify(value);
                        if seen.len() < OVERVIEW_UNIQUE_CAP || seen.contains_key(&text) {
                            *seen.entry(text).or_insert(0) += 1;
                        }
                    }
                    _ => {
                        nulls[idx] += 1;
                        row_nulls += 1;
                    }
                }
            }
            null_cells += row_nulls;
            if row_nulls == self.columns.len() {
                empty_rows += 1;
            }
        }

        let ratio = |part: usize, whole: usize| {
            if whole == 0 {
                0.0
            } else {
                part as f64 / whole as f64
            }
        };

        let mut type_distribution = BTreeMap::new();
        let column_stats = self
            .columns
            .iter()
            .zip(nulls.iter().zip(counts))
            .map(|(column, (&null_count, counts))| {
                *type_distribution
                    .entry(column.data_type.as_str().to_string())
                    .or_insert(0) += 1;
                let unique_count = counts.len();
                let mut top: Vec<(String, usize)> = counts.into_iter().collect();
                top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                top.truncate(OVERVIEW_TOP_VALUES);
                ColumnOverview {
                    name: column.name.clone(),
                    data_type: column.data_type.as_str().to_string(),
                    null_count,
                    null_ratio: ratio(null_count, total_records),
                    unique_count,
                    top_values: top
                        .into_iter()
                        .map(|(value, count)| ValueCount { value, count })
                        .collect(),
                }
            })
            .collect::<Vec<_>>();

        let total_null_ratio = ratio(null_cells, total_records * self.columns.len());
        let empty_columns = nulls.iter().filter(|&&n| n == total_records).count();

        DatasetOverview {
            basic_info: BasicInfo {
                total_records,
                total_columns: self.columns.len(),
                file_size: self.file_size,
            },
            data_quality: DataQuality {
                total_null_ratio,
                empty_rows,
                empty_columns,
                completeness_score: 1.0 - total_null_ratio,
            },
            column_stats,
            type_distribution,
        }
    }

    /// Serialise the rows of the requested page
    pub fn export(&self, request: &DataRequest, format: ExportFormat) -> ServiceResult<Vec<u8>> {
        let chunk = self.query(request)?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_vec_pretty(&chunk.data)?),
            ExportFormat::Jsonl => {
                let mut out = Vec::new();
                for row in &chunk.data {
                    serde_json::to_writer(&mut out, row)?;
                    out.push(b'\n');
                }
                Ok(out)
            }
            ExportFormat::Csv => {
                let headers: BTreeSet<&String> =
                    chunk.data.iter().flat_map(|row| row.keys()).collect();
                let mut writer = csv::Writer::from_writer(Vec::new());
                writer.write_record(headers.iter().map(|h| h.as_str()))?;
                for row in &chunk.data {
                    writer.write_record(headers.iter().map(|h| match row.get(*h) {
                        None | Some(Value::Null) => String::new(),
                        Some(value) => stringify(value),
                    }))?;
                }
                writer
                    .into_inner()
                    .map_err(|e| ServiceError::InvalidRequest(e.to_string()))
            }
            ExportFormat::Excel => Err(ServiceError::InvalidRequest(
                "excel export is only available from the server".to_string(),
            )),
        }
    }
}

/// First 16 hex characters of the SHA-256 of `path`
pub fn dataset_id_for(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

fn infer_columns(rows: &[Row]) -> Vec<ColumnInfo> {
    let mut columns: Vec<ColumnInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        for (name, value) in row {
            let idx = *index.entry(name.clone()).or_insert_with(|| {
                columns.push(ColumnInfo::new(name.clone(), DataType::Null));
                columns.len() - 1
            });
            let column = &mut columns[idx];
            if value.is_null() {
                column.nullable = true;
                continue;
            }
            if column.data_type == DataType::Null {
                column.data_type = DataType::of(value);
            }
            if column.sample_values.len() < SAMPLE_VALUES {
                column.sample_values.push(value.clone());
            }
        }
    }

    for column in &mut columns {
        let present = rows
            .iter()
            .filter(|row| row.get(&column.name).map_or(false, |v| !v.is_null()))
            .count();
        column.null_count = Some(rows.len() - present);
        if present < rows.len() {
            column.nullable = true;
        }
    }
    columns
}

/// Text form used for comparisons: strings raw, everything else as JSON
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn contains_ci(value: &Value, needle_lower: &str) -> bool {
    !value.is_null() && stringify(value).to_lowercase().contains(needle_lower)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

struct Summary {
    sorted: Vec<f64>,
    min: f64,
    max: f64,
    mean: f64,
    median: f64,
    std_dev: f64,
}

impl Summary {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        // Sample standard deviation
        let std_dev = if n > 1 {
            (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        Some(Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            std_dev,
            sorted,
        })
    }
}

fn histogram(sorted: &[f64], bins: usize) -> Vec<HistogramBin> {
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    if min == max {
        return vec![HistogramBin {
            range: format!("{}", min),
            count: sorted.len(),
            percentage: 100.0,
        }];
    }

    let width = (max - min) / bins as f64;
    (0..bins)
        .map(|i| {
            let start = min + i as f64 * width;
            let end = start + width;
            let last = i == bins - 1;
            let count = sorted
                .iter()
                .filter(|&&v| v >= start && (v < end || last))
                .count();
            HistogramBin {
                range: format!("{:.2} - {:.2}", start, end),
                count,
                percentage: percentage(count, sorted.len()),
            }
        })
        .collect()
}

/// Sort order of a cell: nulls, then numbers, then text
#[derive(Debug, PartialEq)]
enum SortKey {
    Null,
    Number(f64),
    Text(String),
}

impl SortKey {
    fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => SortKey::Null,
            Some(v) => match as_number(v) {
                Some(n) => SortKey::Number(n),
                None => SortKey::Text(stringify(v).to_lowercase()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Null => 0,
            SortKey::Number(_) => 1,
            SortKey::Text(_) => 2,
        }
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// A filter tree with its regexes compiled up front
struct CompiledFilter<'a> {
    request: &'a FilterRequest,
    regexes: HashMap<(usize, usize), Regex>,
}

impl<'a> CompiledFilter<'a> {
    fn compile(request: &'a FilterRequest) -> ServiceResult<Self> {
        let mut regexes = HashMap::new();
        for (g, group) in request.groups.iter().enumerate() {
            for (r, rule) in group.rules.iter().enumerate() {
                if rule.operator != FilterOperator::Regex {
                    continue;
                }
                let pattern = rule.value.as_ref().map(stringify).unwrap_or_default();
                let re = RegexBuilder::new(&pattern)
                    .case_insensitive(rule.case_sensitive == Some(false))
                    .build()
                    .map_err(|e| {
                        ServiceError::InvalidRequest(format!(
                            "Invalid regex for column '{}': {}",
                            rule.column, e
                        ))
                    })?;
                regexes.insert((g, r), re);
            }
        }
        Ok(Self { request, regexes })
    }

    fn matches(&self, row: &Row) -> bool {
        let mut groups = self.request.groups.iter().enumerate().map(|(g, group)| {
            let mut rules = group
                .rules
                .iter()
                .enumerate()
                .map(|(r, rule)| self.evaluate(row, rule, self.regexes.get(&(g, r))));
            match group.logical_operator {
                LogicalOperator::And => rules.all(|m| m),
                LogicalOperator::Or => rules.any(|m| m),
            }
        });
        match self.request.global_operator {
            LogicalOperator::And => groups.all(|m| m),
            LogicalOperator::Or => groups.any(|m| m),
        }
    }

    fn evaluate(&self, row: &Row, rule: &FilterRule, regex: Option<&Regex>) -> bool {
        let field = row.get(&rule.column).filter(|v| !v.is_null());
        match (rule.operator, field) {
            (FilterOperator::IsNull, field) => field.is_none(),
            (FilterOperator::IsNotNull, field) => field.is_some(),
            (_, None) => false,
            (_, Some(field)) => compare(rule, field, regex),
        }
    }
}

/// Apply a value operator to a non-null field
fn compare(rule: &FilterRule, field: &Value, regex: Option<&Regex>) -> bool {
    let fold = rule.case_sensitive == Some(false);
    let normalize = |s: String| if fold { s.to_lowercase() } else { s };
    let text = normalize(stringify(field));
    let target = normalize(rule.value.as_ref().map(stringify).unwrap_or_default());

    match rule.operator {
        FilterOperator::Equals => text == target,
        FilterOperator::NotEquals => text != target,
        FilterOperator::Contains => text.contains(&target),
        FilterOperator::NotContains => !text.contains(&target),
        FilterOperator::StartsWith => text.starts_with(&target),
        FilterOperator::EndsWith => text.ends_with(&target),
        FilterOperator::GreaterThan
        | FilterOperator::LessThan
        | FilterOperator::GreaterEqual
        | FilterOperator::LessEqual => {
            let (Some(a), Some(b)) = (as_number(field), rule.value.as_ref().and_then(as_number))
            else {
                return false;
            };
            match rule.operator {
                FilterOperator::GreaterThan => a > b,
                FilterOperator::LessThan => a < b,
                FilterOperator::GreaterEqual => a >= b,
                _ => a <= b,
            }
        }
        FilterOperator::In | FilterOperator::NotIn => {
            let Some(Value::Array(items)) = &rule.value else {
                return false;
            };
            let found = items.iter().any(|item| normalize(stringify(item)) == text);
            (rule.operator == FilterOperator::In) == found
        }
        FilterOperator::Regex => regex.map_or(false, |re| re.is_match(&stringify(field))),
        FilterOperator::IsNull | FilterOperator::IsNotNull => false,
    }
}

/// `DataService` backed by JSONL files loaded into memory
#[derive(Default)]
pub struct LocalDataService {
    datasets: RwLock<HashMap<String, Arc<JsonlDataSource>>>,
}

impl LocalDataService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, source: JsonlDataSource) -> DatasetInfo {
        let info = source.info();
        self.datasets
            .write()
            .await
            .insert(info.id.clone(), Arc::new(source));
        info
    }

    /// Load a JSONL file and register it under its dataset id
    pub async fn open<P: AsRef<Path>>(&self, path: P) -> Result<DatasetInfo> {
        let path = path.as_ref().to_path_buf();
        let source = tokio::task::spawn_blocking(move || JsonlDataSource::load_from_file(&path))
            .await
            .context("Loader task failed")??;
        Ok(self.insert(source).await)
    }

    async fn dataset(&self, id: &str) -> ServiceResult<Arc<JsonlDataSource>> {
        self.datasets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("File not found: {}", id)))
    }
}

#[async_trait]
impl DataService for LocalDataService {
    async fn submit_query(&self, request: &DataRequest) -> ServiceResult<DataChunk> {
        self.dataset(&request.dataset_id).await?.query(request)
    }

    async fn search(&self, request: &SearchRequest) -> ServiceResult<SearchResponse> {
        self.dataset(&request.file_id).await?.search(request)
    }

    async fn submit_column_analysis(
        &self,
        dataset_id: &str,
        column: &str,
    ) -> ServiceResult<AnalysisSubmission> {
        let analysis = self.dataset(dataset_id).await?.analyze_column(column)?;
        Ok(AnalysisSubmission {
            status: SubmissionStatus::Complete,
            task_id: None,
            result: Some(serde_json::to_value(analysis)?),
        })
    }

    async fn get_task_status(&self, task_id: &str) -> ServiceResult<AnalysisTask> {
        Err(ServiceError::NotFound(format!("Task not found: {}", task_id)))
    }

    async fn export_data(
        &self,
        request: &DataRequest,
        format: ExportFormat,
        include_stats: bool,
    ) -> ServiceResult<Vec<u8>> {
        let dataset = self.dataset(&request.dataset_id).await?;
        if include_stats && format == ExportFormat::Json {
            let chunk = dataset.query(request)?;
            let body = json!({
                "data": chunk.data,
                "stats": {
                    "total_records": chunk.total_records,
                    "exported_records": chunk.data.len(),
                    "columns": dataset.info().column_names(),
                },
            });
            return Ok(serde_json::to_vec_pretty(&body)?);
        }
        dataset.export(request, format)
    }

    async fn get_dataset_info(&self, dataset_id: &str) -> ServiceResult<DatasetInfo> {
        Ok(self.dataset(dataset_id).await?.info())
    }

    async fn get_dataset_overview(&self, dataset_id: &str) -> ServiceResult<DatasetOverview> {
        Ok(self.dataset(dataset_id).await?.overview())
    }

    async fn load_from_path(&self, path: &str) -> ServiceResult<DatasetInfo> {
        self.open(path)
            .await
            .map_err(|e| ServiceError::InvalidRequest(format!("{:#}", e)))
    }

    async fn search_suggestions(
        &self,
        dataset_id: &str,
        column: &str,
        prefix: &str,
    ) -> ServiceResult<Vec<String>> {
        Ok(self.dataset(dataset_id).await?.suggestions(column, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{FilterGroup, SortRule};

    fn rows() -> Vec<Row> {
        vec![
            json!({"id": 1, "name": "Alpha", "score": 10.5, "tags": ["x"]}),
            json!({"id": 2, "name": "beta", "score": null}),
            json!({"id": 3, "name": "Gamma", "score": 3}),
            json!({"id": 4, "score": "7"}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
    }

    fn source() -> JsonlDataSource {
        JsonlDataSource::from_rows("ds", "test.jsonl", rows())
    }

    fn filtered(rules: Vec<FilterRule>) -> DataRequest {
        let mut request = DataRequest::new("ds", 1, 50);
        request.filters = Some(FilterRequest {
            groups: vec![FilterGroup {
                rules,
                logical_operator: LogicalOperator::And,
            }],
            global_operator: LogicalOperator::And,
        });
        request
    }

    fn ids(chunk: &DataChunk) -> Vec<i64> {
        chunk.data.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_schema_inference() {
        let src = source();
        let names: Vec<_> = src.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "score", "tags"]);

        let score = &src.columns()[2];
        assert_eq!(score.data_type, DataType::Number);
        assert!(score.nullable);
        assert!(!src.columns()[0].nullable);
        assert!(src.columns()[1].nullable);
    }

    #[test]
    fn test_overview_counts_missing_cells() {
        let overview = source().overview();
        assert_eq!(overview.basic_info.total_records, 4);
        assert_eq!(overview.basic_info.total_columns, 4);
        assert_eq!(overview.column("name").unwrap().null_count, 1);
        assert_eq!(overview.column("tags").unwrap().null_count, 3);
        assert_eq!(overview.column("score").unwrap().unique_count, 3);
        assert_eq!(overview.data_quality.total_null_ratio, 5.0 / 16.0);
        assert_eq!(overview.data_quality.completeness_score, 11.0 / 16.0);
        assert_eq!(overview.type_distribution["number"], 2);
        assert_eq!(overview.type_distribution["array"], 1);
    }

    #[test]
    fn test_overview_treats_empty_strings_as_missing() {
        let rows = vec![
            json!({"level": "", "code": null}),
            json!({"level": "warn", "code": 1}),
            json!({"level": "warn"}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();
        let overview = JsonlDataSource::from_rows("ds", "q.jsonl", rows).overview();

        assert_eq!(overview.data_quality.empty_rows, 1);
        assert_eq!(overview.data_quality.empty_columns, 0);
        assert_eq!(overview.data_quality.total_null_ratio, 0.5);

        let level = overview.column("level").unwrap();
        assert_eq!(level.null_count, 1);
        assert_eq!(
            level.top_values,
            vec![ValueCount {
                value: "warn".to_string(),
                count: 2
            }]
        );
        assert_eq!(overview.column("code").unwrap().null_count, 2);
    }

    #[test]
    fn test_text_filters_case_sensitive_by_default() {
        let src = source();
        let chunk = src
            .query(&filtered(vec![FilterRule::contains("name", "a")]))
            .unwrap();
        assert_eq!(ids(&chunk), vec![1, 2, 3]);

        let chunk = src
            .query(&filtered(vec![FilterRule::contains("name", "A")]))
            .unwrap();
        assert_eq!(ids(&chunk), vec![1]);

        let chunk = src
            .query(&filtered(vec![
                FilterRule::contains("name", "A").with_case_sensitive(false)
            ]))
            .unwrap();
        assert_eq!(ids(&chunk), vec![1, 2, 3]);
    }

    #[test]
    fn test_null_handling() {
        let src = source();
        let nulls = src
            .query(&filtered(vec![FilterRule::new(
                "score",
                FilterOperator::IsNull,
                None,
            )]))
            .unwrap();
        assert_eq!(ids(&nulls), vec![2]);

        let missing = src
            .query(&filtered(vec![FilterRule::new(
                "name",
                FilterOperator::NotEquals,
                Some(json!("zzz")),
            )]))
            .unwrap();
        assert_eq!(ids(&missing), vec![1, 2, 3]);
    }

    #[test]
    fn test_numeric_and_list_operators() {
        let src = source();
        let chunk = src
            .query(&filtered(vec![FilterRule::new(
                "score",
                FilterOperator::GreaterEqual,
                Some(json!(7)),
            )]))
            .unwrap();
        assert_eq!(ids(&chunk), vec![1, 4]);

        let chunk = src
            .query(&filtered(vec![FilterRule::new(
                "id",
                FilterOperator::In,
                Some(json!([1, 3])),
            )]))
            .unwrap();
        assert_eq!(ids(&chunk), vec![1, 3]);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = source()
            .query(&filtered(vec![FilterRule::new(
                "name",
                FilterOperator::Regex,
                Some(json!("(")),
            )]))
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn test_sort_nulls_then_numbers() {
        let mut request = DataRequest::new("ds", 1, 50);
        request.sort.push(SortRule {
            column: "score".to_string(),
            order: SortOrder::Asc,
        });
        let chunk = source().query(&request).unwrap();
        assert_eq!(ids(&chunk), vec![2, 3, 4, 1]);

        request.sort[0].order = SortOrder::Desc;
        let chunk = source().query(&request).unwrap();
        assert_eq!(ids(&chunk), vec![1, 4, 3, 2]);
    }

    #[test]
    fn test_pagination_uses_filtered_total() {
        let src = source();
        let mut request = filtered(vec![FilterRule::contains("name", "a")]);
        request.page_size = 2;
        let chunk = src.query(&request).unwrap();
        assert_eq!(chunk.total_records, 3);
        assert_eq!(chunk.total_pages, 2);
        assert!(chunk.has_next);

        request.page = 5;
        let past_end = src.query(&request).unwrap();
        assert!(past_end.data.is_empty());
    }

    #[test]
    fn test_search_returns_absolute_indices() {
        let response = source()
            .search(&SearchRequest {
                file_id: "ds".to_string(),
                query: "A".to_string(),
                column: Some("name".to_string()),
                regex: None,
                limit: Some(2),
            })
            .unwrap();
        assert_eq!(response.matching_rows, vec![0, 1]);
        assert_eq!(response.total_matches, 3);
    }

    #[test]
    fn test_column_analysis() {
        let analysis = source().analyze_column("score").unwrap();
        assert_eq!(analysis.total_records, 4);
        assert_eq!(analysis.null_count, 1);
        assert_eq!(analysis.non_null_count, 3);
        let numeric = analysis.numeric_stats.unwrap();
        assert_eq!(numeric.min, 3.0);
        assert_eq!(numeric.max, 10.5);
        assert_eq!(numeric.histogram.len(), HISTOGRAM_BINS);
        let binned: usize = numeric.histogram.iter().map(|b| b.count).sum();
        assert_eq!(binned, 3);

        assert!(matches!(
            source().analyze_column("nope"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_csv_export_uses_key_union() {
        let bytes = source()
            .export(&DataRequest::new("ds", 1, 2), ExportFormat::Csv)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,name,score,tags"));
        assert_eq!(lines.next(), Some("1,Alpha,10.5,\"[\"\"x\"\"]\""));
        assert_eq!(lines.next(), Some("2,beta,,"));
    }

    #[test]
    fn test_dataset_id_is_stable() {
        let id = dataset_id_for("/tmp/a.jsonl");
        assert_eq!(id.len(), 16);
        assert_eq!(id, dataset_id_for("/tmp/a.jsonl"));
        assert_ne!(id, dataset_id_for("/tmp/b.jsonl"));
    }
}
