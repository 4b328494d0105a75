//! Request/response models shared with the data service

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A single record as returned by the service
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
    Date,
}

impl DataType {
    /// Infer the type of a JSON value (strings are never promoted to dates here)
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Boolean,
            Value::Number(_) => DataType::Number,
            Value::String(_) => DataType::String,
            Value::Array(_) => DataType::Array,
            Value::Object(_) => DataType::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
            DataType::Array => "array",
            DataType::Null => "null",
            DataType::Date => "date",
        }
    }
}

/// Schema entry for one column of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub sample_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_count: Option<usize>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            sample_values: Vec::new(),
            unique_count: None,
            null_count: None,
        }
    }
}

/// Metadata of a loaded dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub total_records: usize,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

impl DatasetInfo {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Regex,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 15] = [
        FilterOperator::Equals,
        FilterOperator::NotEquals,
        FilterOperator::Contains,
        FilterOperator::NotContains,
        FilterOperator::StartsWith,
        FilterOperator::EndsWith,
        FilterOperator::GreaterThan,
        FilterOperator::LessThan,
        FilterOperator::GreaterEqual,
        FilterOperator::LessEqual,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::IsNull,
        FilterOperator::IsNotNull,
        FilterOperator::Regex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "not_contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::LessThan => "less_than",
            FilterOperator::GreaterEqual => "greater_equal",
            FilterOperator::LessEqual => "less_equal",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::IsNull => "is_null",
            FilterOperator::IsNotNull => "is_not_null",
            FilterOperator::Regex => "regex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == s)
    }

    /// Null checks are the only operators that take no value
    pub fn requires_value(&self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

impl FilterRule {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: Option<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
            case_sensitive: None,
        }
    }

    /// The rule a column search box stands for
    pub fn contains(column: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::Contains, Some(Value::String(query.into())))
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = Some(case_sensitive);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub rules: Vec<FilterRule>,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub groups: Vec<FilterGroup>,
    #[serde(default)]
    pub global_operator: LogicalOperator,
}

impl FilterRequest {
    /// All rules of the tree, in group order
    pub fn rules(&self) -> impl Iterator<Item = &FilterRule> {
        self.groups.iter().flat_map(|g| g.rules.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRule {
    pub column: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// The canonical query sent for every page load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    #[serde(rename = "file_id")]
    pub dataset_id: String,
    pub page: usize,
    pub page_size: usize,
    #[serde(default)]
    pub sort: Vec<SortRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterRequest>,
}

impl DataRequest {
    pub fn new(dataset_id: impl Into<String>, page: usize, page_size: usize) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            page,
            page_size,
            sort: Vec::new(),
            filters: None,
        }
    }
}

/// One page of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChunk {
    pub data: Vec<Row>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_records: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl DataChunk {
    /// Build a chunk whose flags are consistent with `page_size`
    pub fn paginate(data: Vec<Row>, page: usize, page_size: usize, total_records: usize) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_records.div_ceil(page_size)
        };
        Self {
            data,
            page,
            page_size,
            total_pages,
            total_records,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub file_id: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Result of an unscoped or column search: absolute row indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matching_rows: Vec<usize>,
    pub total_matches: usize,
    pub query: String,
    #[serde(default)]
    pub execution_time_ms: f64,
}

pub type GlobalSearchResult = SearchResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Server-side view of a long-running analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
}

impl AnalysisTask {
    /// A freshly acknowledged task, before its first status poll
    pub fn pending(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            result: None,
            error: None,
            created_at: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Started,
    #[serde(alias = "completed")]
    Complete,
}

/// Acknowledgement of a column-analysis submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSubmission {
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Jsonl,
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "jsonl" => Some(ExportFormat::Jsonl),
            "csv" => Some(ExportFormat::Csv),
            "excel" | "xlsx" => Some(ExportFormat::Excel),
            _ => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Jsonl => f.write_str("jsonl"),
            ExportFormat::Csv => f.write_str("csv"),
            ExportFormat::Excel => f.write_str("excel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRequest<'a> {
    pub data_request: &'a DataRequest,
    pub format: ExportFormat,
    pub include_stats: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub range: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub q1: f64,
    pub q3: f64,
    #[serde(default)]
    pub histogram: Vec<HistogramBin>,
}

/// Typed view of a completed column analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAnalysis {
    pub column: String,
    pub data_type: String,
    pub total_records: usize,
    pub non_null_count: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    #[serde(default)]
    pub unique_count: usize,
    #[serde(default)]
    pub unique_percentage: f64,
    #[serde(default)]
    pub most_common_values: Vec<(String, usize)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_stats: Option<LengthStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_stats: Option<NumericStats>,
}

impl ColumnAnalysis {
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub total_records: usize,
    pub total_columns: usize,
    #[serde(default)]
    pub file_size: u64,
}

/// Dataset-wide quality figures. Null and empty-string cells both count as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub total_null_ratio: f64,
    pub empty_rows: usize,
    pub empty_columns: usize,
    pub completeness_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnOverview {
    pub name: String,
    pub data_type: String,
    pub null_count: usize,
    pub null_ratio: f64,
    pub unique_count: usize,
    #[serde(default)]
    pub top_values: Vec<ValueCount>,
}

/// Summary of a whole dataset: size, missing cells and per-column counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetOverview {
    pub basic_info: BasicInfo,
    pub data_quality: DataQuality,
    #[serde(default)]
    pub column_stats: Vec<ColumnOverview>,
    #[serde(default)]
    pub type_distribution: BTreeMap<String, usize>,
}

impl DatasetOverview {
    pub fn column(&self, name: &str) -> Option<&ColumnOverview> {
        self.column_stats.iter().find(|c| c.name == name)
    }
}
