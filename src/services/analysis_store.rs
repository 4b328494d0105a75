use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::api::models::ColumnAnalysis;

/// Per-column analysis results, errors and loading flags.
/// Results survive task removal; they are only dropped by `clear_column`/`clear`.
#[derive(Debug, Clone, Default)]
pub struct AnalysisStore {
    analyses: HashMap<String, Value>,
    loading: HashSet<String>,
    errors: HashMap<String, String>,
    selected_column: Option<String>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a column as being analysed, dropping any stale error
    pub fn begin(&mut self, column: &str) {
        self.loading.insert(column.to_string());
        self.errors.remove(column);
    }

    pub fn commit(&mut self, column: &str, result: Value) {
        debug!(target: "analysis", "Stored analysis for '{}'", column);
        self.loading.remove(column);
        self.errors.remove(column);
        self.analyses.insert(column.to_string(), result);
    }

    pub fn fail(&mut self, column: &str, error: impl Into<String>) {
        self.loading.remove(column);
        self.errors.insert(column.to_string(), error.into());
    }

    pub fn clear_loading(&mut self, column: &str) {
        self.loading.remove(column);
    }

    pub fn clear_column(&mut self, column: &str) {
        self.analyses.remove(column);
        self.loading.remove(column);
        self.errors.remove(column);
        if self.selected_column.as_deref() == Some(column) {
            self.selected_column = None;
        }
    }

    pub fn clear(&mut self) {
        self.analyses.clear();
        self.loading.clear();
        self.errors.clear();
        self.selected_column = None;
    }

    pub fn analysis(&self, column: &str) -> Option<&Value> {
        self.analyses.get(column)
    }

    /// The result decoded as a `ColumnAnalysis`, if it has that shape
    pub fn typed_analysis(&self, column: &str) -> Option<ColumnAnalysis> {
        self.analyses.get(column).and_then(ColumnAnalysis::from_value)
    }

    pub fn analyses(&self) -> &HashMap<String, Value> {
        &self.analyses
    }

    pub fn is_loading(&self, column: &str) -> bool {
        self.loading.contains(column)
    }

    pub fn error(&self, column: &str) -> Option<&str> {
        self.errors.get(column).map(String::as_str)
    }

    pub fn select_column(&mut self, column: Option<String>) {
        self.selected_column = column;
    }

    pub fn selected_column(&self) -> Option<&str> {
        self.selected_column.as_deref()
    }
}
