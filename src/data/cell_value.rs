use serde_json::{Map, Value};
use std::fmt;

use crate::api::models::{DataType, Row};

/// Text longer than this is cut for display
pub const TRUNCATE_AT: usize = 100;

/// Text longer than this gets an expanded view
pub const LONG_CONTENT_AT: usize = 50;

/// A single cell of a record
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Boolean(bool),
    Number(serde_json::Number),
    String(String),
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl CellValue {
    /// Look up `column` in a row; a missing key reads as null
    pub fn from_row(row: &Row, column: &str) -> Self {
        row.get(column).map(CellValue::from).unwrap_or(CellValue::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, CellValue::Object(_) | CellValue::Array(_))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            CellValue::Null => DataType::Null,
            CellValue::Boolean(_) => DataType::Boolean,
            CellValue::Number(_) => DataType::Number,
            CellValue::String(_) => DataType::String,
            CellValue::Object(_) => DataType::Object,
            CellValue::Array(_) => DataType::Array,
        }
    }

    /// Full text of the cell; objects and arrays are pretty-printed JSON
    pub fn format(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::String(s) => s.clone(),
            CellValue::Object(map) => serde_json::to_string_pretty(map).unwrap_or_default(),
            CellValue::Array(items) => serde_json::to_string_pretty(items).unwrap_or_default(),
        }
    }

    /// Text for a grid cell: at most `TRUNCATE_AT` characters plus an ellipsis
    pub fn display(&self) -> String {
        truncate(&self.format(), TRUNCATE_AT)
    }

    /// Whether the grid should offer a full view of this cell
    pub fn is_expandable(&self) -> bool {
        self.is_complex() || self.format().chars().count() > LONG_CONTENT_AT
    }
}

impl From<&Value> for CellValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Boolean(*b),
            Value::Number(n) => CellValue::Number(n.clone()),
            Value::String(s) => CellValue::String(s.clone()),
            Value::Object(map) => CellValue::Object(map.clone()),
            Value::Array(items) => CellValue::Array(items.clone()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Cut `text` to `max_chars` characters, appending "..." when cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_and_missing_format_empty() {
        let row = json!({"a": null}).as_object().unwrap().clone();
        assert_eq!(CellValue::from_row(&row, "a"), CellValue::Null);
        assert_eq!(CellValue::from_row(&row, "missing"), CellValue::Null);
        assert_eq!(CellValue::Null.format(), "");
    }

    #[test]
    fn test_scalars_format_plain() {
        assert_eq!(CellValue::from(&json!(true)).format(), "true");
        assert_eq!(CellValue::from(&json!(42)).format(), "42");
        assert_eq!(CellValue::from(&json!(1.5)).format(), "1.5");
        assert_eq!(CellValue::from(&json!("hi")).format(), "hi");
    }

    #[test]
    fn test_complex_values_pretty_printed() {
        let cell = CellValue::from(&json!({"k": [1, 2]}));
        assert!(cell.is_complex());
        assert!(cell.is_expandable());
        assert!(cell.format().contains('\n'));
        assert_eq!(cell.data_type(), DataType::Object);
    }

    #[test]
    fn test_truncation_is_char_safe() {
        let long = "é".repeat(150);
        let shown = CellValue::String(long).display();
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), TRUNCATE_AT + 3);

        let short = CellValue::String("x".repeat(60));
        assert_eq!(short.display().len(), 60);
        assert!(short.is_expandable());
        assert!(!CellValue::String("x".repeat(50)).is_expandable());
    }
}
