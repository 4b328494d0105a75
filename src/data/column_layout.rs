use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::api::models::{ColumnInfo, Row};

pub const DEFAULT_MIN_WIDTH: u32 = 80;
pub const DEFAULT_MAX_WIDTH: u32 = 250;
pub const DEFAULT_COLUMN_WIDTH: u32 = 200;

/// Approximate pixels per character when sizing to content
const CHAR_WIDTH_PX: u32 = 8;
const CELL_PADDING_PX: u32 = 24;
const MAX_ROWS_TO_CHECK: usize = 100;

/// Inclusive pixel range a column width is clamped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidthBounds {
    pub min: u32,
    pub max: u32,
}

impl WidthBounds {
    pub fn new(min: u32, max: u32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Clamp any requested width, including negative ones
    pub fn clamp(&self, px: i64) -> u32 {
        px.clamp(self.min as i64, self.max as i64) as u32
    }
}

impl Default for WidthBounds {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_WIDTH, DEFAULT_MAX_WIDTH)
    }
}

/// Owns column visibility, order and widths for the current dataset.
///
/// `order` is the full known column order; `visible` is the ordered set of
/// shown names. Every visible name is kept present in `order`.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    visible: Vec<String>,
    order: Vec<String>,
    widths: HashMap<String, u32>,
    bounds: WidthBounds,
    default_width: u32,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self::new(WidthBounds::default(), DEFAULT_COLUMN_WIDTH)
    }
}

impl ColumnLayout {
    pub fn new(bounds: WidthBounds, default_width: u32) -> Self {
        Self {
            visible: Vec::new(),
            order: Vec::new(),
            widths: HashMap::new(),
            default_width: bounds.clamp(default_width as i64),
            bounds,
        }
    }

    /// Set up the layout for a freshly loaded dataset.
    ///
    /// Only when the current order does not cover every column are all
    /// columns made visible in schema order with the default width.
    /// Returns true if the layout was (re)initialized.
    pub fn initialize(&mut self, columns: &[ColumnInfo]) -> bool {
        let covered = !self.order.is_empty()
            && columns.iter().all(|c| self.order.iter().any(|o| o == &c.name));
        if covered {
            return false;
        }

        self.order = columns.iter().map(|c| c.name.clone()).collect();
        dedup_in_place(&mut self.order);
        self.visible = self.order.clone();
        self.widths = self
            .order
            .iter()
            .map(|name| (name.clone(), self.default_width))
            .collect();
        debug!(target: "layout", "Initialized layout with {} columns", self.order.len());
        true
    }

    /// True until a dataset has been seen or an order set
    pub fn is_unset(&self) -> bool {
        self.order.is_empty()
    }

    pub fn set_order(&mut self, names: Vec<String>) {
        self.order = names;
        dedup_in_place(&mut self.order);
        self.append_missing_visible();
    }

    pub fn set_visible(&mut self, names: Vec<String>) {
        self.visible = names;
        dedup_in_place(&mut self.visible);
        self.append_missing_visible();
    }

    /// Show a hidden column or hide a shown one. `order` is never reordered;
    /// a previously unknown name is appended to it.
    pub fn toggle_visibility(&mut self, name: &str) {
        if let Some(pos) = self.visible.iter().position(|v| v == name) {
            self.visible.remove(pos);
        } else {
            self.visible.push(name.to_string());
            self.append_missing_visible();
        }
    }

    pub fn show_all(&mut self) {
        self.visible = self.order.clone();
    }

    /// Explicit hide-all: the order stays, nothing is visible
    pub fn hide_all(&mut self) {
        self.visible.clear();
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.visible.iter().any(|v| v == name)
    }

    /// Set a width, silently clamped to the bounds. Returns the stored width.
    pub fn set_width(&mut self, name: &str, px: i64) -> u32 {
        let width = self.bounds.clamp(px);
        self.widths.insert(name.to_string(), width);
        width
    }

    pub fn width(&self, name: &str) -> u32 {
        self.widths.get(name).copied().unwrap_or(self.default_width)
    }

    pub fn reset_widths(&mut self) {
        for width in self.widths.values_mut() {
            *width = self.default_width;
        }
    }

    pub fn bounds(&self) -> WidthBounds {
        self.bounds
    }

    pub fn default_width(&self) -> u32 {
        self.default_width
    }

    /// Column order filtered to the visible set: the canonical rendering order
    pub fn ordered_visible(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.is_visible(name))
            .cloned()
            .collect()
    }

    /// Like `ordered_visible`, but with no layout yet every schema column shows
    pub fn ordered_visible_or_all(&self, columns: &[ColumnInfo]) -> Vec<String> {
        if self.is_unset() && self.visible.is_empty() {
            return columns.iter().map(|c| c.name.clone()).collect();
        }
        self.ordered_visible()
    }

    pub fn column_order(&self) -> &[String] {
        &self.order
    }

    pub fn visible_columns(&self) -> &[String] {
        &self.visible
    }

    /// Total width of the visible columns
    pub fn total_visible_width(&self) -> u32 {
        self.ordered_visible().iter().map(|n| self.width(n)).sum()
    }

    /// Move a column one slot left in the order.
    /// With wraparound: moving left from first position moves to last
    pub fn move_left(&mut self, name: &str) -> bool {
        let Some(pos) = self.order.iter().position(|o| o == name) else {
            return false;
        };
        if pos == 0 {
            let col = self.order.remove(0);
            self.order.push(col);
        } else {
            self.order.swap(pos - 1, pos);
        }
        true
    }

    /// Move a column one slot right in the order.
    /// With wraparound: moving right from last position moves to first
    pub fn move_right(&mut self, name: &str) -> bool {
        let Some(pos) = self.order.iter().position(|o| o == name) else {
            return false;
        };
        if pos + 1 == self.order.len() {
            let col = self.order.remove(pos);
            self.order.insert(0, col);
        } else {
            self.order.swap(pos, pos + 1);
        }
        true
    }

    /// Size every known column to its content, sampling rows on large pages
    pub fn fit_to_content(&mut self, rows: &[Row]) {
        let total_rows = rows.len();
        let rows_to_check: Vec<usize> = if total_rows <= MAX_ROWS_TO_CHECK {
            (0..total_rows).collect()
        } else {
            let step = total_rows / MAX_ROWS_TO_CHECK;
            (0..MAX_ROWS_TO_CHECK)
                .map(|i| (i * step).min(total_rows - 1))
                .collect()
        };

        let names = self.order.clone();
        for name in names {
            let mut max_chars = name.chars().count();
            for &row_idx in &rows_to_check {
                if let Some(value) = rows[row_idx].get(&name) {
                    max_chars = max_chars.max(display_len(value));
                }
            }
            let px = max_chars as i64 * CHAR_WIDTH_PX as i64 + CELL_PADDING_PX as i64;
            self.set_width(&name, px);
        }
    }

    fn append_missing_visible(&mut self) {
        for name in &self.visible {
            if !self.order.contains(name) {
                self.order.push(name.clone());
            }
        }
    }
}

fn display_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Null => 0,
        other => other.to_string().chars().count(),
    }
}

fn dedup_in_place(names: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    names.retain(|n| seen.insert(n.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::DataType;
    use serde_json::json;

    fn columns(names: &[&str]) -> Vec<ColumnInfo> {
        names
            .iter()
            .map(|n| ColumnInfo::new(*n, DataType::String))
            .collect()
    }

    #[test]
    fn test_initialize_only_when_order_does_not_cover() {
        let mut layout = ColumnLayout::default();
        assert!(layout.initialize(&columns(&["id", "text"])));
        layout.toggle_visibility("text");

        // Same dataset shape: user's layout survives
        assert!(!layout.initialize(&columns(&["id", "text"])));
        assert_eq!(layout.ordered_visible(), vec!["id"]);

        // New column appears: reinitialize
        assert!(layout.initialize(&columns(&["id", "text", "score"])));
        assert_eq!(layout.ordered_visible(), vec!["id", "text", "score"]);
        assert_eq!(layout.width("score"), DEFAULT_COLUMN_WIDTH);
    }

    #[test]
    fn test_toggle_preserves_order() {
        let mut layout = ColumnLayout::default();
        layout.initialize(&columns(&["a", "b", "c"]));

        layout.toggle_visibility("b");
        assert_eq!(layout.ordered_visible(), vec!["a", "c"]);
        assert_eq!(layout.column_order(), &["a", "b", "c"]);

        layout.toggle_visibility("b");
        assert_eq!(layout.ordered_visible(), vec!["a", "b", "c"]);

        layout.toggle_visibility("z");
        assert_eq!(layout.column_order(), &["a", "b", "c", "z"]);
    }

    #[test]
    fn test_hide_all_differs_from_unset() {
        let unset = ColumnLayout::default();
        assert_eq!(unset.ordered_visible_or_all(&columns(&["a", "b"])), vec!["a", "b"]);

        let mut hidden = ColumnLayout::default();
        hidden.initialize(&columns(&["a", "b"]));
        hidden.hide_all();
        assert!(hidden.ordered_visible_or_all(&columns(&["a", "b"])).is_empty());

        hidden.show_all();
        assert_eq!(hidden.ordered_visible(), vec!["a", "b"]);
    }

    #[test]
    fn test_set_visible_appends_unknown_names_to_order() {
        let mut layout = ColumnLayout::default();
        layout.set_order(vec!["a".into(), "b".into()]);
        layout.set_visible(vec!["c".into(), "a".into(), "a".into()]);
        assert_eq!(layout.column_order(), &["a", "b", "c"]);
        assert_eq!(layout.ordered_visible(), vec!["a", "c"]);
    }

    #[test]
    fn test_width_clamped() {
        let mut layout = ColumnLayout::default();
        assert_eq!(layout.set_width("a", 10), DEFAULT_MIN_WIDTH);
        assert_eq!(layout.set_width("a", -500), DEFAULT_MIN_WIDTH);
        assert_eq!(layout.set_width("a", 10_000), DEFAULT_MAX_WIDTH);
        assert_eq!(layout.set_width("a", 120), 120);

        layout.reset_widths();
        assert_eq!(layout.width("a"), DEFAULT_COLUMN_WIDTH);
    }

    #[test]
    fn test_wide_bounds() {
        let mut layout = ColumnLayout::new(WidthBounds::new(80, 800), 200);
        assert_eq!(layout.set_width("a", 600), 600);
        assert_eq!(layout.set_width("a", 900), 800);
    }

    #[test]
    fn test_move_with_wraparound() {
        let mut layout = ColumnLayout::default();
        layout.initialize(&columns(&["a", "b", "c"]));

        assert!(layout.move_left("a"));
        assert_eq!(layout.column_order(), &["b", "c", "a"]);
        assert!(layout.move_right("a"));
        assert_eq!(layout.column_order(), &["a", "b", "c"]);
        assert!(layout.move_right("b"));
        assert_eq!(layout.column_order(), &["a", "c", "b"]);
        assert!(!layout.move_left("missing"));
    }

    #[test]
    fn test_fit_to_content_stays_in_bounds() {
        let mut layout = ColumnLayout::default();
        layout.initialize(&columns(&["id", "text"]));
        let rows: Vec<Row> = vec![
            json!({"id": 1, "text": "x".repeat(500)}).as_object().unwrap().clone(),
            json!({"id": 22, "text": "short"}).as_object().unwrap().clone(),
        ];

        layout.fit_to_content(&rows);
        assert_eq!(layout.width("id"), DEFAULT_MIN_WIDTH);
        assert_eq!(layout.width("text"), DEFAULT_MAX_WIDTH);
    }
}
