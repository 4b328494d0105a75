//! Data layer for the grid
//!
//! This module holds the pure state owners behind the grid (column layout,
//! filter composition, pagination), the cell value model, and the in-memory
//! JSONL data source.

pub mod cell_value;
pub mod column_layout;
pub mod filter_composer;
pub mod pagination;

// Data source modules
pub mod jsonl_datasource;

pub use cell_value::CellValue;
pub use column_layout::{ColumnLayout, WidthBounds};
pub use filter_composer::FilterComposer;
pub use pagination::Pagination;
