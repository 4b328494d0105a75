//! Core search logic
//!
//! This module contains the global-search overlay that maps absolute match
//! indices onto the currently loaded page.

pub mod search_overlay;

pub use search_overlay::SearchOverlay;
