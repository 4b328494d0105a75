//! Configuration module
//!
//! Settings for the service connection, grid defaults, analysis polling,
//! search and export, loaded from a TOML file.

pub mod config;

pub use config::Config;
