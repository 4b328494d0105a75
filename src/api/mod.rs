//! External API client and models
//!
//! This module handles communication with the data/analysis service
//! and defines the data models for its requests/responses.

pub mod client;
pub mod models;
pub mod service;

pub use client::ApiClient;
pub use service::DataService;
