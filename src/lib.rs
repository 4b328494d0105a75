pub mod api;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod services;
pub mod state;
pub mod utils;

pub use api::{ApiClient, DataService};
pub use error::{ServiceError, ServiceResult};
pub use services::{GridOrchestrator, GridSettings};
