pub mod analysis_store;
pub mod export_service;
pub mod grid_orchestrator;
pub mod task_poller;

pub use analysis_store::AnalysisStore;
pub use export_service::ExportService;
pub use grid_orchestrator::{GridOrchestrator, GridSettings, PendingRequest};
pub use task_poller::{PollMessage, Submission, TaskOutcome, TaskPoller};
