use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::models::{AnalysisTask, SubmissionStatus, TaskStatus};
use crate::api::service::DataService;
use crate::error::{ServiceError, ServiceResult};
use crate::services::analysis_store::AnalysisStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_TASK_PREFIX: &str = "Analyze column ";

const TRANSPORT_FAILURE: &str = "Failed to get analysis status";
const TASK_FAILURE: &str = "Analysis failed";

/// Sent from a poll loop back to the poller
#[derive(Debug, Clone)]
pub enum PollMessage {
    Status(AnalysisTask),
    TransportFailed { task_id: String, error: String },
}

/// What applying a poll message (or a cancel) did
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Progress {
        task_id: String,
        progress: f64,
    },
    Completed {
        task_id: String,
        column: String,
    },
    Failed {
        task_id: String,
        column: String,
        error: String,
    },
    Cancelled {
        task_id: String,
        column: String,
    },
    /// The task is no longer active; the message was dropped
    Ignored,
}

/// Result of submitting a column for analysis
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The service answered with the finished result right away
    Completed { column: String },
    /// A task was created and is being polled
    Started { task_id: String, column: String },
}

struct PollHandle {
    column: String,
    handle: JoinHandle<()>,
}

/// Tracks analysis tasks from submission to a terminal status.
///
/// Each task gets its own spawned poll loop, owned through a `JoinHandle`.
/// Loops only report over a channel; every state transition happens here,
/// when the owner drains the channel with `poll_updates` or `next_update`.
pub struct TaskPoller {
    service: Arc<dyn DataService>,
    interval: Duration,
    task_name_prefix: String,
    active: Vec<AnalysisTask>,
    polls: HashMap<String, PollHandle>,
    tx: UnboundedSender<PollMessage>,
    rx: UnboundedReceiver<PollMessage>,
    store: AnalysisStore,
}

impl TaskPoller {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Self::with_settings(service, DEFAULT_POLL_INTERVAL, DEFAULT_TASK_PREFIX)
    }

    pub fn with_settings(
        service: Arc<dyn DataService>,
        interval: Duration,
        task_name_prefix: &str,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            service,
            interval: interval.max(Duration::from_millis(1)),
            task_name_prefix: task_name_prefix.to_string(),
            active: Vec::new(),
            polls: HashMap::new(),
            tx,
            rx,
            store: AnalysisStore::new(),
        }
    }

    pub fn set_service(&mut self, service: Arc<dyn DataService>) {
        self.service = service;
    }

    /// Request analysis of `column` and start polling if the service queued it
    pub async fn submit(&mut self, dataset_id: &str, column: &str) -> ServiceResult<Submission> {
        info!(target: "poller", "Requesting analysis of column '{}'", column);
        self.store.begin(column);

        let submission = match self.service.submit_column_analysis(dataset_id, column).await {
            Ok(submission) => submission,
            Err(err) => {
                warn!(target: "poller", "Analysis submission for '{}' failed: {}", column, err);
                self.store.fail(column, format!("Failed to start analysis: {}", err));
                return Err(err);
            }
        };

        match submission.status {
            SubmissionStatus::Complete => {
                self.store
                    .commit(column, submission.result.unwrap_or(Value::Null));
                self.store.select_column(Some(column.to_string()));
                Ok(Submission::Completed {
                    column: column.to_string(),
                })
            }
            SubmissionStatus::Started => {
                let Some(task_id) = submission.task_id else {
                    let err = ServiceError::Decode("analysis started without a task id".to_string());
                    self.store.fail(column, err.to_string());
                    return Err(err);
                };
                self.track(&task_id, column);
                Ok(Submission::Started {
                    task_id,
                    column: column.to_string(),
                })
            }
        }
    }

    fn track(&mut self, task_id: &str, column: &str) {
        self.stop_polling(task_id);
        self.active.retain(|t| t.id != task_id);
        self.active.push(AnalysisTask::pending(
            task_id,
            format!("{}'{}'", self.task_name_prefix, column),
        ));

        let handle = self.spawn_poll(task_id.to_string());
        self.polls.insert(
            task_id.to_string(),
            PollHandle {
                column: column.to_string(),
                handle,
            },
        );
        debug!(target: "poller", "Polling task {} every {:?}", task_id, self.interval);
    }

    /// One sequential status request per tick; stops on a terminal status or error
    fn spawn_poll(&self, task_id: String) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.get_task_status(&task_id).await {
                    Ok(task) => {
                        let terminal = task.status.is_terminal();
                        if tx.send(PollMessage::Status(task)).is_err() || terminal {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(PollMessage::TransportFailed {
                            task_id,
                            error: err.to_string(),
                        });
                        break;
                    }
                }
            }
        })
    }

    /// Apply one message from a poll loop
    pub fn apply(&mut self, message: PollMessage) -> TaskOutcome {
        match message {
            PollMessage::Status(task) => self.apply_status(task),
            PollMessage::TransportFailed { task_id, error } => {
                if !self.is_active(&task_id) {
                    return TaskOutcome::Ignored;
                }
                warn!(target: "poller", "Status request for task {} failed: {}", task_id, error);
                let column = self.finish(&task_id);
                self.store.fail(&column, TRANSPORT_FAILURE);
                TaskOutcome::Failed {
                    task_id,
                    column,
                    error: TRANSPORT_FAILURE.to_string(),
                }
            }
        }
    }

    fn apply_status(&mut self, task: AnalysisTask) -> TaskOutcome {
        let Some(slot) = self.active.iter_mut().find(|t| t.id == task.id) else {
            debug!(target: "poller", "Dropping status for inactive task {}", task.id);
            return TaskOutcome::Ignored;
        };

        match task.status {
            TaskStatus::Pending | TaskStatus::Running => {
                let outcome = TaskOutcome::Progress {
                    task_id: task.id.clone(),
                    progress: task.progress,
                };
                *slot = task;
                outcome
            }
            TaskStatus::Completed => {
                let column = self.target_column(&task);
                self.finish(&task.id);
                info!(target: "poller", "Analysis of '{}' completed", column);
                self.store
                    .commit(&column, task.result.unwrap_or(Value::Null));
                self.store.select_column(Some(column.clone()));
                TaskOutcome::Completed {
                    task_id: task.id,
                    column,
                }
            }
            TaskStatus::Failed => {
                let column = self.target_column(&task);
                self.finish(&task.id);
                let error = task.error.unwrap_or_else(|| TASK_FAILURE.to_string());
                warn!(target: "poller", "Analysis of '{}' failed: {}", column, error);
                self.store.fail(&column, error.clone());
                TaskOutcome::Failed {
                    task_id: task.id,
                    column,
                    error,
                }
            }
            TaskStatus::Cancelled => {
                let column = self.target_column(&task);
                self.finish(&task.id);
                self.store.clear_loading(&column);
                TaskOutcome::Cancelled {
                    task_id: task.id,
                    column,
                }
            }
        }
    }

    /// Abort the poll loop and drop the task
    pub fn cancel(&mut self, task_id: &str) -> TaskOutcome {
        if !self.is_active(task_id) {
            return TaskOutcome::Ignored;
        }
        info!(target: "poller", "Cancelling task {}", task_id);
        let column = self.finish(task_id);
        self.store.clear_loading(&column);
        TaskOutcome::Cancelled {
            task_id: task_id.to_string(),
            column,
        }
    }

    /// Apply every message already waiting, without blocking
    pub fn poll_updates(&mut self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            match self.apply(message) {
                TaskOutcome::Ignored => {}
                outcome => outcomes.push(outcome),
            }
        }
        outcomes
    }

    /// Wait for the next meaningful update. `None` once nothing is active.
    pub async fn next_update(&mut self) -> Option<TaskOutcome> {
        while !self.active.is_empty() {
            let message = self.rx.recv().await?;
            match self.apply(message) {
                TaskOutcome::Ignored => continue,
                outcome => return Some(outcome),
            }
        }
        None
    }

    /// Drive every active task to a terminal status
    pub async fn run_until_idle(&mut self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_update().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Abort all polls and forget tasks and results
    pub fn clear(&mut self) {
        for (_, poll) in self.polls.drain() {
            poll.handle.abort();
        }
        self.active.clear();
        self.store.clear();
    }

    pub fn active_tasks(&self) -> &[AnalysisTask] {
        &self.active
    }

    pub fn task(&self, task_id: &str) -> Option<&AnalysisTask> {
        self.active.iter().find(|t| t.id == task_id)
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.active.iter().any(|t| t.id == task_id)
    }

    /// Whether a poll loop for `task_id` is still scheduled
    pub fn is_polling(&self, task_id: &str) -> bool {
        self.polls
            .get(task_id)
            .map_or(false, |p| !p.handle.is_finished())
    }

    pub fn store(&self) -> &AnalysisStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AnalysisStore {
        &mut self.store
    }

    /// Column named by the task, falling back to the column it was submitted for
    fn target_column(&self, task: &AnalysisTask) -> String {
        column_from_task_name(&task.name, &self.task_name_prefix)
            .or_else(|| self.polls.get(&task.id).map(|p| p.column.clone()))
            .unwrap_or_else(|| task.name.clone())
    }

    /// Stop polling and remove from the active set. Returns the task's column.
    fn finish(&mut self, task_id: &str) -> String {
        let column = self
            .polls
            .get(task_id)
            .map(|p| p.column.clone())
            .or_else(|| {
                self.task(task_id)
                    .and_then(|t| column_from_task_name(&t.name, &self.task_name_prefix))
            })
            .unwrap_or_default();
        self.stop_polling(task_id);
        self.active.retain(|t| t.id != task_id);
        column
    }

    fn stop_polling(&mut self, task_id: &str) {
        if let Some(poll) = self.polls.remove(task_id) {
            poll.handle.abort();
        }
    }
}

impl Drop for TaskPoller {
    fn drop(&mut self) {
        for (_, poll) in self.polls.drain() {
            poll.handle.abort();
        }
    }
}

/// `Analyze column 'score'` -> `score`
pub fn column_from_task_name(name: &str, prefix: &str) -> Option<String> {
    let rest = name.strip_prefix(prefix)?;
    let column = rest.trim().trim_matches(|c| c == '\'' || c == '"');
    (!column.is_empty()).then(|| column.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_from_task_name() {
        assert_eq!(
            column_from_task_name("Analyze column 'score'", DEFAULT_TASK_PREFIX),
            Some("score".to_string())
        );
        assert_eq!(
            column_from_task_name("Analyze column \"a b\"", DEFAULT_TASK_PREFIX),
            Some("a b".to_string())
        );
        assert_eq!(
            column_from_task_name("Analyze column text", DEFAULT_TASK_PREFIX),
            Some("text".to_string())
        );
        assert_eq!(column_from_task_name("Export data", DEFAULT_TASK_PREFIX), None);
        assert_eq!(column_from_task_name("Analyze column ''", DEFAULT_TASK_PREFIX), None);
    }
}
