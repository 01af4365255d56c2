//! In-memory collaborators for exercising the runner without Postgres,
//! Jira or a real shell.
//!
//! # Example
//!
//! ```rust,ignore
//! use runbot::testing::{fixtures, MockQueue, MockTracker, MockLogStore, ScriptedExecutor};
//!
//! let queue = Arc::new(MockQueue::new());
//! queue.push(fixtures::queue_item(42, "PROJ-99", "runjob myReport.pl", "")).await;
//! let executor = Arc::new(ScriptedExecutor::exit_code(0));
//! // build a JobRunner from these and call run_once()
//! ```

mod mock_log_store;
mod mock_queue;
mod mock_tracker;
mod scripted_executor;

pub use mock_log_store::MockLogStore;
pub use mock_queue::MockQueue;
pub use mock_tracker::{MockTracker, TrackerCall};
pub use scripted_executor::ScriptedExecutor;

/// Test fixtures.
pub mod fixtures {
    use chrono::Utc;

    use crate::jobs::model::QueueItem;

    /// A request waiting in the queue.
    pub fn queue_item(id: i64, ticket_id: &str, command: &str, job_type: &str) -> QueueItem {
        QueueItem {
            id,
            ticket_id: Some(ticket_id.to_string()).filter(|t| !t.is_empty()),
            job_name: None,
            job_type: job_type.to_string(),
            command: Some(command.to_string()).filter(|c| !c.is_empty()),
            artifact_id: None,
            run_id: None,
            error_snippet: None,
            status_cd: "NEW".to_string(),
            jira_status: None,
            queue_ts: Utc::now(),
            execution_start_ts: None,
            execution_end_ts: None,
        }
    }
}
