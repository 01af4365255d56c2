pub mod classify;
pub mod comments;
pub mod executor;
pub mod log_store;
pub mod model;
pub mod repo;
pub mod run_log;
pub mod runner;
pub mod transform;

pub mod maintenance;
pub use maintenance::{StatusSyncer, SyncReport};

pub use classify::{classify, Classification, CommandKind};
pub use executor::{CommandExecutor, ExecutionResult, ShellExecutor};
pub use log_store::{LogRecord, LogStore, PgLogStore};
pub use model::{JobType, NewQueueItem, QueueItem, RunContext, StatusCd};
pub use repo::{CachedTicketStatus, QueueClient, QueueRepo, TicketStatusCache};
pub use runner::{FinishedRun, JobRunner, RunOutcome, RunnerSettings};
pub use transform::{format_runjob_command, prepare, rewrite, scrub_control_file, shell_quote, PreparedCommand};
