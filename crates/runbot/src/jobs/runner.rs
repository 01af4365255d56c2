use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn, Instrument};

use crate::config::Config;
use crate::error::RunbotError;
use crate::jobs::classify::{classify, Classification};
use crate::jobs::comments;
use crate::jobs::executor::{CommandExecutor, ExecutionResult};
use crate::jobs::log_store::{LogRecord, LogStore};
use crate::jobs::maintenance::StatusSyncer;
use crate::jobs::model::{JobType, QueueItem, RunContext, StatusCd};
use crate::jobs::repo::QueueClient;
use crate::jobs::run_log::RunLog;
use crate::jobs::transform::{rewrite, PreparedCommand};
use crate::tracker::{IssueTracker, STATUS_DONE, STATUS_FAILED, STATUS_IN_PROGRESS};

/// The parts of `Config` the runner needs.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub user: String,
    pub production: bool,
    pub scheduled: bool,
    pub log_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub artifact_url: String,
    pub log_portal_url: String,
}

impl RunnerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            user: cfg.user.clone(),
            production: cfg.production,
            scheduled: cfg.scheduled,
            log_dir: cfg.log_dir.clone(),
            scratch_dir: cfg.scratch_dir.clone(),
            artifact_url: cfg.artifact_url.clone(),
            log_portal_url: cfg.log_portal_url.clone(),
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Queue had nothing in NEW.
    NoWork,
    /// Operator-input problem; the request was not run.
    Rejected { id: i64, reason: RunbotError },
    Finished(FinishedRun),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedRun {
    pub id: i64,
    pub ticket_id: String,
    pub status: StatusCd,
    /// The command as executed, after transformation (None if preparation failed).
    pub executed_command: Option<String>,
    pub log_path: Option<PathBuf>,
}

/// A request that passed validation: it has a command and a real ticket.
#[derive(Debug, Clone)]
struct Validated {
    item: QueueItem,
    command: String,
    ticket_id: String,
}

/// Result of the execute step, before anything is persisted.
#[derive(Debug)]
struct Executed {
    /// None only when the command could not be classified at all.
    classification: Option<Classification>,
    prepared: Option<PreparedCommand>,
    outcome: Result<ExecutionResult, RunbotError>,
    log: Option<RunLog>,
}

impl Executed {
    fn status(&self) -> StatusCd {
        final_status(&self.outcome)
    }

    fn output(&self) -> String {
        match &self.outcome {
            Ok(res) => res.combined_output.clone(),
            Err(e) => e.to_string(),
        }
    }
}

/// COMPLETE only for a clean zero exit; anything else, including a command
/// that could not be prepared or launched, is ERROR.
pub fn final_status(outcome: &Result<ExecutionResult, RunbotError>) -> StatusCd {
    match outcome {
        Ok(res) if res.succeeded() => StatusCd::Complete,
        _ => StatusCd::Error,
    }
}

#[derive(Clone)]
pub struct JobRunner {
    queue: Arc<dyn QueueClient>,
    tracker: Arc<dyn IssueTracker>,
    log_store: Arc<dyn LogStore>,
    executor: Arc<dyn CommandExecutor>,
    syncer: StatusSyncer,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        tracker: Arc<dyn IssueTracker>,
        log_store: Arc<dyn LogStore>,
        executor: Arc<dyn CommandExecutor>,
        syncer: StatusSyncer,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            queue,
            tracker,
            log_store,
            executor,
            syncer,
            settings,
        }
    }

    /// Dequeue and fully process at most one request.
    ///
    /// Errors returned from here are infrastructure faults (the queue could not
    /// be read). Job failures are reported through the ticket and the queue row
    /// and come back as `RunOutcome::Finished` with `StatusCd::Error`.
    pub async fn run_once(&self) -> anyhow::Result<RunOutcome> {
        info!("accessing queue to find next open request");
        let Some(item) = self.queue.fetch_next(None).await? else {
            info!("========= NO RUNJOB ITEMS FOUND =========");
            return Ok(RunOutcome::NoWork);
        };

        let id = item.id;
        let validated = match self.validate(item).await {
            Ok(v) => v,
            Err(reason) => {
                error!(runbot_id = id, error = %reason, "request rejected; fix the request data and retry");
                return Ok(RunOutcome::Rejected { id, reason });
            }
        };

        let span = tracing::info_span!("run", runbot_id = id, ticket = %validated.ticket_id);
        self.process(validated).instrument(span).await
    }

    async fn validate(&self, item: QueueItem) -> Result<Validated, RunbotError> {
        let command = item
            .command()
            .ok_or(RunbotError::MissingCommand(item.id))?
            .to_string();

        let ticket_id = item.ticket_id.as_deref().map(str::trim).unwrap_or_default();
        info!(ticket = ticket_id, "validating tracker key");
        if !self.tracker.is_valid_key(ticket_id).await {
            return Err(RunbotError::InvalidTicketKey(ticket_id.to_string()));
        }
        let ticket_id = ticket_id.to_string();

        Ok(Validated {
            item,
            command,
            ticket_id,
        })
    }

    async fn process(&self, run: Validated) -> anyhow::Result<RunOutcome> {
        let ctx = RunContext::new(
            run.item.id,
            Some(run.ticket_id.clone()),
            self.settings.production,
        );
        let is_rerun = run.item.job_type().is_rerun();
        let job_name = run.item.job_name.clone();

        info!(
            "--- RUNBOT run, triggered by {}. Scheduled run: {} ---",
            ctx.ticket_or_placeholder(),
            if self.settings.scheduled { "TRUE" } else { "FALSE" }
        );

        self.start(&run, is_rerun, job_name.as_deref()).await;

        let executed = self.execute(&run.command, &ctx).await;
        let status = executed.status();

        if let Some(classification) = executed
            .classification
            .as_ref()
            .filter(|c| c.kind.persists_output())
        {
            self.persist_output(&run, classification, &executed).await;
        }

        if let Err(e) = self.queue.update_status(ctx.item_id, status).await {
            error!(error = %e, status = %status, "failed to update status_cd");
        }

        // Downstream systems may have filled in artifact/run ids or an error
        // snippet while the job ran.
        let refreshed = match self.queue.fetch_next(Some(ctx.item_id)).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!("request vanished before closing; using in-memory copy");
                run.item.clone()
            }
            Err(e) => {
                warn!(error = %e, "could not re-read request; using in-memory copy");
                run.item.clone()
            }
        };

        self.finish(&run, &refreshed, is_rerun, job_name.as_deref(), status)
            .await;

        let log_path = executed.log.as_ref().map(|l| l.path().to_path_buf());
        match status {
            StatusCd::Complete => info!(status = %status, "Runbot execution ends"),
            _ => error!(status = %status, "Runbot execution ends"),
        }
        if let Some(path) = &log_path {
            info!(path = %path.display(), "logfile available");
        }

        Ok(RunOutcome::Finished(FinishedRun {
            id: ctx.item_id,
            ticket_id: run.ticket_id.clone(),
            status,
            executed_command: executed.prepared.map(|p| p.command),
            log_path,
        }))
    }

    /// Assign, announce and mark the request RUNNING.
    async fn start(&self, run: &Validated, is_rerun: bool, job_name: Option<&str>) {
        let ticket = run.ticket_id.as_str();

        if !is_rerun {
            info!(ticket, user = %self.settings.user, "assigning ticket");
            if let Err(e) = self.tracker.assign(ticket, &self.settings.user).await {
                error!(ticket, error = %e, "failed to assign ticket");
            }
        }

        self.comment(ticket, &comments::begins(&run.command, job_name))
            .await;

        if !is_rerun {
            self.transition(ticket, STATUS_IN_PROGRESS).await;
        }

        if let Err(e) = self.queue.update_status(run.item.id, StatusCd::Running).await {
            error!(error = %e, "failed to update status_cd to RUNNING");
        }
    }

    async fn execute(&self, command: &str, ctx: &RunContext) -> Executed {
        let classification = match classify(command, ctx) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "could not classify command");
                return Executed {
                    classification: None,
                    prepared: None,
                    outcome: Err(e),
                    log: None,
                };
            }
        };

        let log = match RunLog::open(&self.settings.log_dir, &classification.log_name).await {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(error = %e, "could not open run log; continuing without it");
                None
            }
        };

        let (prepared, outcome) = match rewrite(
            command,
            classification.clone(),
            ctx,
            &self.settings.scratch_dir,
        ) {
            Ok(prepared) => {
                let outcome = self.executor.execute(&prepared.command).await;
                (Some(prepared), outcome)
            }
            Err(e) => {
                error!(error = %e, "could not prepare command");
                (None, Err(e))
            }
        };

        match (&prepared, &outcome) {
            (None, _) => {}
            (Some(_), Err(e)) => error!(error = %e, "command did not run"),
            (Some(_), Ok(res)) if res.succeeded() => {}
            (Some(_), Ok(_)) if classification.kind.persists_output() => {
                error!("execution failed on one or more steps; check the run log")
            }
            (Some(p), Ok(_)) => error!(command = %p.command, "runjob failed"),
        }

        let executed = Executed {
            classification: Some(classification),
            prepared,
            outcome,
            log,
        };

        if let Some(log) = &executed.log {
            if let Err(e) = log.append(&executed.output()).await {
                warn!(error = %e, "could not write run log");
            }
        }

        executed
    }

    async fn persist_output(
        &self,
        run: &Validated,
        classification: &Classification,
        executed: &Executed,
    ) {
        info!("logging output to database");
        let log_file_name = executed
            .log
            .as_ref()
            .map(|l| l.path().display().to_string())
            .unwrap_or_else(|| classification.log_name.clone());

        let record = LogRecord {
            runbot_id: run.item.id,
            job_command: run.command.clone(),
            log_file_name,
            log_text: executed.output(),
            is_failure: executed.status() == StatusCd::Error,
            artifact_id: run.item.artifact_id.clone(),
        };

        if let Err(e) = self.log_store.log_output(&record).await {
            warn!(error = %e, "failed to persist run output");
        }
    }

    /// Closing comments, final tracker transition and an immediate cache sync.
    async fn finish(
        &self,
        run: &Validated,
        refreshed: &QueueItem,
        is_rerun: bool,
        job_name: Option<&str>,
        status: StatusCd,
    ) {
        let ticket = run.ticket_id.as_str();
        let command = refreshed.command().unwrap_or(&run.command);

        self.comment(ticket, &comments::ends(command, job_name, status))
            .await;

        if is_rerun {
            let artifact_id = refreshed.artifact_id.as_deref().unwrap_or_default();
            let run_id = refreshed.run_id.as_deref().unwrap_or_default();
            self.comment(
                ticket,
                &comments::log_location(&self.settings.artifact_url, artifact_id, run_id),
            )
            .await;
        }

        if refreshed.job_type() == JobType::Runjob {
            self.comment(ticket, &comments::log_portal(&self.settings.log_portal_url))
                .await;
        }

        if let Some(snippet) = refreshed.error_snippet() {
            self.comment(ticket, &comments::error_message(snippet)).await;
        }

        if !is_rerun {
            let closing = match status {
                StatusCd::Error => STATUS_FAILED,
                _ => STATUS_DONE,
            };
            self.transition(ticket, closing).await;

            if let Err(e) = self.syncer.sync_ticket(ticket).await {
                warn!(ticket, error = %e, "post-run status sync failed");
            }
        }
    }

    async fn comment(&self, ticket: &str, body: &str) {
        if let Err(e) = self.tracker.add_comment(ticket, body).await {
            error!(ticket, error = %e, "failed to comment on ticket");
        }
    }

    async fn transition(&self, ticket: &str, status: &str) {
        if let Err(e) = self.tracker.set_status(ticket, status).await {
            error!(ticket, status, error = %e, "failed to change ticket status");
        }
    }
}
