use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use runbot::config;
use runbot::db;
use runbot::jobs::{
    JobRunner, PgLogStore, QueueRepo, RunOutcome, RunnerSettings, ShellExecutor, StatusSyncer,
};
use runbot::tracker::JiraClient;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::Config::from_env()?;

    info!(
        user = %cfg.user,
        production = cfg.production,
        scheduled = cfg.scheduled,
        log_dir = %cfg.log_dir.display(),
        migrate_on_startup = cfg.migrate_on_startup,
        "runbot starting"
    );
    if cfg.production {
        info!("running in PRODUCTION mode");
    } else {
        info!("running in NON-PRODUCTION mode");
    }

    let pool = db::make_pool(&cfg.database_url)
        .await
        .context("connecting to the request queue")?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let queue = Arc::new(QueueRepo::new(pool.clone()));
    let tracker = Arc::new(
        JiraClient::new(
            cfg.tracker_url.clone(),
            cfg.tracker_token.clone(),
            Duration::from_secs(cfg.tracker_timeout_secs),
        )
        .context("building tracker client")?,
    );
    let log_store = Arc::new(PgLogStore::new(pool));
    let executor = Arc::new(ShellExecutor::new(cfg.shell.clone()));
    let syncer = StatusSyncer::new(queue.clone(), tracker.clone(), cfg.sync_window_days);

    if let Err(e) = syncer.sync_outstanding().await {
        warn!(error = %e, "ticket status sweep failed; continuing");
    }

    let runner = JobRunner::new(
        queue,
        tracker,
        log_store,
        executor,
        syncer,
        RunnerSettings::from_config(&cfg),
    );

    match runner.run_once().await? {
        RunOutcome::NoWork => info!("nothing to do"),
        RunOutcome::Rejected { id, reason } if reason.is_operator_input() => {
            info!(runbot_id = id, "request left for the operator")
        }
        RunOutcome::Rejected { id, reason } => {
            warn!(runbot_id = id, error = %reason, "request rejected")
        }
        RunOutcome::Finished(run) => info!(
            runbot_id = run.id,
            ticket = %run.ticket_id,
            status = %run.status,
            "run finished"
        ),
    }

    Ok(())
}
