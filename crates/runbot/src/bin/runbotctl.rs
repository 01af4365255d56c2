use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use runbot::config::Config;
use runbot::db;
use runbot::jobs::{NewQueueItem, PgLogStore, QueueRepo, StatusSyncer};
use runbot::tracker::JiraClient;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "runbotctl <command>\n\
Commands:\n\
- enqueue <ticket> <command> [job_type] [job_name]\n\
- show <id>\n\
- sync [ticket]\n\
- reset\n\
\n\
Uses DATABASE_URL and the RUNBOT_* environment.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let cfg = Config::from_env()?;
    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }
    let repo = QueueRepo::new(pool.clone());

    match args[1].as_str() {
        "enqueue" => {
            let (Some(ticket), Some(command)) = (args.get(2), args.get(3)) else {
                eprintln!("usage: runbotctl enqueue <ticket> <command> [job_type] [job_name]");
                std::process::exit(2);
            };
            let id = repo
                .enqueue(NewQueueItem {
                    ticket_id: Some(ticket.clone()),
                    job_name: args.get(5).cloned(),
                    job_type: args.get(4).cloned().unwrap_or_default(),
                    command: command.clone(),
                })
                .await?;
            println!("+ enqueued request id={id} ticket={ticket}");
        }
        "show" => {
            let id: i64 = args
                .get(2)
                .context("usage: runbotctl show <id>")?
                .parse()
                .context("id must be an integer")?;
            let Some(item) = repo.get(id).await? else {
                eprintln!("no request with id {id}");
                std::process::exit(1);
            };
            let logs = PgLogStore::new(pool).logs_for(id).await?;
            let logs: Vec<_> = logs
                .into_iter()
                .map(|(text, is_failure)| json!({ "log_text": text, "is_failure": is_failure }))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "request": item, "logs": logs }))?
            );
        }
        "sync" => {
            let tracker = JiraClient::new(
                cfg.tracker_url.clone(),
                cfg.tracker_token.clone(),
                Duration::from_secs(cfg.tracker_timeout_secs),
            )?;
            let syncer =
                StatusSyncer::new(Arc::new(repo), Arc::new(tracker), cfg.sync_window_days);
            let report = match args.get(2) {
                Some(ticket) => syncer.sync_ticket(ticket).await?,
                None => syncer.sync_outstanding().await?,
            };
            println!(
                "sync: checked={} updated={} unchanged={} failed={}",
                report.checked, report.updated, report.unchanged, report.failed
            );
        }
        "reset" => {
            repo.reset().await?;
            println!("reset OK");
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}
