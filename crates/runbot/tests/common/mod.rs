use runbot::jobs::NewQueueItem;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Connects to TEST_DATABASE_URL, migrates and empties both tables.
/// Returns `None` when no test database is configured so callers can skip.
pub async fn setup_db() -> Option<PgPool> {
    let _ = dotenvy::dotenv();

    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");

    runbot::db::run_migrations(&pool)
        .await
        .expect("migrations failed");

    sqlx::query("TRUNCATE TABLE runbot_log_t, runjob_request_t RESTART IDENTITY")
        .execute(&pool)
        .await
        .expect("truncate failed");

    Some(pool)
}

#[allow(dead_code)]
pub fn new_item(ticket: &str, command: &str) -> NewQueueItem {
    NewQueueItem {
        ticket_id: Some(ticket.to_string()),
        job_name: None,
        job_type: String::new(),
        command: command.to_string(),
    }
}

/// Backdate a request's queue timestamp.
#[allow(dead_code)]
pub async fn age_request(pool: &PgPool, id: i64, days: i32) {
    sqlx::query("UPDATE runjob_request_t SET queue_ts = now() - ($2::int * interval '1 day') WHERE id = $1")
        .bind(id)
        .bind(days)
        .execute(pool)
        .await
        .expect("age_request failed");
}
