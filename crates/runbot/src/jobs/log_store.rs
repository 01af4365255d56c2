use async_trait::async_trait;
use sqlx::PgPool;

/// One captured run output, as archived for non-runjob requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub runbot_id: i64,
    pub job_command: String,
    pub log_file_name: String,
    pub log_text: String,
    pub is_failure: bool,
    pub artifact_id: Option<String>,
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn log_output(&self, record: &LogRecord) -> anyhow::Result<()>;
}

/// Turn literal `\n` / `\t` escapes (as left behind by some job wrappers)
/// into real whitespace; an empty capture is stored as a marker instead.
pub fn normalize_log_text(text: &str) -> String {
    if text.trim().is_empty() {
        return "Nothing to log".to_string();
    }
    text.replace("\\n", "\n").replace("\\t", "\t")
}

#[derive(Clone)]
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn logs_for(&self, runbot_id: i64) -> anyhow::Result<Vec<(String, bool)>> {
        let rows = sqlx::query_as::<_, (String, bool)>(
            r#"
            SELECT log_text, is_failure
            FROM runbot_log_t
            WHERE runbot_id = $1
            ORDER BY id
            "#,
        )
        .bind(runbot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn log_output(&self, record: &LogRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runbot_log_t (
                runbot_id, job_command, log_file_name, log_text, is_failure, artifact_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.runbot_id)
        .bind(&record.job_command)
        .bind(&record.log_file_name)
        .bind(normalize_log_text(&record.log_text))
        .bind(record.is_failure)
        .bind(record.artifact_id.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
