// crates/runbot/src/jobs/repo.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::jobs::model::{NewQueueItem, QueueItem, StatusCd};

/// Dequeue and status protocol against the request queue.
/// Only this layer ever writes `status_cd`.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// `None`: claim the oldest NEW request (flipping it to QUEUED).
    /// `Some(id)`: re-read that request as it currently stands.
    async fn fetch_next(&self, id: Option<i64>) -> anyhow::Result<Option<QueueItem>>;

    async fn update_status(&self, id: i64, status: StatusCd) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CachedTicketStatus {
    pub ticket_id: String,
    pub jira_status: Option<String>,
}

/// The locally cached copy of each ticket's tracker status.
#[async_trait]
pub trait TicketStatusCache: Send + Sync {
    /// Tickets still worth syncing: cached status unset or not terminal,
    /// execution not ended, queued within the window.
    async fn outstanding_tickets(
        &self,
        terminal: &[&str],
        window_days: i64,
    ) -> anyhow::Result<Vec<CachedTicketStatus>>;

    async fn cached_status(&self, ticket_id: &str) -> anyhow::Result<Option<String>>;

    async fn update_cached_status(&self, ticket_id: &str, status: &str) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct QueueRepo {
    pool: PgPool,
}

impl QueueRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ----------------------------
    // Enqueue / admin helpers
    // ----------------------------

    pub async fn enqueue(&self, item: NewQueueItem) -> anyhow::Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO runjob_request_t (jira_issue_id, job_nm, job_type, runjob_cmd, status_cd)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(item.ticket_id)
        .bind(item.job_name)
        .bind(item.job_type)
        .bind(item.command)
        .bind(StatusCd::New.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get(&self, id: i64) -> anyhow::Result<Option<QueueItem>> {
        let item = sqlx::query_as::<_, QueueItem>("SELECT * FROM runjob_request_t WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    pub async fn reset(&self) -> anyhow::Result<()> {
        sqlx::query("TRUNCATE TABLE runbot_log_t, runjob_request_t RESTART IDENTITY")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Claim exactly one NEW request.
    /// SKIP LOCKED keeps two overlapping invocations from claiming the same row.
    async fn claim_next(&self) -> anyhow::Result<Option<QueueItem>> {
        let mut tx = self.pool.begin().await?;

        let item = sqlx::query_as::<_, QueueItem>(
            r#"
            WITH candidate AS (
              SELECT id
              FROM runjob_request_t
              WHERE status_cd = 'NEW'
              ORDER BY queue_ts ASC, id ASC
              LIMIT 1
              FOR UPDATE SKIP LOCKED
            )
            UPDATE runjob_request_t r
            SET status_cd = 'QUEUED',
                updated_at = now()
            FROM candidate
            WHERE r.id = candidate.id
            RETURNING r.*
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(item)
    }
}

#[async_trait]
impl QueueClient for QueueRepo {
    async fn fetch_next(&self, id: Option<i64>) -> anyhow::Result<Option<QueueItem>> {
        match id {
            Some(id) => self.get(id).await,
            None => self.claim_next().await,
        }
    }

    async fn update_status(&self, id: i64, status: StatusCd) -> anyhow::Result<()> {
        let from: Vec<String> = status
            .allowed_predecessors()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let res = sqlx::query(
            r#"
            UPDATE runjob_request_t
            SET status_cd = $2,
                execution_start_ts = CASE WHEN $2 = 'RUNNING' THEN now() ELSE execution_start_ts END,
                execution_end_ts = CASE WHEN $2 IN ('COMPLETE', 'ERROR') THEN now() ELSE execution_end_ts END,
                updated_at = now()
            WHERE id = $1
              AND status_cd = ANY($3)
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&from)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            anyhow::bail!("request {id}: transition to {status} rejected (missing row or not a forward move)");
        }
        Ok(())
    }
}

#[async_trait]
impl TicketStatusCache for QueueRepo {
    async fn outstanding_tickets(
        &self,
        terminal: &[&str],
        window_days: i64,
    ) -> anyhow::Result<Vec<CachedTicketStatus>> {
        let terminal: Vec<String> = terminal.iter().map(|s| s.to_string()).collect();

        let rows = sqlx::query_as::<_, CachedTicketStatus>(
            r#"
            SELECT jira_issue_id AS ticket_id, jira_status_tx AS jira_status
            FROM runjob_request_t
            WHERE jira_issue_id IS NOT NULL
              AND (jira_status_tx IS NULL OR NOT (jira_status_tx = ANY($1)))
              AND execution_end_ts IS NULL
              AND EXTRACT(EPOCH FROM (now() - queue_ts)) < $2::bigint * 86400.0
            ORDER BY id
            "#,
        )
        .bind(&terminal)
        .bind(window_days)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn cached_status(&self, ticket_id: &str) -> anyhow::Result<Option<String>> {
        let status = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT jira_status_tx
            FROM runjob_request_t
            WHERE jira_issue_id = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status.flatten())
    }

    async fn update_cached_status(&self, ticket_id: &str, status: &str) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE runjob_request_t
            SET jira_status_tx = $1,
                updated_at = now()
            WHERE jira_issue_id = $2
            "#,
        )
        .bind(status)
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }
}
