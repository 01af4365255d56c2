use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::jobs::repo::{CachedTicketStatus, TicketStatusCache};
use crate::tracker::{IssueTracker, TERMINAL_STATUSES};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub checked: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Keeps `jira_status_tx` in line with the tracker for requests that are still open.
/// Best effort: one ticket failing to update never stops the rest.
#[derive(Clone)]
pub struct StatusSyncer {
    cache: Arc<dyn TicketStatusCache>,
    tracker: Arc<dyn IssueTracker>,
    window_days: i64,
}

impl StatusSyncer {
    pub fn new(
        cache: Arc<dyn TicketStatusCache>,
        tracker: Arc<dyn IssueTracker>,
        window_days: i64,
    ) -> Self {
        Self {
            cache,
            tracker,
            window_days,
        }
    }

    /// Sweep every outstanding ticket queued within the window.
    pub async fn sync_outstanding(&self) -> anyhow::Result<SyncReport> {
        let rows = self
            .cache
            .outstanding_tickets(TERMINAL_STATUSES, self.window_days)
            .await?;

        if rows.is_empty() {
            info!("no non-complete tickets found; skipping status sync");
            return Ok(SyncReport::default());
        }
        info!(count = rows.len(), "found outstanding requests to sync");

        self.reconcile(rows).await
    }

    /// Reconcile exactly one ticket, skipping the selection query.
    pub async fn sync_ticket(&self, ticket_id: &str) -> anyhow::Result<SyncReport> {
        info!(ticket = ticket_id, "syncing tracker status for current ticket");
        let cached = self.cache.cached_status(ticket_id).await?;
        self.reconcile(vec![CachedTicketStatus {
            ticket_id: ticket_id.to_string(),
            jira_status: cached,
        }])
        .await
    }

    async fn reconcile(&self, rows: Vec<CachedTicketStatus>) -> anyhow::Result<SyncReport> {
        // Several requests can share one ticket; keep first-seen order for the query.
        let mut keys: Vec<String> = Vec::new();
        let mut cached: HashMap<String, Vec<Option<String>>> = HashMap::new();
        for row in rows {
            let entry = cached.entry(row.ticket_id.clone()).or_default();
            if entry.is_empty() {
                keys.push(row.ticket_id);
            }
            entry.push(row.jira_status);
        }

        let live = self.tracker.query_many(&keys).await?;

        let mut report = SyncReport::default();
        for issue in live {
            let Some(seen) = cached.get(&issue.key) else {
                continue;
            };
            report.checked += 1;

            if seen.iter().all(|s| s.as_deref() == Some(issue.status.as_str())) {
                report.unchanged += 1;
                continue;
            }

            info!(ticket = %issue.key, status = %issue.status, "syncing cached status from tracker");
            match self
                .cache
                .update_cached_status(&issue.key, &issue.status)
                .await
            {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(ticket = %issue.key, error = %e, "unable to update cached status");
                    report.failed += 1;
                }
            }
        }

        info!(
            checked = report.checked,
            updated = report.updated,
            failed = report.failed,
            "ticket status sync complete"
        );
        Ok(report)
    }
}
