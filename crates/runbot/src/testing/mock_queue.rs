//! Mock queue for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::jobs::model::{QueueItem, StatusCd};
use crate::jobs::repo::{CachedTicketStatus, QueueClient, TicketStatusCache};

type Patch = Box<dyn Fn(&mut QueueItem) + Send + Sync>;

/// Mock implementation of `QueueClient` and `TicketStatusCache`.
///
/// - Requests are claimed in insertion order
/// - Every status write and cache write is recorded
/// - Individual writes can be made to fail
#[derive(Default)]
pub struct MockQueue {
    items: Arc<RwLock<Vec<QueueItem>>>,
    /// Every accepted `update_status` call, in order.
    status_writes: Arc<RwLock<Vec<(i64, StatusCd)>>>,
    /// Every `update_cached_status` attempt, including failed ones.
    cache_writes: Arc<RwLock<Vec<(String, String)>>>,
    failing_status: Arc<RwLock<HashSet<&'static str>>>,
    failing_cache_keys: Arc<RwLock<HashSet<String>>>,
    /// Applied when a request is re-read by id, simulating concurrent writers.
    refetch_patches: Arc<RwLock<HashMap<i64, Patch>>>,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, item: QueueItem) {
        self.items.write().await.push(item);
    }

    pub async fn item(&self, id: i64) -> Option<QueueItem> {
        self.items.read().await.iter().find(|i| i.id == id).cloned()
    }

    pub async fn status_writes(&self) -> Vec<(i64, StatusCd)> {
        self.status_writes.read().await.clone()
    }

    pub async fn cache_writes(&self) -> Vec<(String, String)> {
        self.cache_writes.read().await.clone()
    }

    /// Make every `update_status` to `status` fail.
    pub async fn fail_status_update(&self, status: StatusCd) {
        self.failing_status.write().await.insert(status.as_str());
    }

    /// Make cache writes for `ticket_id` fail.
    pub async fn fail_cache_update(&self, ticket_id: &str) {
        self.failing_cache_keys
            .write()
            .await
            .insert(ticket_id.to_string());
    }

    pub async fn on_refetch<F>(&self, id: i64, patch: F)
    where
        F: Fn(&mut QueueItem) + Send + Sync + 'static,
    {
        self.refetch_patches
            .write()
            .await
            .insert(id, Box::new(patch));
    }
}

#[async_trait]
impl QueueClient for MockQueue {
    async fn fetch_next(&self, id: Option<i64>) -> anyhow::Result<Option<QueueItem>> {
        let mut items = self.items.write().await;
        match id {
            Some(id) => {
                let Some(item) = items.iter_mut().find(|i| i.id == id) else {
                    return Ok(None);
                };
                if let Some(patch) = self.refetch_patches.read().await.get(&id) {
                    patch(item);
                }
                Ok(Some(item.clone()))
            }
            None => {
                let Some(item) = items.iter_mut().find(|i| i.status_cd == "NEW") else {
                    return Ok(None);
                };
                item.status_cd = StatusCd::Queued.as_str().to_string();
                Ok(Some(item.clone()))
            }
        }
    }

    async fn update_status(&self, id: i64, status: StatusCd) -> anyhow::Result<()> {
        if self.failing_status.read().await.contains(status.as_str()) {
            anyhow::bail!("simulated failure writing {status}");
        }

        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| anyhow::anyhow!("no request {id}"))?;

        let current = StatusCd::parse(&item.status_cd)
            .ok_or_else(|| anyhow::anyhow!("bad status {}", item.status_cd))?;
        if !current.can_transition_to(status) {
            anyhow::bail!("request {id}: {current} -> {status} is not a forward move");
        }

        item.status_cd = status.as_str().to_string();
        match status {
            StatusCd::Running => item.execution_start_ts = Some(Utc::now()),
            s if s.is_terminal() => item.execution_end_ts = Some(Utc::now()),
            _ => {}
        }
        self.status_writes.write().await.push((id, status));
        Ok(())
    }
}

#[async_trait]
impl TicketStatusCache for MockQueue {
    async fn outstanding_tickets(
        &self,
        terminal: &[&str],
        window_days: i64,
    ) -> anyhow::Result<Vec<CachedTicketStatus>> {
        let cutoff = Utc::now() - Duration::days(window_days);
        let items = self.items.read().await;
        Ok(items
            .iter()
            .filter(|i| {
                i.jira_status
                    .as_deref()
                    .map_or(true, |s| !terminal.contains(&s))
            })
            .filter(|i| i.execution_end_ts.is_none() && i.queue_ts > cutoff)
            .filter_map(|i| {
                i.ticket_id.clone().map(|ticket_id| CachedTicketStatus {
                    ticket_id,
                    jira_status: i.jira_status.clone(),
                })
            })
            .collect())
    }

    async fn cached_status(&self, ticket_id: &str) -> anyhow::Result<Option<String>> {
        let items = self.items.read().await;
        Ok(items
            .iter()
            .rev()
            .find(|i| i.ticket_id.as_deref() == Some(ticket_id))
            .and_then(|i| i.jira_status.clone()))
    }

    async fn update_cached_status(&self, ticket_id: &str, status: &str) -> anyhow::Result<u64> {
        self.cache_writes
            .write()
            .await
            .push((ticket_id.to_string(), status.to_string()));

        if self.failing_cache_keys.read().await.contains(ticket_id) {
            anyhow::bail!("simulated cache write failure for {ticket_id}");
        }

        let mut items = self.items.write().await;
        let mut n = 0;
        for item in items
            .iter_mut()
            .filter(|i| i.ticket_id.as_deref() == Some(ticket_id))
        {
            item.jira_status = Some(status.to_string());
            n += 1;
        }
        Ok(n)
    }
}
