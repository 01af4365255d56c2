//! Mock log store for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::jobs::log_store::{LogRecord, LogStore};

#[derive(Debug, Default)]
pub struct MockLogStore {
    records: Arc<RwLock<Vec<LogRecord>>>,
    failing: Arc<RwLock<bool>>,
}

impl MockLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<LogRecord> {
        self.records.read().await.clone()
    }

    pub async fn fail_writes(&self) {
        *self.failing.write().await = true;
    }
}

#[async_trait]
impl LogStore for MockLogStore {
    async fn log_output(&self, record: &LogRecord) -> anyhow::Result<()> {
        if *self.failing.read().await {
            anyhow::bail!("simulated log store failure");
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
