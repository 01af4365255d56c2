//! Mock issue tracker for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::tracker::{is_well_formed_key, IssueStatus, IssueTracker, TrackerError};

/// A recorded tracker call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    Assign { key: String, user: String },
    Comment { key: String, body: String },
    SetStatus { key: String, status: String },
    QueryMany { keys: Vec<String> },
}

/// Mock implementation of the `IssueTracker` trait.
///
/// Any well-formed key is valid unless marked unknown. `set_status` also
/// updates the live status that `query_many` reports, like a real tracker.
#[derive(Debug, Default)]
pub struct MockTracker {
    calls: Arc<RwLock<Vec<TrackerCall>>>,
    live: Arc<RwLock<HashMap<String, String>>>,
    unknown_keys: Arc<RwLock<HashSet<String>>>,
    failing_comments: Arc<RwLock<bool>>,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_live_status(&self, key: &str, status: &str) {
        self.live
            .write()
            .await
            .insert(key.to_string(), status.to_string());
    }

    pub async fn mark_unknown(&self, key: &str) {
        self.unknown_keys.write().await.insert(key.to_string());
    }

    /// Make every `add_comment` fail.
    pub async fn fail_comments(&self) {
        *self.failing_comments.write().await = true;
    }

    pub async fn calls(&self) -> Vec<TrackerCall> {
        self.calls.read().await.clone()
    }

    pub async fn comments(&self, key: &str) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                TrackerCall::Comment { key: k, body } if k == key => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn status_changes(&self, key: &str) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                TrackerCall::SetStatus { key: k, status } if k == key => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn assignments(&self, key: &str) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                TrackerCall::Assign { key: k, user } if k == key => Some(user.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: TrackerCall) {
        self.calls.write().await.push(call);
    }
}

#[async_trait]
impl IssueTracker for MockTracker {
    async fn is_valid_key(&self, key: &str) -> bool {
        is_well_formed_key(key) && !self.unknown_keys.read().await.contains(key)
    }

    async fn assign(&self, key: &str, user: &str) -> Result<(), TrackerError> {
        self.record(TrackerCall::Assign {
            key: key.to_string(),
            user: user.to_string(),
        })
        .await;
        Ok(())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError> {
        self.record(TrackerCall::Comment {
            key: key.to_string(),
            body: body.to_string(),
        })
        .await;
        if *self.failing_comments.read().await {
            return Err(TrackerError::ApiError("simulated comment failure".to_string()));
        }
        Ok(())
    }

    async fn set_status(&self, key: &str, status: &str) -> Result<(), TrackerError> {
        self.record(TrackerCall::SetStatus {
            key: key.to_string(),
            status: status.to_string(),
        })
        .await;
        self.set_live_status(key, status).await;
        Ok(())
    }

    async fn query_many(&self, keys: &[String]) -> Result<Vec<IssueStatus>, TrackerError> {
        self.record(TrackerCall::QueryMany {
            keys: keys.to_vec(),
        })
        .await;
        let live = self.live.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| {
                live.get(k).map(|s| IssueStatus {
                    key: k.clone(),
                    status: s.clone(),
                })
            })
            .collect())
    }
}
