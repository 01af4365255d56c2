//! Types for issue tracker operations.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tracker status a ticket moves to while its request runs.
pub const STATUS_IN_PROGRESS: &str = "IN PROGRESS";
pub const STATUS_DONE: &str = "Done";
pub const STATUS_FAILED: &str = "Failed";

/// Ticket statuses that are never synced again once cached.
pub const TERMINAL_STATUSES: &[&str] = &["Done", "Done - With Issues", "Failed", "Cancelled"];

static ISSUE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z][A-Z0-9_]+-[0-9]+$").expect("issue key pattern is valid")
});

/// Project key, dash, number: `PROJ-1234`.
pub fn is_well_formed_key(key: &str) -> bool {
    ISSUE_KEY.is_match(key)
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Issue not found: {0}")]
    NotFound(String),

    #[error("No transition to '{status}' available for {key}")]
    NoTransition { key: String, status: String },

    #[error("API error: {0}")]
    ApiError(String),
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TrackerError::Timeout
        } else if e.is_connect() {
            TrackerError::ConnectionFailed(e.to_string())
        } else {
            TrackerError::ApiError(e.to_string())
        }
    }
}

/// Live status of one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub key: String,
    pub status: String,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Well-formed and known to the tracker.
    async fn is_valid_key(&self, key: &str) -> bool;

    async fn assign(&self, key: &str, user: &str) -> Result<(), TrackerError>;

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError>;

    async fn set_status(&self, key: &str, status: &str) -> Result<(), TrackerError>;

    /// Current status of every key in one round trip. Unknown keys are omitted.
    async fn query_many(&self, keys: &[String]) -> Result<Vec<IssueStatus>, TrackerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        for ok in ["PROJ-1", "PROJ-1234", "MIS_OPS-7", "A1-99"] {
            assert!(is_well_formed_key(ok), "{ok}");
        }
        for bad in ["", "proj-1", "PROJ", "PROJ-", "-12", "P-12", "PROJ-12 ", "PROJ-1a"] {
            assert!(!is_well_formed_key(bad), "{bad:?}");
        }
    }
}
