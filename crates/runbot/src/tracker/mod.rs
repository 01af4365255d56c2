//! Issue tracker abstraction.
//!
//! The runner only needs a handful of ticket operations; `IssueTracker`
//! captures them so the Jira client can be swapped for an in-memory one.

mod jira;
mod types;

pub use jira::JiraClient;
pub use types::*;
