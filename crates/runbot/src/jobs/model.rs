use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of `runjob_request_t`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct QueueItem {
    pub id: i64,
    #[sqlx(rename = "jira_issue_id")]
    pub ticket_id: Option<String>,
    #[sqlx(rename = "job_nm")]
    pub job_name: Option<String>,
    pub job_type: String,
    #[sqlx(rename = "runjob_cmd")]
    pub command: Option<String>,
    pub artifact_id: Option<String>,
    pub run_id: Option<String>,
    #[sqlx(rename = "error_snippit_tx")]
    pub error_snippet: Option<String>,
    pub status_cd: String,
    #[sqlx(rename = "jira_status_tx")]
    pub jira_status: Option<String>,

    pub queue_ts: DateTime<Utc>,
    pub execution_start_ts: Option<DateTime<Utc>>,
    pub execution_end_ts: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn job_type(&self) -> JobType {
        JobType::from_str(&self.job_type)
    }

    /// The command to run, if the row actually carries one.
    pub fn command(&self) -> Option<&str> {
        self.command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn error_snippet(&self) -> Option<&str> {
        self.error_snippet
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Input for `enqueue`: what an operator (or intake form) submits.
#[derive(Debug, Clone, Default)]
pub struct NewQueueItem {
    pub ticket_id: Option<String>,
    pub job_name: Option<String>,
    pub job_type: String,
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCd {
    New,
    Queued,
    Running,
    Complete,
    Error,
}

impl StatusCd {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCd::New => "NEW",
            StatusCd::Queued => "QUEUED",
            StatusCd::Running => "RUNNING",
            StatusCd::Complete => "COMPLETE",
            StatusCd::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NEW" => Some(Self::New),
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "COMPLETE" => Some(Self::Complete),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusCd::Complete | StatusCd::Error)
    }

    /// Rows only ever move forward: NEW/QUEUED -> RUNNING -> COMPLETE|ERROR.
    /// A claimed row may also be closed out directly if it never got to RUNNING.
    pub fn can_transition_to(&self, next: StatusCd) -> bool {
        match (self, next) {
            (StatusCd::New, StatusCd::Queued) => true,
            (StatusCd::New | StatusCd::Queued, StatusCd::Running) => true,
            (StatusCd::New | StatusCd::Queued | StatusCd::Running, n) => n.is_terminal(),
            _ => false,
        }
    }

    /// The states a row may be in for `self` to be written over it.
    pub fn allowed_predecessors(&self) -> &'static [&'static str] {
        match self {
            StatusCd::New => &[],
            StatusCd::Queued => &["NEW"],
            StatusCd::Running => &["NEW", "QUEUED"],
            StatusCd::Complete | StatusCd::Error => &["NEW", "QUEUED", "RUNNING"],
        }
    }
}

impl std::fmt::Display for StatusCd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    RerunReport,
    ReloadTable,
    /// Empty tag: a plain runjob request.
    Runjob,
    Other,
}

impl JobType {
    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "RERUN_REPORT" => Self::RerunReport,
            "RELOAD_TABLE" => Self::ReloadTable,
            "" => Self::Runjob,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RerunReport => "RERUN_REPORT",
            Self::ReloadTable => "RELOAD_TABLE",
            Self::Runjob => "",
            Self::Other => "OTHER",
        }
    }

    /// Reruns and reloads are owned by the artifact system, not by the runner:
    /// no assignment and no tracker status transitions for them.
    pub fn is_rerun(&self) -> bool {
        matches!(self, Self::RerunReport | Self::ReloadTable)
    }
}

/// Identifiers needed to parameterize and attribute one execution.
/// Built once per item and passed explicitly to every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub item_id: i64,
    pub ticket_id: Option<String>,
    pub production: bool,
}

impl RunContext {
    pub fn new(item_id: i64, ticket_id: Option<String>, production: bool) -> Self {
        Self {
            item_id,
            ticket_id,
            production,
        }
    }

    pub fn ticket_or_placeholder(&self) -> &str {
        self.ticket_id.as_deref().unwrap_or("[JIRA_ID=Null]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_only_move_forward() {
        assert!(StatusCd::Queued.can_transition_to(StatusCd::Running));
        assert!(StatusCd::Running.can_transition_to(StatusCd::Complete));
        assert!(StatusCd::Running.can_transition_to(StatusCd::Error));
        assert!(StatusCd::Queued.can_transition_to(StatusCd::Error));

        assert!(!StatusCd::Running.can_transition_to(StatusCd::Queued));
        assert!(!StatusCd::Complete.can_transition_to(StatusCd::Running));
        assert!(!StatusCd::Error.can_transition_to(StatusCd::Complete));
        assert!(!StatusCd::Complete.can_transition_to(StatusCd::New));
    }

    #[test]
    fn predecessors_agree_with_transition_rule() {
        let all = [
            StatusCd::New,
            StatusCd::Queued,
            StatusCd::Running,
            StatusCd::Complete,
            StatusCd::Error,
        ];
        for next in all {
            for prev in all {
                let listed = next.allowed_predecessors().contains(&prev.as_str());
                assert_eq!(listed, prev.can_transition_to(next), "{prev} -> {next}");
            }
        }
    }

    #[test]
    fn job_type_tags() {
        assert!(JobType::from_str("RERUN_REPORT").is_rerun());
        assert!(JobType::from_str("RELOAD_TABLE").is_rerun());
        assert_eq!(JobType::from_str(""), JobType::Runjob);
        assert_eq!(JobType::from_str("  "), JobType::Runjob);
        assert!(!JobType::from_str("SOMETHING").is_rerun());
    }

    #[test]
    fn status_parse_roundtrips_known_values() {
        assert_eq!(StatusCd::parse("complete"), Some(StatusCd::Complete));
        assert_eq!(StatusCd::parse("bogus"), None);
    }
}
