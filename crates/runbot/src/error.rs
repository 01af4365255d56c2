use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunbotError {
    #[error("runjob_cmd not found in queue row {0}")]
    MissingCommand(i64),

    #[error("{0} is not a valid tracker issue key")]
    InvalidTicketKey(String),

    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("could not scrub control file {}: {source}", path.display())]
    ScrubFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch command: {0}")]
    Spawn(#[source] std::io::Error),
}

impl RunbotError {
    /// Operator-input errors end the run cleanly without touching the queue row.
    pub fn is_operator_input(&self) -> bool {
        matches!(
            self,
            RunbotError::MissingCommand(_) | RunbotError::InvalidTicketKey(_)
        )
    }
}
