use std::path::Path;

use tracing::debug;

use crate::error::RunbotError;
use crate::jobs::model::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    ControlFile,
    OneTimeSql,
    SelfServiceRelease,
    Publish,
    Runjob,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ControlFile => "CTL",
            CommandKind::OneTimeSql => "One-Time SQL",
            CommandKind::SelfServiceRelease => "Self-Service Release",
            CommandKind::Publish => "Publish",
            CommandKind::Runjob => "Runjob",
        }
    }

    /// Everything except a bare job dispatch produces output worth archiving.
    pub fn persists_output(&self) -> bool {
        !matches!(self, CommandKind::Runjob)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: CommandKind,
    pub log_name: String,
}

type LogNamer = fn(&str, &RunContext) -> Result<String, RunbotError>;

struct Rule {
    kind: CommandKind,
    matches: fn(&str) -> bool,
    log_name: LogNamer,
}

// Evaluated top to bottom; first match wins. Order matters because a control
// file line can easily mention publish.sh or one_time_sql as well.
const RULES: &[Rule] = &[
    Rule {
        kind: CommandKind::ControlFile,
        matches: is_control_file,
        log_name: control_file_log_name,
    },
    Rule {
        kind: CommandKind::OneTimeSql,
        matches: is_one_time_sql,
        log_name: one_time_sql_log_name,
    },
    Rule {
        kind: CommandKind::SelfServiceRelease,
        matches: is_release,
        log_name: release_log_name,
    },
    Rule {
        kind: CommandKind::Publish,
        matches: is_publish,
        log_name: job_log_name,
    },
    Rule {
        kind: CommandKind::Runjob,
        matches: always,
        log_name: job_log_name,
    },
];

fn is_control_file(c: &str) -> bool {
    c.contains(".ctl")
}

fn is_one_time_sql(c: &str) -> bool {
    c.contains("one_time_sql")
}

fn is_release(c: &str) -> bool {
    c.contains("releaseselfservicereport")
}

fn is_publish(c: &str) -> bool {
    c.contains("publish.sh")
}

fn always(_: &str) -> bool {
    true
}

pub fn classify(command: &str, ctx: &RunContext) -> Result<Classification, RunbotError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(RunbotError::MalformedCommand("empty command".to_string()));
    }

    let rule = RULES
        .iter()
        .find(|r| (r.matches)(command))
        .ok_or_else(|| RunbotError::MalformedCommand(command.to_string()))?;

    Ok(Classification {
        kind: rule.kind,
        log_name: (rule.log_name)(command, ctx)?,
    })
}

/// The control file is the first token; its log is named after the file minus extension.
pub fn control_file_path(command: &str) -> Result<&str, RunbotError> {
    command
        .split_whitespace()
        .next()
        .ok_or_else(|| RunbotError::MalformedCommand(command.to_string()))
}

fn control_file_log_name(command: &str, ctx: &RunContext) -> Result<String, RunbotError> {
    let path = control_file_path(command)?;
    let file_name = Path::new(path)
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| RunbotError::MalformedCommand(command.to_string()))?;

    let keep = file_name.chars().count().saturating_sub(4);
    if keep == 0 {
        return Err(RunbotError::MalformedCommand(format!(
            "control file name too short: {file_name}"
        )));
    }
    let stem: String = file_name.chars().take(keep).collect();
    Ok(format!("{stem}_{}.log", ctx.item_id))
}

fn one_time_sql_log_name(_command: &str, ctx: &RunContext) -> Result<String, RunbotError> {
    let ticket = ctx.ticket_id.as_deref().unwrap_or("noticket");
    Ok(format!("{ticket}_OneTimeSQL_{}.log", ctx.item_id))
}

fn release_log_name(command: &str, ctx: &RunContext) -> Result<String, RunbotError> {
    let report = command.split_whitespace().nth(1).ok_or_else(|| {
        RunbotError::MalformedCommand(format!("release command has no report name: {command}"))
    })?;
    Ok(format!("{}_NewSelfService_{}.log", base_name(report), ctx.item_id))
}

fn job_log_name(command: &str, ctx: &RunContext) -> Result<String, RunbotError> {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let job = match tokens.as_slice() {
        [_, _, job, ..] => *job,
        [_, job] => {
            debug!(command, "no third token; naming log after the job argument");
            *job
        }
        _ => {
            return Err(RunbotError::MalformedCommand(format!(
                "no job argument to name the log after: {command}"
            )))
        }
    };
    Ok(format!("{}_{}.log", base_name(job), ctx.item_id))
}

fn base_name(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}
