//! Ticket comment wording. Reporting tools downstream parse the begin/end
//! comments to compute run durations, so the text must stay stable.

use crate::jobs::model::StatusCd;

fn job_suffix(job_name: Option<&str>) -> String {
    match job_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!(" (Job Name: {name})"),
        None => String::new(),
    }
}

pub fn begins(command: &str, job_name: Option<&str>) -> String {
    format!(
        "Runbot execution of '{command}'{} begins.",
        job_suffix(job_name)
    )
}

pub fn ends(command: &str, job_name: Option<&str>, status: StatusCd) -> String {
    format!(
        "Runbot execution of '{command}'{} ends. \nStatus: *{status}*",
        job_suffix(job_name)
    )
}

pub fn log_location(artifact_url: &str, artifact_id: &str, run_id: &str) -> String {
    format!(
        "Log Location: {}/artifacts/summary?id={artifact_id}&tab=Logs&runId={run_id}&lineCount=10",
        artifact_url.trim_end_matches('/')
    )
}

pub fn log_portal(portal_url: &str) -> String {
    format!("Full logfile available at: {portal_url}")
}

pub fn error_message(snippet: &str) -> String {
    format!("{{color:red}}Error Message: {snippet}{{color}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_and_end_wording() {
        assert_eq!(
            begins("runjob a.pl", Some("Daily A")),
            "Runbot execution of 'runjob a.pl' (Job Name: Daily A) begins."
        );
        assert_eq!(
            ends("runjob a.pl", None, StatusCd::Complete),
            "Runbot execution of 'runjob a.pl' ends. \nStatus: *COMPLETE*"
        );
        assert_eq!(begins("x", Some("  ")), "Runbot execution of 'x' begins.");
    }

    #[test]
    fn links_and_error_formatting() {
        assert_eq!(
            log_location("https://artifacts.local/", "17", "r-9"),
            "Log Location: https://artifacts.local/artifacts/summary?id=17&tab=Logs&runId=r-9&lineCount=10"
        );
        assert_eq!(error_message("timeout"), "{color:red}Error Message: timeout{color}");
    }
}
