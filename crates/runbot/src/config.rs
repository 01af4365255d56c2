// Config is the one place runtime settings come from.
// Everything is read from the environment (and .env) once, at startup, and the
// typed struct is handed to each component instead of raw env lookups.

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub production: bool,
    pub user: String,
    pub log_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub shell: String,
    pub scheduled: bool,
    pub tracker_url: String,
    pub tracker_token: Option<String>,
    pub tracker_timeout_secs: u64,
    pub artifact_url: String,
    pub log_portal_url: String,
    pub migrate_on_startup: bool,
    pub sync_window_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let tracker_url = env_or_fallback("RUNBOT_TRACKER_URL", "JIRA_URL")
            .ok_or_else(|| anyhow::anyhow!("RUNBOT_TRACKER_URL is missing"))?;

        let tracker_token = env_or_fallback("RUNBOT_TRACKER_TOKEN", "JIRA_TOKEN");

        let user = env_or_fallback("RUNBOT_USER", "USER")
            .map(|u| normalize_user(&u))
            .unwrap_or_else(|| "runbot".to_string());

        let production_users = std::env::var("RUNBOT_PRODUCTION_USERS").unwrap_or_default();
        let production = env_bool("RUNBOT_PRODUCTION").unwrap_or(false)
            || is_production_user(&user, &production_users);

        let log_dir = env_nonempty("RUNBOT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/NAS/mis/tmp/_runbot"));

        let scratch_dir = env_nonempty("RUNBOT_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/NAS/mis/tmp"));

        let shell = env_nonempty("RUNBOT_SHELL").unwrap_or_else(|| "/bin/sh".to_string());

        // Control-M exports ESPWOB into every job it launches.
        let scheduled = env_bool("RUNBOT_SCHEDULED")
            .unwrap_or_else(|| std::env::var("ESPWOB").is_ok());

        let tracker_timeout_secs = env_nonempty("RUNBOT_TRACKER_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let artifact_url = env_nonempty("RUNBOT_ARTIFACT_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string());

        let log_portal_url = env_nonempty("RUNBOT_LOG_PORTAL_URL").unwrap_or_else(|| {
            "http://localhost:8080/ReleaseIntake/RunbotQueueMonitor".to_string()
        });

        let migrate_on_startup = env_bool("RUNBOT_MIGRATE_ON_STARTUP").unwrap_or(false);

        let sync_window_days = env_nonempty("RUNBOT_SYNC_WINDOW_DAYS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);

        Ok(Self {
            database_url,
            production,
            user,
            log_dir,
            scratch_dir,
            shell,
            scheduled,
            tracker_url,
            tracker_token,
            tracker_timeout_secs,
            artifact_url,
            log_portal_url,
            migrate_on_startup,
            sync_window_days,
        })
    }
}

/// Directory accounts come through as `ad.<name>`; the tracker only knows `<name>`.
pub fn normalize_user(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("ad.")
        .unwrap_or(trimmed)
        .to_string()
}

fn is_production_user(user: &str, csv: &str) -> bool {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .any(|u| u.eq_ignore_ascii_case(user))
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    env_nonempty(primary).or_else(|| env_nonempty(fallback))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for key in [
            "RUNBOT_PRODUCTION",
            "RUNBOT_PRODUCTION_USERS",
            "RUNBOT_USER",
            "RUNBOT_TRACKER_URL",
            "JIRA_URL",
            "RUNBOT_SCHEDULED",
            "ESPWOB",
            "RUNBOT_LOG_DIR",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn strips_directory_prefix_from_user() {
        assert_eq!(normalize_user("ad.jdoe"), "jdoe");
        assert_eq!(normalize_user("jdoe"), "jdoe");
        assert_eq!(normalize_user(" ad.x "), "x");
    }

    #[test]
    fn production_users_match_case_insensitively() {
        assert!(is_production_user("MISPROD", "svc1, misprod"));
        assert!(!is_production_user("jdoe", "svc1,misprod"));
        assert!(!is_production_user("jdoe", ""));
    }

    #[test]
    #[serial]
    fn tracker_url_falls_back_to_legacy_name() {
        clear();
        std::env::set_var("DATABASE_URL", "postgres://localhost/runbot");
        std::env::set_var("JIRA_URL", "https://jira.local");
        std::env::set_var("RUNBOT_USER", "ad.svc");
        std::env::set_var("RUNBOT_PRODUCTION_USERS", "svc");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.tracker_url, "https://jira.local");
        assert_eq!(cfg.user, "svc");
        assert!(cfg.production);
        assert_eq!(cfg.log_dir, PathBuf::from("/NAS/mis/tmp/_runbot"));
        assert_eq!(cfg.sync_window_days, 7);
        clear();
    }

    #[test]
    #[serial]
    fn scheduler_marker_sets_scheduled_flag() {
        clear();
        std::env::set_var("DATABASE_URL", "postgres://localhost/runbot");
        std::env::set_var("RUNBOT_TRACKER_URL", "https://jira.local");
        std::env::set_var("ESPWOB", "mis_ha02_00_c");

        let cfg = Config::from_env().unwrap();
        assert!(cfg.scheduled);
        assert!(!cfg.production);
        clear();
    }

    #[test]
    #[serial]
    fn missing_tracker_url_is_an_error() {
        clear();
        std::env::set_var("DATABASE_URL", "postgres://localhost/runbot");
        assert!(Config::from_env().is_err());
        clear();
    }
}
