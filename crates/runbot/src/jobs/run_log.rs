use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const NEW_RUN_BANNER: &str = "\n\n#############################\n\
                              ### NEW RUNBOT RUN BEGINS ###\n\
                              #############################\n";

/// The per-request log file on the shared log directory. Reruns of the same
/// request append to the same file, separated by a banner.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub async fn open(log_dir: &Path, log_name: &str) -> std::io::Result<Self> {
        fs::create_dir_all(log_dir).await?;
        let path = log_dir.join(log_name);

        let has_content = match fs::metadata(&path).await {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e),
        };

        let log = Self { path };
        if has_content {
            log.append(NEW_RUN_BANNER).await?;
        } else {
            log.append("").await?;
        }
        log.make_shared().await?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, text: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }

    pub async fn contents(&self) -> std::io::Result<String> {
        fs::read_to_string(&self.path).await
    }

    #[cfg(unix)]
    async fn make_shared(&self) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o755)).await
    }

    #[cfg(not(unix))]
    async fn make_shared(&self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_run_has_no_banner() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::open(dir.path(), "a_1.log").await.unwrap();
        log.append("hello\n").await.unwrap();
        assert_eq!(log.contents().await.unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn later_runs_are_separated_by_banner() {
        let dir = tempfile::tempdir().unwrap();
        let first = RunLog::open(dir.path(), "a_1.log").await.unwrap();
        first.append("run one\n").await.unwrap();

        let second = RunLog::open(dir.path(), "a_1.log").await.unwrap();
        second.append("run two\n").await.unwrap();

        let text = second.contents().await.unwrap();
        assert!(text.starts_with("run one\n"));
        assert!(text.contains("### NEW RUNBOT RUN BEGINS ###"));
        assert!(text.ends_with("run two\n"));
    }

    #[tokio::test]
    async fn creates_missing_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("_runbot");
        let log = RunLog::open(&nested, "x_2.log").await.unwrap();
        assert!(log.path().exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(log.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}
