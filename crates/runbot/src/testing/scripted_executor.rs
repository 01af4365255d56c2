//! Executor that returns a canned result instead of spawning anything.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RunbotError;
use crate::jobs::executor::{CommandExecutor, ExecutionResult};

#[derive(Debug, Clone)]
enum Script {
    Exit { code: i32, output: String },
    SpawnError,
}

#[derive(Debug)]
pub struct ScriptedExecutor {
    script: Script,
    executed: Arc<RwLock<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn exit_code(code: i32) -> Self {
        Self::with_output(code, "")
    }

    pub fn with_output(code: i32, output: impl Into<String>) -> Self {
        Self {
            script: Script::Exit {
                code,
                output: output.into(),
            },
            executed: Arc::default(),
        }
    }

    /// Every call fails as if the shell could not be launched.
    pub fn spawn_error() -> Self {
        Self {
            script: Script::SpawnError,
            executed: Arc::default(),
        }
    }

    /// Commands received, in order.
    pub async fn executed(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &str) -> Result<ExecutionResult, RunbotError> {
        self.executed.write().await.push(command.to_string());
        match &self.script {
            Script::Exit { code, output } => Ok(ExecutionResult::from_exit_code(*code, output.clone())),
            Script::SpawnError => Err(RunbotError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "scripted spawn failure",
            ))),
        }
    }
}
