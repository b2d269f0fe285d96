//! Processor that runs an external command once per instance key.

use crate::error::{Error, Result};
use crate::model::InstanceKey;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// An executable invoked as `program [args..] host:port`.
///
/// The key is also exported as `DISPATCHQ_KEY`, `DISPATCHQ_HOST` and
/// `DISPATCHQ_PORT`.
#[derive(Debug, Clone)]
pub struct HookCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl HookCommand {
    /// Relative program paths are resolved against the current directory
    /// now, so later directory changes don't affect which binary runs.
    pub fn new(program: impl AsRef<Path>, args: Vec<String>) -> Result<Self> {
        let program = program.as_ref();
        let program = if program.is_relative() && program.components().count() > 1 {
            std::env::current_dir()?.join(program)
        } else {
            program.to_path_buf()
        };
        Ok(Self { program, args })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the command for `key`, failing on a non-zero exit.
    pub async fn run(&self, key: &InstanceKey) -> Result<()> {
        debug!(
            %key,
            command = %self.program.display(),
            "running hook"
        );

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(key.to_string())
            .env("DISPATCHQ_KEY", key.to_string())
            .env("DISPATCHQ_HOST", &key.hostname)
            .env("DISPATCHQ_PORT", key.port.to_string())
            .kill_on_drop(true)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Other(format!(
                "hook exited with status {}",
                status.code().unwrap_or(-1)
            )))
        }
    }

    /// Processor entry point: run the hook and log the outcome. Failures
    /// stop here; the queue only learns that the call returned.
    pub async fn process(&self, key: InstanceKey) {
        let start = Instant::now();
        match self.run(&key).await {
            Ok(()) => info!(
                %key,
                duration_ms = start.elapsed().as_millis() as u64,
                "hook completed"
            ),
            Err(e) => warn!(
                %key,
                duration_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "hook failed"
            ),
        }
    }
}
