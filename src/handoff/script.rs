//! Handoff that runs an external command

use super::traits::Handoff;
use crate::config::ScriptConfig;
use crate::error::{Error, Result};
use crate::types::CompletedDownload;
use crate::utils::tail_lines;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs a script for every completed download
///
/// The script receives the download through environment variables:
/// - `PIU_SOURCE` - the downloaded URL
/// - `PIU_OUTPUT_PATH` - the file written by the downloader
/// - `PIU_COMPLETED_AT` - completion time (RFC 3339)
pub struct ScriptHandoff {
    path: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ScriptHandoff {
    /// Create a handoff from configuration
    pub fn new(config: ScriptConfig) -> Self {
        Self {
            path: config.path,
            args: config.args,
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl Handoff for ScriptHandoff {
    async fn hand_off(
        &self,
        completed: &CompletedDownload,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let run = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.path)
                .args(&self.args)
                .env("PIU_SOURCE", &completed.source)
                .env("PIU_OUTPUT_PATH", &completed.output_path)
                .env("PIU_COMPLETED_AT", completed.completed_at.to_rfc3339())
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        );

        // Dropping `run` kills the child
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(script = ?self.path, source = %completed.source, "handoff script cancelled");
                return Err(Error::Cancelled);
            }
            result = run => result,
        };

        match result {
            Ok(Ok(output)) if output.status.success() => {
                tracing::debug!(script = ?self.path, source = %completed.source, "handoff script executed successfully");
                Ok(())
            }
            Ok(Ok(output)) => {
                let exit_code = output.status.code();
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::ExternalTool(format!(
                    "handoff script {} exited with code {:?}: {}",
                    self.path.display(),
                    exit_code,
                    tail_lines(&stderr, 3)
                )))
            }
            Ok(Err(e)) => Err(Error::ExternalTool(format!(
                "failed to run handoff script {}: {}",
                self.path.display(),
                e
            ))),
            Err(_) => Err(Error::ExternalTool(format!(
                "handoff script {} timed out after {:?}",
                self.path.display(),
                self.timeout
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "script"
    }
}
