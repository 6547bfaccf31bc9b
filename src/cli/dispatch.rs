use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use tokio::process::Command;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::error::ConfigError;

#[derive(Parser, Debug, Clone)]
pub struct DispatchCommand {
    /// Number of chunks, one worker each
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub total: i64,
    /// Task name handed to the launch script
    #[arg(long, default_value = "render")]
    pub name: String,
    /// Extra argument handed to every worker, usually the asset root
    #[arg(long, value_name = "PATH")]
    pub data_sources: Option<String>,
    /// Launch script, called as `<script> <task> <chunk_id> <chunk_total> [sources]`
    #[arg(long, default_value = "launch.sh")]
    pub script: PathBuf,
}

impl DispatchCommand {
    fn worker(&self, chunk_id: i64) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg(&self.script).arg(&self.name).arg(chunk_id.to_string()).arg(self.total.to_string());
        if let Some(sources) = &self.data_sources {
            cmd.arg(sources);
        }
        cmd
    }
}

impl SubCommandExtend for DispatchCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        if self.total <= 0 {
            return Err(ConfigError::InvalidChunkCount(self.total).into());
        }
        if !self.script.is_file() {
            return Err(ConfigError::MissingPath(self.script.clone()).into());
        }

        let mut failed = vec![];
        for chunk_id in 0..self.total {
            info!("launching {} chunk {}/{}", self.name, chunk_id, self.total);
            let status = self
                .worker(chunk_id)
                .status()
                .await
                .with_context(|| format!("failed to launch {}", self.script.display()))?;
            if !status.success() {
                error!("chunk {} exited with {}", chunk_id, status);
                failed.push(chunk_id.to_string());
            }
        }
        if !failed.is_empty() {
            bail!("{} of {} chunks failed: {}", failed.len(), self.total, failed.join(", "));
        }
        Ok(())
    }
}
