use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::batch::ask::ask;
use crate::batch::client::OpenAiClient;
use crate::batch::request::{DEFAULT_MODEL, RequestBuilder, Task};
use crate::cli::SubCommandExtend;
use crate::cli::render::require_path;
use crate::config::{ApiOptions, Opts};
use crate::utils::RetryPolicy;

#[derive(Parser, Debug, Clone)]
pub struct AskCommand {
    #[command(flatten)]
    pub api: ApiOptions,
    /// Rendered views of one asset
    pub view_dir: PathBuf,
    #[arg(short, long, value_enum, default_value_t = Task::FrontView)]
    pub task: Task,
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,
    /// Retry until the answer is a plain number
    #[arg(long)]
    pub numeric: bool,
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub max_attempts: u32,
    #[arg(long, value_name = "MS", default_value_t = 1500)]
    pub retry_delay_ms: u64,
}

impl SubCommandExtend for AskCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let client = OpenAiClient::new(self.api.api_config()?)?;
        require_path(&self.view_dir)?;

        let builder = RequestBuilder { model: self.model.clone(), ..RequestBuilder::new(self.task) };
        let policy = RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        };
        let answer = ask(&client, &builder, &self.view_dir, &policy, self.numeric).await?;
        println!("{}", answer);
        Ok(())
    }
}
