use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::batch::client::OpenAiClient;
use crate::batch::fragment::DEFAULT_BUDGET;
use crate::batch::manifest;
use crate::batch::pipeline::Pipeline;
use crate::batch::request::Task;
use crate::batch::tracker::PollConfig;
use crate::cli::SubCommandExtend;
use crate::cli::render::require_path;
use crate::config::{ApiOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct SubmitCommand {
    #[command(flatten)]
    pub api: ApiOptions,
    /// Request file built by `request`
    pub input: PathBuf,
    /// Group the jobs are recorded under, defaults to the file stem up to the first `_`
    #[arg(short, long)]
    pub group: Option<String>,
    #[arg(short, long, value_enum, default_value_t = Task::Caption)]
    pub task: Task,
    /// Largest fragment uploaded as one job, in MiB
    #[arg(long, value_name = "MIB", default_value_t = DEFAULT_BUDGET / 1024 / 1024)]
    pub budget_mib: u64,
}

impl SubCommandExtend for SubmitCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let client = OpenAiClient::new(self.api.api_config()?)?;
        require_path(&self.input)?;

        let pipeline = Pipeline::new(&client, PollConfig::default());
        let submission = pipeline
            .submit(&self.input, self.group.as_deref(), self.task, self.budget_mib * 1024 * 1024)
            .await?;
        for id in &submission.batch_ids {
            println!("{}", id);
        }
        info!("submitted {} jobs for group {}", submission.batch_ids.len(), submission.group);
        manifest::record(&opts.state_dir.submissions(), submission)
    }
}
