use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use log::info;

use crate::batch::client::OpenAiClient;
use crate::batch::manifest;
use crate::batch::pipeline::Pipeline;
use crate::batch::request::Task;
use crate::cli::SubCommandExtend;
use crate::config::{ApiOptions, Opts, PollOptions};

#[derive(Parser, Debug, Clone)]
pub struct RetrieveCommand {
    #[command(flatten)]
    pub api: ApiOptions,
    #[command(flatten)]
    pub poll: PollOptions,
    /// Groups to retrieve, every recorded group of the task when omitted
    #[arg(short, long)]
    pub group: Vec<String>,
    #[arg(short, long, value_enum, default_value_t = Task::Caption)]
    pub task: Task,
    /// Where merged results go, defaults to `<state dir>/results`
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

impl SubCommandExtend for RetrieveCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let client = OpenAiClient::new(self.api.api_config()?)?;

        let recorded = manifest::load(&opts.state_dir.submissions())?;
        let submissions = if self.group.is_empty() {
            recorded.into_iter().filter(|s| s.task == self.task).collect::<Vec<_>>()
        } else {
            self.group
                .iter()
                .map(|group| manifest::find(&recorded, group, self.task).cloned())
                .collect::<Result<Vec<_>, _>>()?
        };
        if submissions.is_empty() {
            info!("nothing submitted for task {}", self.task.as_str());
            return Ok(());
        }

        let out_dir = self.out_dir.clone().unwrap_or_else(|| opts.state_dir.results());
        std::fs::create_dir_all(&out_dir)?;

        let pipeline = Pipeline::new(&client, self.poll.poll_config());
        let mut failed = vec![];
        for (group, result) in pipeline.retrieve_all(&submissions, &out_dir).await {
            match result {
                Ok(report) => {
                    if let Some(output) = report.output {
                        println!("{}\t{}", group, output.display());
                    }
                }
                Err(_) => failed.push(group),
            }
        }
        if !failed.is_empty() {
            bail!("retrieval failed for groups: {}", failed.join(", "));
        }
        Ok(())
    }
}
