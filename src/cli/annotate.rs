use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use log::info;

use crate::batch::demux::{demux_by_groups, demux_by_names, load_groups, load_names, read_results, save_record};
use crate::cli::SubCommandExtend;
use crate::cli::render::require_path;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct AnnotateCommand {
    /// Merged result file of one group
    pub results: PathBuf,
    /// Annotation record to write, `{asset: answer}`
    pub output: PathBuf,
    /// Asset names indexed by `custom_id`, as written by `request`
    #[arg(long, value_name = "PATH", required_unless_present = "groups", conflicts_with = "groups")]
    pub names: Option<PathBuf>,
    /// Duplicate groups, `{custom_id: [asset, ...]}`; every member gets the answer
    #[arg(long, value_name = "PATH")]
    pub groups: Option<PathBuf>,
}

impl SubCommandExtend for AnnotateCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        require_path(&self.results)?;
        let results = read_results(&self.results)?;
        let record = match (&self.names, &self.groups) {
            (_, Some(groups)) => demux_by_groups(&results, &load_groups(groups)?),
            (Some(names), None) => demux_by_names(&results, &load_names(names)?),
            (None, None) => bail!("either --names or --groups is required"),
        };
        info!("{} answers annotate {} assets", results.len(), record.len());
        save_record(&record, &self.output)
    }
}
