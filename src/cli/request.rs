use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crate::batch::request::{DEFAULT_MODEL, DEFAULT_TEMPERATURE, RequestBuilder, Task, list_asset_dirs};
use crate::cli::SubCommandExtend;
use crate::cli::render::require_path;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct RequestCommand {
    /// Directory holding one subdirectory of rendered views per asset
    pub views_dir: PathBuf,
    /// Request file to write, one JSON line per asset
    pub output: PathBuf,
    #[arg(short, long, value_enum, default_value_t = Task::Caption)]
    pub task: Task,
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f64,
    /// Asset names indexed by `custom_id`, defaults to `<output stem>_names.json`
    #[arg(long, value_name = "PATH")]
    pub names: Option<PathBuf>,
}

impl RequestCommand {
    fn names_path(&self) -> PathBuf {
        self.names.clone().unwrap_or_else(|| {
            let stem = self.output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            self.output.with_file_name(format!("{}_names.json", stem))
        })
    }
}

impl SubCommandExtend for RequestCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        require_path(&self.views_dir)?;
        let builder = RequestBuilder {
            model: self.model.clone(),
            temperature: self.temperature,
            ..RequestBuilder::new(self.task)
        };

        let assets = list_asset_dirs(&self.views_dir)?;
        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let names = builder.write_jsonl(&assets, &self.output)?;

        let names_path = self.names_path();
        std::fs::write(&names_path, serde_json::to_string_pretty(&names)?)
            .with_context(|| format!("failed to write {}", names_path.display()))?;
        info!("{} of {} assets requested, names in {}", names.len(), assets.len(), names_path.display());
        Ok(())
    }
}
