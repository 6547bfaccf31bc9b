use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::cli::render::{log_report, orbit_settings, render_assets, require_path};
use crate::config::{Opts, RenderOptions};
use crate::render::enumerate::Asset;

#[derive(Parser, Debug, Clone)]
pub struct SingleCommand {
    #[command(flatten)]
    pub render: RenderOptions,
    /// Asset file to render
    pub asset: PathBuf,
    pub save_dir: PathBuf,
    /// Output name, defaults to the file stem
    #[arg(long)]
    pub id: Option<String>,
}

impl SubCommandExtend for SingleCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        require_path(&self.asset)?;
        let settings = orbit_settings(&self.render)?;
        let id = match &self.id {
            Some(id) => id.clone(),
            None => self
                .asset
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "asset".to_string()),
        };
        let asset = Asset::from_file(id, self.asset.clone());
        let report = render_assets(&self.render, settings, vec![asset], self.save_dir.clone()).await?;
        log_report(&report);
        if !report.failed.is_empty() {
            anyhow::bail!("failed to render {}", self.asset.display());
        }
        Ok(())
    }
}
