use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};
use tokio::task::spawn_blocking;

use crate::cli::SubCommandExtend;
use crate::config::{ChunkOptions, Opts, RenderOptions};
use crate::error::ConfigError;
use crate::render::enumerate::{Asset, scan_library, suffix_regex};
use crate::render::orchestrator::{ChunkReport, Orchestrator, RenderSettings};
use crate::render::renderer::HttpRenderer;
use crate::render::resume::StdFileSystem;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct RenderCommand {
    #[command(flatten)]
    pub render: RenderOptions,
    #[command(flatten)]
    pub chunk: ChunkOptions,
    /// Asset library laid out as `<category>/<asset>/<asset>.usd`
    pub assets: PathBuf,
    /// One output directory per asset is created here
    pub save_dir: PathBuf,
}

impl SubCommandExtend for RenderCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let chunk = self.chunk.chunk()?;
        if !self.assets.is_dir() {
            return Err(ConfigError::MissingPath(self.assets.clone()).into());
        }
        let settings = orbit_settings(&self.render)?;

        let re_suf = suffix_regex(&self.render.suffix)?;
        let assets = scan_library(&self.assets, &re_suf)?;
        let range = chunk.range(assets.len());
        info!(
            "chunk {}/{}: assets [{}, {}) of {}",
            chunk.id,
            chunk.total,
            range.start,
            range.end,
            assets.len()
        );

        let report =
            render_assets(&self.render, settings, assets[range].to_vec(), self.save_dir.clone()).await?;
        log_report(&report);
        Ok(())
    }
}

/// Orbit settings from the command line, validated
pub(crate) fn orbit_settings(opts: &RenderOptions) -> Result<RenderSettings, ConfigError> {
    let settings = RenderSettings {
        distance_scale: opts.distance_scale,
        physics_steps: opts.physics_steps,
        render_steps: opts.render_steps,
        naming: opts.naming,
        show_bbox: opts.show_bbox,
        ..RenderSettings::orbit(opts.sample_number, opts.init_azimuth)
    };
    settings.validate()?;
    Ok(settings)
}

/// Run the orchestrator on a blocking thread; the renderer client must not live on the runtime
pub(crate) async fn render_assets(
    opts: &RenderOptions,
    settings: RenderSettings,
    assets: Vec<Asset>,
    save_dir: PathBuf,
) -> Result<ChunkReport> {
    let url = opts.renderer_url.clone();
    let timeout = opts.renderer_timeout();
    spawn_blocking(move || -> Result<ChunkReport> {
        std::fs::create_dir_all(&save_dir)
            .with_context(|| format!("failed to create {}", save_dir.display()))?;
        let mut renderer = HttpRenderer::new(&url, timeout)?;
        let pb = ProgressBar::no_length().with_style(pb_style());
        let report = Orchestrator::new(&mut renderer, StdFileSystem, settings).run(&assets, &save_dir, &pb)?;
        pb.finish_with_message("render finished");
        Ok(report)
    })
    .await?
}

pub(crate) fn log_report(report: &ChunkReport) {
    info!(
        "{} rendered, {} skipped, {} failed; {} views saved, {} rejected",
        report.done,
        report.skipped,
        report.failed.len(),
        report.views_saved,
        report.views_rejected
    );
    if !report.failed.is_empty() {
        warn!("failed assets: {}", report.failed.join(", "));
    }
}

pub(crate) fn require_path(path: &Path) -> Result<(), ConfigError> {
    if path.exists() { Ok(()) } else { Err(ConfigError::MissingPath(path.to_path_buf())) }
}
