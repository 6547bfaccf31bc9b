use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use tokio::task::spawn_blocking;

use crate::cli::SubCommandExtend;
use crate::cli::render::{log_report, orbit_settings};
use crate::config::{Opts, RenderOptions};
use crate::error::ConfigError;
use crate::render::enumerate::{Asset, filter_instances, find_scene_file, scan_models, suffix_regex};
use crate::render::orchestrator::{ChunkReport, Orchestrator, RenderSettings};
use crate::render::renderer::{HttpRenderer, Renderer};
use crate::render::resume::StdFileSystem;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct SceneCommand {
    #[command(flatten)]
    pub render: RenderOptions,
    /// Extracted scene directory, holding the scene file and `models/`
    pub scene_dir: PathBuf,
    /// Substring identifying the scene file
    #[arg(long, default_value = "copy.usd")]
    pub scene_pattern: String,
    /// Prim scope holding the scene instances
    #[arg(long, default_value = "scene/Instances")]
    pub scope: String,
    /// Views per instance in the scene, split over two rings
    #[arg(long, value_name = "N", default_value_t = 6)]
    pub scene_samples: usize,
    /// Skip the isolated model pass
    #[arg(long)]
    pub no_isolated: bool,
}

impl SubCommandExtend for SceneCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let models_dir = self.scene_dir.join("models");
        if !models_dir.is_dir() {
            return Err(ConfigError::MissingPath(models_dir).into());
        }
        let scene_file = find_scene_file(&self.scene_dir, &self.scene_pattern)?
            .ok_or_else(|| ConfigError::MissingPath(self.scene_dir.join(format!("*{}*", self.scene_pattern))))?;

        let orbit = orbit_settings(&self.render)?;
        let two_ring = two_ring_settings(&self.render, self.scene_samples)?;

        let models = scan_models(&models_dir, &suffix_regex(&self.render.suffix)?)?;
        info!("{} models in {}", models.len(), models_dir.display());

        let job = SceneJob {
            url: self.render.renderer_url.clone(),
            timeout: self.render.renderer_timeout(),
            scene_file,
            scope: self.scope.clone(),
            thumbnails: self.scene_dir.join("thumbnails"),
            isolated: (!self.no_isolated).then_some(orbit),
            two_ring,
        };
        let (isolated, in_scene) = spawn_blocking(move || job.run(models)).await??;
        if let Some(report) = isolated {
            log_report(&report);
        }
        log_report(&in_scene);
        Ok(())
    }
}

/// In-scene settings; `--show-bbox` draws the tight box on the accepted frames
fn two_ring_settings(opts: &RenderOptions, samples: usize) -> Result<RenderSettings, ConfigError> {
    let settings = RenderSettings {
        distance_scale: opts.distance_scale,
        physics_steps: opts.physics_steps,
        render_steps: opts.render_steps,
        show_bbox: opts.show_bbox,
        ..RenderSettings::two_ring(samples)
    };
    settings.validate()?;
    Ok(settings)
}

struct SceneJob {
    url: String,
    timeout: std::time::Duration,
    scene_file: PathBuf,
    scope: String,
    thumbnails: PathBuf,
    isolated: Option<RenderSettings>,
    two_ring: RenderSettings,
}

impl SceneJob {
    /// Isolated models first, then the same models inside the loaded scene
    fn run(self, models: Vec<Asset>) -> Result<(Option<ChunkReport>, ChunkReport)> {
        let mut renderer = HttpRenderer::new(&self.url, self.timeout)?;

        let isolated = match self.isolated {
            Some(settings) => {
                let out = self.thumbnails.join("multi_views");
                Some(render_pass(&mut renderer, settings, &models, &out, "isolated")?)
            }
            None => None,
        };

        renderer.load_scene(&self.scene_file)?;
        let instances = renderer.list_instances(&self.scope)?;
        let total = instances.len();
        let instances = filter_instances(instances, &models);
        info!("{} of {} scene instances have an extracted model", instances.len(), total);

        let out = self.thumbnails.join("multi_views_with_bg");
        let in_scene = render_pass(&mut renderer, self.two_ring, &instances, &out, "in scene")?;
        Ok((isolated, in_scene))
    }
}

fn render_pass<R: Renderer>(
    renderer: &mut R,
    settings: RenderSettings,
    assets: &[Asset],
    out: &Path,
    label: &str,
) -> Result<ChunkReport> {
    std::fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let pb = ProgressBar::no_length().with_style(pb_style());
    let report = Orchestrator::new(renderer, StdFileSystem, settings).run(assets, out, &pb)?;
    pb.finish_with_message(format!("{} pass finished", label));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::render::orchestrator::NamingStyle;
    use crate::render::resume::ResumePolicy;

    fn options(args: &[&str]) -> RenderOptions {
        RenderOptions::try_parse_from(std::iter::once("scene").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_two_ring_settings() {
        let settings = two_ring_settings(&options(&["--show-bbox", "--physics-steps", "20"]), 6).unwrap();
        assert!(settings.show_bbox);
        assert!(settings.rig.is_two_ring());
        assert_eq!(settings.physics_steps, 20);
        assert_eq!(settings.naming, NamingStyle::Index);
        assert_eq!(settings.resume, ResumePolicy::NonEmpty);
        assert_eq!(settings.frame_name("vase", 4), "vase_4_bbox.png");

        assert!(!two_ring_settings(&options(&[]), 6).unwrap().show_bbox);
        assert!(matches!(two_ring_settings(&options(&[]), 5), Err(ConfigError::OddTwoRingSamples(5))));
    }
}
