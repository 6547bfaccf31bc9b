//! Drives the renderer over a chunk of assets, one asset at a time
//!
//! Per asset: `Pending -> Skipped` when the resume guard says its output is
//! already there, otherwise `Pending -> InProgress -> Done | Failed`. A failed
//! asset never aborts the chunk.

use std::path::Path;

use clap::ValueEnum;
use indicatif::ProgressBar;
use log::{debug, warn};

use crate::error::{ConfigError, RenderError};
use crate::metrics;
use crate::render::enumerate::Asset;
use crate::render::gate::{self, BBox2d, Detection, Verdict};
use crate::render::renderer::{AssetHandle, AssetRef, CameraSpec, Capture, Channel, Renderer};
use crate::render::resume::{AssetState, FileSystem, ResumePolicy, TMP_SUFFIX, derive_state};
use crate::render::sampler::{Rig, ViewSample};

pub const DEFAULT_PHYSICS_STEPS: u32 = 100;
pub const DEFAULT_RENDER_STEPS: u32 = 8;

const VIEW_NAMES: [&str; 4] = ["front", "left", "back", "right"];

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingStyle {
    /// `<asset>_<i>.png`
    #[default]
    Index,
    /// `<asset>_front.png`, `left`, `back`, `right`
    View,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub rig: Rig,
    pub sample_number: usize,
    pub distance_scale: f64,
    pub physics_steps: u32,
    pub render_steps: u32,
    pub naming: NamingStyle,
    /// Capture the frame with the 2D box drawn on it
    pub show_bbox: bool,
    pub camera: CameraSpec,
    pub resume: ResumePolicy,
}

impl RenderSettings {
    /// Isolated objects, every view kept
    pub fn orbit(sample_number: usize, init_azimuth: f64) -> Self {
        Self {
            rig: Rig::orbit(init_azimuth),
            sample_number,
            distance_scale: 1.0,
            physics_steps: DEFAULT_PHYSICS_STEPS,
            render_steps: DEFAULT_RENDER_STEPS,
            naming: NamingStyle::Index,
            show_bbox: false,
            camera: CameraSpec::isolated(),
            resume: ResumePolicy::ExactCount(sample_number),
        }
    }

    /// Objects inside a scene; views may be dropped, so any output counts as done
    pub fn two_ring(sample_number: usize) -> Self {
        Self {
            rig: Rig::two_ring(),
            camera: CameraSpec::in_scene(),
            resume: ResumePolicy::NonEmpty,
            ..Self::orbit(sample_number, 0.0)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.sample_number;
        if self.rig.is_two_ring() && (n == 0 || n % 2 != 0) {
            return Err(ConfigError::OddTwoRingSamples(n));
        }
        if self.naming == NamingStyle::View && n != VIEW_NAMES.len() {
            return Err(ConfigError::ViewNamingNeedsFourSamples(n));
        }
        Ok(())
    }

    pub fn frame_name(&self, asset: &str, index: usize) -> String {
        let view = match self.naming {
            NamingStyle::View => VIEW_NAMES.get(index).map(|s| s.to_string()),
            NamingStyle::Index => None,
        }
        .unwrap_or_else(|| index.to_string());
        let suffix = if self.show_bbox { "_bbox" } else { "" };
        format!("{}_{}{}.png", asset, view, suffix)
    }

    fn channel(&self) -> Channel {
        if self.show_bbox { Channel::RgbWithBox } else { Channel::Rgb }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetOutcome {
    /// Output already complete
    Skipped,
    Done { saved: usize, rejected: usize },
    Failed(String),
}

impl AssetOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AssetOutcome::Skipped => "skipped",
            AssetOutcome::Done { .. } => "done",
            AssetOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub done: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
    pub views_saved: usize,
    pub views_rejected: usize,
}

impl ChunkReport {
    fn record(&mut self, asset: &Asset, outcome: &AssetOutcome) {
        match outcome {
            AssetOutcome::Skipped => self.skipped += 1,
            AssetOutcome::Done { saved, rejected } => {
                self.done += 1;
                self.views_saved += saved;
                self.views_rejected += rejected;
            }
            AssetOutcome::Failed(_) => self.failed.push(asset.id.clone()),
        }
    }
}

pub struct Orchestrator<'a, R, F> {
    renderer: &'a mut R,
    fs: F,
    settings: RenderSettings,
}

impl<'a, R: Renderer, F: FileSystem> Orchestrator<'a, R, F> {
    pub fn new(renderer: &'a mut R, fs: F, settings: RenderSettings) -> Self {
        Self { renderer, fs, settings }
    }

    /// Render every asset into `out_dir/<asset>/`
    ///
    /// Only a camera setup failure is returned as an error; per-asset
    /// failures end up in the report.
    pub fn run(
        &mut self,
        assets: &[Asset],
        out_dir: &Path,
        pb: &ProgressBar,
    ) -> Result<ChunkReport, RenderError> {
        self.renderer.setup_cameras(self.settings.sample_number, &self.settings.camera)?;

        let mut report = ChunkReport::default();
        pb.set_length(assets.len() as u64);
        for asset in assets {
            pb.set_message(asset.id.clone());
            let outcome = self.render_asset(asset, out_dir);
            if let AssetOutcome::Failed(reason) = &outcome {
                pb.println(format!("[ERR] {}: {}", asset.id, reason));
            }
            metrics::inc_asset(outcome.label());
            report.record(asset, &outcome);
            pb.inc(1);
        }
        Ok(report)
    }

    fn render_asset(&mut self, asset: &Asset, out_dir: &Path) -> AssetOutcome {
        let dir = out_dir.join(&asset.id);
        if derive_state(&self.fs, &dir, self.settings.resume) == AssetState::Done {
            debug!("{} already rendered, skipping", asset.id);
            return AssetOutcome::Skipped;
        }

        match self.try_render(asset, &dir) {
            Ok((saved, rejected)) => AssetOutcome::Done { saved, rejected },
            Err(e) => {
                warn!("failed to render {}: {}", asset.id, e);
                AssetOutcome::Failed(e.to_string())
            }
        }
    }

    fn try_render(&mut self, asset: &Asset, dir: &Path) -> Result<(usize, usize), RenderError> {
        if let AssetRef::File { path } = &asset.source {
            if !path.exists() {
                return Err(RenderError::MissingSource(path.clone()));
            }
        }

        let handle = self.renderer.place_asset(&asset.source)?;
        let result = self.capture_asset(asset, &handle, dir);
        // removed on every path, or it leaks into the next asset's frames
        if let Err(e) = self.renderer.remove_asset(&handle) {
            warn!("failed to remove {} from the stage: {}", asset.id, e);
        }
        result
    }

    fn capture_asset(
        &mut self,
        asset: &Asset,
        handle: &AssetHandle,
        dir: &Path,
    ) -> Result<(usize, usize), RenderError> {
        let settings = self.settings;
        let bbox = self.renderer.compute_bounding_box(handle)?;
        if !bbox.is_usable() {
            return Err(RenderError::DegenerateBounds { asset: asset.id.clone() });
        }

        let mut views = settings.rig.sample(&bbox, settings.sample_number, settings.distance_scale);
        let center = bbox.center();
        for view in &views {
            self.renderer.set_camera_pose(view.index, &view.pose(center))?;
        }
        self.renderer.settle(settings.physics_steps, settings.render_steps)?;

        let detections = if settings.rig.is_two_ring() {
            views.iter().map(|v| self.detect(v.index)).collect::<Result<Vec<_>, _>>()?
        } else {
            vec![Detection::none(); views.len()]
        };
        let verdicts = gate::gate(&settings.rig, &detections);

        std::fs::create_dir_all(dir)?;
        let (mut saved, mut rejected) = (0, 0);
        for (view, verdict) in views.iter_mut().zip(&verdicts) {
            view.valid = Some(verdict.is_accepted());
            if !verdict.is_accepted() {
                log_rejection(asset, view, verdict);
                rejected += 1;
                continue;
            }
            let png = match self.renderer.capture_frame(view.index, settings.channel())? {
                Capture::Pixels(png) => png,
                other => {
                    return Err(RenderError::UnexpectedCapture {
                        camera: view.index,
                        expected: "pixels",
                        got: other.kind(),
                    });
                }
            };
            write_frame(&dir.join(settings.frame_name(&asset.id, view.index)), &png)?;
            saved += 1;
        }
        debug!("{}: {} views saved, {} rejected", asset.id, saved, rejected);
        Ok((saved, rejected))
    }

    fn detect(&mut self, camera: usize) -> Result<Detection, RenderError> {
        Ok(Detection {
            tight: self.first_box(camera, Channel::BBox2dTight)?,
            loose: self.first_box(camera, Channel::BBox2dLoose)?,
        })
    }

    fn first_box(&mut self, camera: usize, channel: Channel) -> Result<Option<BBox2d>, RenderError> {
        match self.renderer.capture_frame(camera, channel)? {
            Capture::Detections(boxes) => Ok(boxes.into_iter().next()),
            other => Err(RenderError::UnexpectedCapture {
                camera,
                expected: "detections",
                got: other.kind(),
            }),
        }
    }
}

fn log_rejection(asset: &Asset, view: &ViewSample, verdict: &Verdict) {
    match verdict {
        Verdict::Occluded { ratio } => warn!(
            "{}: view {} rejected: {} (area ratio {:.3})",
            asset.id,
            view.index,
            verdict.reason(),
            ratio
        ),
        _ => warn!("{}: view {} rejected: {}", asset.id, view.index, verdict.reason()),
    }
    metrics::inc_view_rejected(verdict.reason());
}

/// Write to `<out_dir>/.<frame>.tmp` then rename into the asset dir
///
/// The temp file lives outside the counted directory, so a crash mid-write
/// never adds an entry the resume guard would count as a frame.
fn write_frame(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let staging = path.parent().and_then(Path::parent).unwrap_or(Path::new("."));
    let tmp = staging.join(format!(".{}{}", name, TMP_SUFFIX));
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}
