//! The simulator that actually places assets and produces frames
//!
//! The simulated world and its cameras are process-wide mutable state, so every
//! method takes `&mut self` and callers drive one asset at a time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::RenderError;
use crate::render::gate::BBox2d;
use crate::render::sampler::{Aabb, CameraPose};

pub type CameraId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetRef {
    /// A standalone asset file referenced into the stage
    File { path: PathBuf },
    /// A prim of the currently loaded scene
    SceneInstance { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Rgb,
    /// Rgb with the tight 2D box drawn over the object
    RgbWithBox,
    BBox2dTight,
    BBox2dLoose,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// Encoded PNG
    Pixels(Vec<u8>),
    Detections(Vec<BBox2d>),
}

impl Capture {
    pub fn kind(&self) -> &'static str {
        match self {
            Capture::Pixels(_) => "pixels",
            Capture::Detections(_) => "detections",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub width: u32,
    pub height: u32,
    pub focal_length: f64,
    pub with_bbox2d: bool,
}

impl CameraSpec {
    pub fn isolated() -> Self {
        Self { width: 512, height: 512, focal_length: 18.0, with_bbox2d: false }
    }

    pub fn in_scene() -> Self {
        Self { width: 600, height: 450, focal_length: 9.0, with_bbox2d: true }
    }
}

pub trait Renderer {
    /// Reference a background scene into the stage
    fn load_scene(&mut self, path: &Path) -> Result<(), RenderError>;

    /// Names of the mesh prims under `scope` of the loaded scene
    fn list_instances(&mut self, scope: &str) -> Result<Vec<String>, RenderError>;

    /// (Re)create cameras `0..count`
    fn setup_cameras(&mut self, count: usize, camera: &CameraSpec) -> Result<(), RenderError>;

    fn place_asset(&mut self, asset: &AssetRef) -> Result<AssetHandle, RenderError>;

    fn compute_bounding_box(&mut self, handle: &AssetHandle) -> Result<Aabb, RenderError>;

    fn set_camera_pose(&mut self, camera: CameraId, pose: &CameraPose) -> Result<(), RenderError>;

    fn step_simulation(&mut self, render: bool) -> Result<(), RenderError>;

    /// Advance the world so lighting settles, then render a few frames
    fn settle(&mut self, physics_steps: u32, render_steps: u32) -> Result<(), RenderError> {
        for _ in 0..physics_steps {
            self.step_simulation(false)?;
        }
        for _ in 0..render_steps {
            self.step_simulation(true)?;
        }
        Ok(())
    }

    fn capture_frame(&mut self, camera: CameraId, channel: Channel) -> Result<Capture, RenderError>;

    /// Take the asset out of the stage (or clear the labels of a scene instance)
    fn remove_asset(&mut self, handle: &AssetHandle) -> Result<(), RenderError>;
}

/// Renderer living in a separate simulator process, driven over a JSON RPC endpoint
///
/// Request: `POST {base_url}/rpc` with `{"method": ..., "params": {...}}`.
/// Response: `{"result": ...}` or `{"error": "..."}`.
pub struct HttpRenderer {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireCapture {
    Pixels { data: String },
    Detections { boxes: Vec<[f64; 4]> },
}

impl HttpRenderer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RenderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Renderer(e.to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RenderError> {
        debug!("rpc {} {}", method, params);
        let response = self
            .client
            .post(format!("{}/rpc", self.base_url))
            .json(&json!({ "method": method, "params": params }))
            .send()
            .map_err(|e| RenderError::Renderer(format!("{}: {}", method, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(RenderError::Renderer(format!("{}: {} {}", method, status, text)));
        }

        let body: RpcResponse =
            response.json().map_err(|e| RenderError::Renderer(format!("{}: {}", method, e)))?;
        if let Some(error) = body.error {
            return Err(RenderError::Renderer(format!("{}: {}", method, error)));
        }
        serde_json::from_value(body.result)
            .map_err(|e| RenderError::Renderer(format!("{}: bad result: {}", method, e)))
    }
}

impl Renderer for HttpRenderer {
    fn load_scene(&mut self, path: &Path) -> Result<(), RenderError> {
        self.call::<Value>("load_scene", json!({ "path": path })).map(drop)
    }

    fn list_instances(&mut self, scope: &str) -> Result<Vec<String>, RenderError> {
        self.call("list_instances", json!({ "scope": scope }))
    }

    fn setup_cameras(&mut self, count: usize, camera: &CameraSpec) -> Result<(), RenderError> {
        self.call::<Value>("setup_cameras", json!({ "count": count, "camera": camera })).map(drop)
    }

    fn place_asset(&mut self, asset: &AssetRef) -> Result<AssetHandle, RenderError> {
        self.call("place_asset", json!({ "asset": asset }))
    }

    fn compute_bounding_box(&mut self, handle: &AssetHandle) -> Result<Aabb, RenderError> {
        self.call("compute_bounding_box", json!({ "handle": handle }))
    }

    fn set_camera_pose(&mut self, camera: CameraId, pose: &CameraPose) -> Result<(), RenderError> {
        self.call::<Value>("set_camera_pose", json!({ "camera": camera, "pose": pose })).map(drop)
    }

    fn step_simulation(&mut self, render: bool) -> Result<(), RenderError> {
        self.settle(u32::from(!render), u32::from(render))
    }

    // one round trip for the whole settle sequence
    fn settle(&mut self, physics_steps: u32, render_steps: u32) -> Result<(), RenderError> {
        self.call::<Value>(
            "settle",
            json!({ "physics_steps": physics_steps, "render_steps": render_steps }),
        )
        .map(drop)
    }

    fn capture_frame(&mut self, camera: CameraId, channel: Channel) -> Result<Capture, RenderError> {
        let wire: WireCapture =
            self.call("capture_frame", json!({ "camera": camera, "channel": channel }))?;
        match wire {
            WireCapture::Pixels { data } => BASE64
                .decode(data)
                .map(Capture::Pixels)
                .map_err(|e| RenderError::Renderer(format!("capture_frame: {}", e))),
            WireCapture::Detections { boxes } => Ok(Capture::Detections(
                boxes.into_iter().map(|[x0, y0, x1, y1]| BBox2d::new(x0, y0, x1, y1)).collect(),
            )),
        }
    }

    fn remove_asset(&mut self, handle: &AssetHandle) -> Result<(), RenderError> {
        self.call::<Value>("remove_asset", json!({ "handle": handle })).map(drop)
    }
}
