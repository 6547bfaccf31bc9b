use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::batch::client::{API_KEY_ENV, ApiConfig, DEFAULT_BASE_URL, PROXY_ENV};
use crate::batch::tracker::PollConfig;
use crate::cli::*;
use crate::error::ConfigError;
use crate::render::enumerate::DEFAULT_SUFFIX;
use crate::render::orchestrator::{DEFAULT_PHYSICS_STEPS, DEFAULT_RENDER_STEPS, NamingStyle};
use crate::render::partition::Chunk;

static STATE_DIR: LazyLock<StateDir> = LazyLock::new(|| {
    let path = ProjectDirs::from("", "mvannot", "mvannot")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".mvannot"));
    StateDir { path }
});

fn default_state_dir() -> &'static str {
    STATE_DIR.path().to_str().unwrap_or(".mvannot")
}

#[derive(Parser, Debug, Clone)]
pub struct RenderOptions {
    /// Views per asset
    #[arg(short = 'n', long, value_name = "N", default_value_t = 4)]
    pub sample_number: usize,
    /// Azimuth of the first orbit view, in degrees
    #[arg(long, value_name = "DEG", default_value_t = 0.0, allow_negative_numbers = true)]
    pub init_azimuth: f64,
    /// Camera distance as a multiple of the bounding box diagonal
    #[arg(long, value_name = "SCALE", default_value_t = 1.0)]
    pub distance_scale: f64,
    /// Physics steps before capturing, lets lighting settle
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PHYSICS_STEPS)]
    pub physics_steps: u32,
    /// Render steps before capturing
    #[arg(long, value_name = "N", default_value_t = DEFAULT_RENDER_STEPS)]
    pub render_steps: u32,
    /// Frame file naming
    #[arg(long, value_enum, default_value_t = NamingStyle::Index)]
    pub naming: NamingStyle,
    /// Draw the 2D bounding box on saved frames
    #[arg(long)]
    pub show_bbox: bool,
    /// Asset file suffixes, comma separated
    #[arg(long, default_value = DEFAULT_SUFFIX)]
    pub suffix: String,
    /// Endpoint of the render service
    #[arg(long, env = "MVANNOT_RENDERER_URL", default_value = "http://127.0.0.1:8211")]
    pub renderer_url: String,
    /// Timeout of a single renderer call, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 600)]
    pub renderer_timeout: u64,
}

impl RenderOptions {
    pub fn renderer_timeout(&self) -> Duration {
        Duration::from_secs(self.renderer_timeout)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ChunkOptions {
    /// Index of the chunk handled by this worker
    #[arg(long, value_name = "ID", default_value_t = 0)]
    pub chunk_id: usize,
    /// Number of workers the asset list is split across
    #[arg(long, value_name = "N", default_value_t = 1, allow_negative_numbers = true)]
    pub chunk_total: i64,
}

impl ChunkOptions {
    pub fn chunk(&self) -> Result<Chunk, ConfigError> {
        if self.chunk_total <= 0 {
            return Err(ConfigError::InvalidChunkCount(self.chunk_total));
        }
        let chunk_total = self.chunk_total as usize;
        Chunk::new(self.chunk_id, chunk_total)
            .map_err(|_| ConfigError::InvalidChunkId { chunk_id: self.chunk_id, chunk_total })
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ApiOptions {
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,
    /// Proxy for requests to the inference service
    #[arg(long, env = PROXY_ENV)]
    pub proxy: Option<String>,
    #[arg(long, env = "INFERENCE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
    /// Timeout of a single API request, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub api_timeout: u64,
}

impl ApiOptions {
    pub fn api_config(&self) -> Result<ApiConfig, ConfigError> {
        ApiConfig::new(
            self.api_key.clone(),
            self.proxy.clone(),
            &self.base_url,
            Duration::from_secs(self.api_timeout),
        )
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PollOptions {
    /// Seconds between two status checks of a batch job
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub poll_interval: u64,
    /// Give up after this many status checks
    #[arg(long, value_name = "N")]
    pub max_polls: Option<u32>,
}

impl PollOptions {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig { interval: Duration::from_secs(self.poll_interval), max_polls: self.max_polls }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "mvannot", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// Directory holding submission manifests
    #[arg(short, long, global = true, default_value = default_state_dir())]
    pub state_dir: StateDir,
    /// Write prometheus metrics of this run to a file
    #[arg(long, global = true, value_name = "PATH")]
    pub metrics_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// Render one chunk of an asset library
    Render(RenderCommand),
    /// Render the objects of an extracted scene, isolated and in place
    Scene(SceneCommand),
    /// Render a single asset file
    Single(SingleCommand),
    /// Build the batch request file from rendered views
    Request(RequestCommand),
    /// Submit a request file as batch jobs
    Submit(SubmitCommand),
    /// Wait for submitted jobs and download their results
    Retrieve(RetrieveCommand),
    /// Turn a result file into an annotation record
    Annotate(AnnotateCommand),
    /// Ask a single question about one asset's views
    Ask(AskCommand),
    /// Launch one worker per chunk through a launch script
    Dispatch(DispatchCommand),
}

#[derive(Debug, Clone)]
pub struct StateDir {
    path: PathBuf,
}

impl StateDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Submission manifest shared by `submit` and `retrieve`
    pub fn submissions(&self) -> PathBuf {
        self.path.join("submissions.json")
    }

    pub fn results(&self) -> PathBuf {
        self.path.join("results")
    }
}

impl FromStr for StateDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
