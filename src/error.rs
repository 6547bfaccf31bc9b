use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors detected before any work starts
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid chunk count: {0} (must be a positive integer)")]
    InvalidChunkCount(i64),
    #[error("chunk id {chunk_id} out of range for {chunk_total} chunks")]
    InvalidChunkId { chunk_id: usize, chunk_total: usize },
    #[error("required path not found: {}", .0.display())]
    MissingPath(PathBuf),
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("naming style `view` needs exactly 4 samples, got {0}")]
    ViewNamingNeedsFourSamples(usize),
    #[error("two-ring sampling needs an even, non-zero sample number, got {0}")]
    OddTwoRingSamples(usize),
    #[error("invalid proxy url {url}: {reason}")]
    InvalidProxy { url: String, reason: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PartitionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failures of a single asset; the orchestrator logs them and moves on
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("asset source not found: {}", .0.display())]
    MissingSource(PathBuf),
    #[error("degenerate bounding box for {asset}")]
    DegenerateBounds { asset: String },
    #[error("renderer returned {got} for camera {camera}, expected {expected}")]
    UnexpectedCapture { camera: usize, expected: &'static str, got: &'static str },
    #[error("renderer error: {0}")]
    Renderer(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FragmentError {
    /// Every fragment was already consumed by an earlier merge
    #[error("none of the {0} fragments exist; were they already merged?")]
    NothingToMerge(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("batch job {job_id} failed: {errors}")]
    JobFailed { job_id: String, errors: String },
    #[error("batch job {job_id} did not finish after {polls} polls")]
    PollExhausted { job_id: String, polls: u32 },
    #[error("group {0} not found in submission manifest")]
    UnknownGroup(String),
    #[error("request to batch service failed: {0}")]
    Service(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Service(err.to_string())
    }
}

/// Process exit code of a failed run: 2 for an invalid chunk count, 1 otherwise
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::InvalidChunkCount(_)) => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&ConfigError::InvalidChunkCount(0).into()), 2);
        assert_eq!(exit_code(&ConfigError::MissingEnv("OPENAI_API_KEY").into()), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
