pub mod ask;
pub mod client;
pub mod demux;
pub mod fragment;
pub mod manifest;
pub mod pipeline;
pub mod request;
pub mod tracker;

pub use client::{ApiConfig, BatchService, ChatService, OpenAiClient};
pub use pipeline::{Pipeline, ResultPaths};
pub use request::{RequestBuilder, Task};
pub use tracker::{JobStatus, JobTracker, PollConfig};
