pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod render;
pub mod utils;

pub use config::Opts;
