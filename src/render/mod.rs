pub mod enumerate;
pub mod gate;
pub mod orchestrator;
pub mod partition;
pub mod renderer;
pub mod resume;
pub mod sampler;

pub use enumerate::Asset;
pub use orchestrator::{AssetOutcome, ChunkReport, NamingStyle, Orchestrator, RenderSettings};
pub use partition::{Chunk, partition};
pub use renderer::{HttpRenderer, Renderer};
pub use resume::StdFileSystem;
