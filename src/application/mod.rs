//! Application layer - services that drive the ports.

pub mod engine;
pub mod fallback;
pub mod materializer;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;

pub use orchestrator::{JobOrchestrator, Submission};
pub use pipeline::RenderPipeline;
