use super::progress::ProgressSink;
use crate::domain::composition::{EncoderSettings, InputProps};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Compiled form of the render template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Location the engine serves the compiled template from.
    pub serve_url: String,
}

/// A named composition resolved against concrete input properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub id: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub duration_in_frames: u64,
}

/// The compositing engine behind the primary render path.
#[async_trait]
pub trait PrimaryRenderer: Send + Sync {
    fn name(&self) -> &str;

    /// Capability check, `EngineUnavailable` when the engine cannot run here
    async fn probe(&self) -> Result<()>;

    /// Compile the render template
    async fn bundle(&self) -> Result<Bundle>;

    async fn select_composition(
        &self,
        bundle: &Bundle,
        composition_id: &str,
        props: &InputProps,
    ) -> Result<Composition>;

    /// Render every frame of `composition` into `output`, reporting progress
    async fn render(
        &self,
        bundle: &Bundle,
        composition: &Composition,
        props: &InputProps,
        encoder: EncoderSettings,
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<()>;
}
