//! Primary render path: bundle once, select the composition, render frames.

use super::progress::{JobProgress, COMPOSITION, FRAMES};
use crate::domain::composition::CompositionPlan;
use crate::error::{panic_message, RenderError, Result};
use crate::ports::renderer::{Bundle, PrimaryRenderer};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Where a single primary render currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStage {
    NotBundled,
    Bundled,
    CompositionSelected,
    Rendering,
    Done,
}

impl fmt::Display for EngineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineStage::NotBundled => "not-bundled",
            EngineStage::Bundled => "bundled",
            EngineStage::CompositionSelected => "composition-selected",
            EngineStage::Rendering => "rendering",
            EngineStage::Done => "done",
        };
        f.write_str(label)
    }
}

pub struct RenderEngine {
    renderer: Option<Arc<dyn PrimaryRenderer>>,
    bundle: OnceCell<Bundle>,
    composition_id: String,
}

impl RenderEngine {
    pub fn new(renderer: Arc<dyn PrimaryRenderer>, composition_id: impl Into<String>) -> Self {
        Self {
            renderer: Some(renderer),
            bundle: OnceCell::new(),
            composition_id: composition_id.into(),
        }
    }

    /// An engine that always defers to the fallback encoder.
    pub fn unavailable(composition_id: impl Into<String>) -> Self {
        Self {
            renderer: None,
            bundle: OnceCell::new(),
            composition_id: composition_id.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.renderer.is_some()
    }

    /// Compiled template, built by the first caller and shared afterwards.
    ///
    /// Concurrent callers wait on the same build. A failed build leaves the
    /// cell empty so the next job retries it.
    pub async fn bundle(&self) -> Result<&Bundle> {
        let renderer = self.renderer()?;
        self.bundle
            .get_or_try_init(|| async {
                info!(engine = renderer.name(), "bundling render template");
                renderer.bundle().await
            })
            .await
    }

    /// Render `plan` into `output`. Every failure is reported as an engine
    /// error so the caller can fall back.
    pub async fn render(
        &self,
        plan: &CompositionPlan,
        output: &Path,
        progress: &JobProgress,
    ) -> Result<()> {
        match AssertUnwindSafe(self.render_stages(plan, output, progress))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.falls_back() => Err(e),
            Ok(Err(e)) => Err(RenderError::EngineRender(e.to_string())),
            Err(payload) => Err(RenderError::EngineRender(format!(
                "engine panicked: {}",
                panic_message(payload)
            ))),
        }
    }

    async fn render_stages(
        &self,
        plan: &CompositionPlan,
        output: &Path,
        progress: &JobProgress,
    ) -> Result<()> {
        let renderer = self.renderer()?;
        let job_id = progress.job_id();
        let mut stage = EngineStage::NotBundled;
        debug!(job_id, %stage, "primary render starting");

        let bundle = self.bundle().await?;
        stage = EngineStage::Bundled;
        debug!(job_id, %stage, serve_url = %bundle.serve_url);

        let selection = progress.stage(COMPOSITION);
        selection.enter().await;
        let composition = renderer
            .select_composition(bundle, &self.composition_id, &plan.props)
            .await?;
        selection.finish().await;
        stage = EngineStage::CompositionSelected;
        debug!(
            job_id,
            %stage,
            composition = %composition.id,
            frames = composition.duration_in_frames
        );

        stage = EngineStage::Rendering;
        debug!(job_id, %stage);
        let frames = progress.stage(FRAMES);
        renderer
            .render(bundle, &composition, &plan.props, plan.encoder, output, &frames)
            .await?;
        frames.finish().await;

        stage = EngineStage::Done;
        info!(job_id, %stage, output = %output.display(), "primary render finished");
        Ok(())
    }

    fn renderer(&self) -> Result<&Arc<dyn PrimaryRenderer>> {
        self.renderer.as_ref().ok_or_else(|| {
            RenderError::EngineUnavailable("no compositing engine configured".to_string())
        })
    }
}
