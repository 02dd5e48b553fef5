//! The per-job render pipeline: stage assets, plan the composition, render
//! through the primary engine or the fallback encoder, then publish.

use super::engine::RenderEngine;
use super::fallback::{FallbackEncoder, Soundtrack};
use super::materializer::AssetMaterializer;
use super::progress::{JobProgress, FINALIZING, STAGING};
use crate::config::RenderConfig;
use crate::domain::assets::{AudioKind, StagedAssets};
use crate::domain::av::probe_audio;
use crate::domain::captions::{caption_timeline, CaptionSegment};
use crate::domain::composition::{CompositionBuilder, CompositionInput, FrameSettings};
use crate::domain::jobs::{JobUpdate, RenderJob, RenderPath, RenderRequest};
use crate::domain::music::resolve_music;
use crate::error::{RenderError, Result};
use crate::ports::job_store::JobStore;
use crate::ports::storage::StoragePort;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RenderPipeline {
    store: Arc<dyn JobStore>,
    materializer: AssetMaterializer,
    engine: Arc<RenderEngine>,
    fallback: FallbackEncoder,
    builder: CompositionBuilder,
    outputs: Arc<dyn StoragePort>,
    config: RenderConfig,
}

impl RenderPipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        materializer: AssetMaterializer,
        engine: Arc<RenderEngine>,
        fallback: FallbackEncoder,
        outputs: Arc<dyn StoragePort>,
        config: RenderConfig,
    ) -> Self {
        let builder = CompositionBuilder::new(FrameSettings {
            fps: config.fps,
            width: config.width,
            height: config.height,
            margin_ms: config.timeline_margin_ms,
        });
        Self {
            store,
            materializer,
            engine,
            fallback,
            builder,
            outputs,
            config,
        }
    }

    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    /// Run one job from `pending` to `completed`.
    ///
    /// Errors are returned to the caller, which records the failure.
    pub async fn run(&self, job_id: &str, request: &RenderRequest) -> Result<RenderJob> {
        // 1. Claim the job
        self.store.update(job_id, JobUpdate::Started).await?;
        info!(job_id, images = request.images.len(), "render started");

        // 2. Render inside the scratch area
        let scratch_output = self
            .materializer
            .scratch_dir()
            .join(format!("job_{}_output.mp4", job_id));
        let mut staged = StagedAssets::default();
        let result = self
            .render(job_id, request, &scratch_output, &mut staged)
            .await;

        // 3. Scratch is removed whatever happened
        let mut scratch = staged.scratch_files();
        scratch.push(scratch_output);
        self.materializer.cleanup(job_id, &scratch).await;

        result
    }

    async fn render(
        &self,
        job_id: &str,
        request: &RenderRequest,
        scratch_output: &Path,
        staged: &mut StagedAssets,
    ) -> Result<RenderJob> {
        let progress = JobProgress::new(self.store.clone(), job_id, STAGING);
        progress.enter().await;

        let captions = captions_for(request);

        staged.images = self
            .materializer
            .stage_images(job_id, &request.images, &progress)
            .await?;

        let mut music_missing = false;
        if let Some(reference) =
            resolve_music(request.music_url.as_deref(), request.music_id.as_deref())
        {
            match self
                .materializer
                .stage_audio(job_id, &reference, AudioKind::Music)
                .await
            {
                Ok(music) => staged.music = Some(music),
                Err(e) => {
                    warn!(job_id, error = %e, "background music dropped");
                    music_missing = true;
                }
            }
        }

        if let Some(reference) = request.narration_audio_url.as_deref() {
            staged.narration = Some(
                self.materializer
                    .stage_audio(job_id, reference, AudioKind::Narration)
                    .await?,
            );
        }
        let narration_seconds = self.narration_seconds(job_id, request, staged).await;
        progress.finish().await;

        let plan = self.builder.build(&CompositionInput {
            images: &staged.images,
            captions: &captions,
            music: staged.music.as_ref(),
            narration: staged.narration.as_ref(),
            narration_seconds,
            quality: request.quality,
        });
        info!(
            job_id,
            duration_ms = plan.timing.total_duration_ms,
            frames = plan.timing.total_duration_frames,
            captions = captions.len(),
            "composition planned"
        );

        let primary = match self.engine.render(&plan, scratch_output, &progress).await {
            Ok(()) => output_size(scratch_output)
                .await
                .map_err(RenderError::EngineRender),
            Err(e) => Err(e),
        };

        let render_path = match primary {
            Ok(_) => RenderPath::Primary,
            Err(e) if e.falls_back() => {
                warn!(job_id, error = %e, "primary render unavailable, using fallback encoder");
                let soundtrack = match (&staged.music, music_missing) {
                    (Some(music), _) => Soundtrack::Music(music),
                    (None, true) => Soundtrack::Silence,
                    (None, false) => Soundtrack::None,
                };
                self.fallback
                    .encode(
                        &staged.images,
                        soundtrack,
                        plan.encoder,
                        scratch_output,
                        &progress,
                    )
                    .await?;
                output_size(scratch_output)
                    .await
                    .map_err(RenderError::Encoding)?;
                RenderPath::Fallback
            }
            Err(e) => return Err(e),
        };

        // Publish
        let finalizing = progress.stage(FINALIZING);
        finalizing.enter().await;
        let file_name = format!("{}.mp4", job_id);
        self.outputs.upload(scratch_output, &file_name).await?;
        let output_location = self.config.output_location(&file_name);

        let job = self
            .store
            .update(
                job_id,
                JobUpdate::Completed {
                    output_location: output_location.clone(),
                    render_path,
                },
            )
            .await?;
        info!(job_id, %output_location, ?render_path, "render completed");
        Ok(job)
    }

    async fn narration_seconds(
        &self,
        job_id: &str,
        request: &RenderRequest,
        staged: &StagedAssets,
    ) -> Option<f64> {
        if let Some(hint) = request.narration_duration_seconds {
            return Some(hint);
        }
        let narration = staged.narration.as_ref()?;
        match probe_audio(&narration.local_path).await {
            Ok(probe) if probe.usable_duration().is_some() => probe.usable_duration(),
            Ok(probe) => {
                warn!(
                    job_id,
                    reference = %narration.source_reference,
                    has_audio_stream = probe.has_audio_stream,
                    "narration reports no usable duration"
                );
                None
            }
            Err(e) => {
                warn!(job_id, error = %e, "narration probe failed");
                None
            }
        }
    }
}

/// Supplied captions win over captions derived from the narration script.
pub fn captions_for(request: &RenderRequest) -> Vec<CaptionSegment> {
    match (&request.captions, &request.narration_text) {
        (Some(captions), _) => captions.clone(),
        (None, Some(text)) => caption_timeline(text),
        (None, None) => Vec::new(),
    }
}

async fn output_size(path: &Path) -> std::result::Result<u64, String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(format!("{} is empty", path.display())),
        Err(e) => Err(format!("{} missing: {}", path.display(), e)),
    }
}
