//! Primary engine driven through its command-line interface.
//!
//! The template is bundled with `remotion bundle`, compositions are listed
//! with `remotion compositions` and frames are rendered with
//! `remotion render`. Input properties travel as a JSON file.

use super::process::{run_bounded, ProcessFailure, ProcessLimits};
use crate::config::RenderConfig;
use crate::domain::composition::{EncoderSettings, InputProps};
use crate::error::{RenderError, Result};
use crate::ports::progress::{NoProgress, ProgressSink};
use crate::ports::renderer::{Bundle, Composition, PrimaryRenderer};
use async_trait::async_trait;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::task;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct CompositorCli {
    bin: String,
    entry: PathBuf,
    bundle_dir: PathBuf,
    scratch_dir: PathBuf,
    concurrency: usize,
    timeout: Duration,
    output_cap: usize,
}

impl CompositorCli {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            bin: config.engine_bin.clone(),
            entry: config.engine_entry.clone(),
            bundle_dir: config.scratch_dir.join("bundle"),
            scratch_dir: config.scratch_dir.clone(),
            concurrency: config.engine_concurrency.max(1),
            timeout: config.engine_timeout,
            output_cap: config.encoder_output_cap,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.bin);
        let launcher = Path::new(&self.bin)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        if launcher == "npx" {
            command.arg("remotion");
        }
        command
    }

    fn limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: self.timeout,
            output_cap: self.output_cap,
        }
    }

    /// Write `props` to a scratch file removed when the handle drops.
    async fn props_file(&self, props: &InputProps) -> Result<NamedTempFile> {
        let json = serde_json::to_vec(props)?;
        let scratch_dir = self.scratch_dir.clone();

        task::spawn_blocking(move || -> Result<NamedTempFile> {
            std::fs::create_dir_all(&scratch_dir)?;
            let mut file = tempfile::Builder::new()
                .prefix("props_")
                .suffix(".json")
                .tempfile_in(&scratch_dir)?;
            file.write_all(&json)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(|e| RenderError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

fn engine_failure(failure: ProcessFailure) -> RenderError {
    match failure {
        ProcessFailure::Spawn { .. } => RenderError::EngineUnavailable(failure.to_string()),
        other => RenderError::EngineRender(other.to_string()),
    }
}

fn composition_row() -> &'static Regex {
    static ROW: OnceLock<Regex> = OnceLock::new();
    ROW.get_or_init(|| {
        Regex::new(r"^\s*(\S+)\s+(\d+)\s+(\d+)x(\d+)\s+(\d+)").expect("valid composition regex")
    })
}

fn frame_counter() -> &'static Regex {
    static COUNTER: OnceLock<Regex> = OnceLock::new();
    COUNTER.get_or_init(|| Regex::new(r"(\d+)\s*/\s*(\d+)").expect("valid progress regex"))
}

/// Find `composition_id` in the engine's composition listing.
pub fn parse_composition(listing: &str, composition_id: &str) -> Option<Composition> {
    listing.lines().find_map(|line| {
        let caps = composition_row().captures(line)?;
        if &caps[1] != composition_id {
            return None;
        }
        Some(Composition {
            id: composition_id.to_string(),
            fps: caps[2].parse().ok()?,
            width: caps[3].parse().ok()?,
            height: caps[4].parse().ok()?,
            duration_in_frames: caps[5].parse().ok()?,
        })
    })
}

/// Fraction of frames done from a `rendered/total` progress line.
pub fn parse_frame_progress(line: &str) -> Option<f64> {
    let caps = frame_counter().captures(line)?;
    let done: f64 = caps[1].parse().ok()?;
    let total: f64 = caps[2].parse().ok()?;
    if total <= 0.0 {
        return None;
    }
    Some((done / total).min(1.0))
}

fn no_progress(_: &str) -> Option<f64> {
    None
}

#[async_trait]
impl PrimaryRenderer for CompositorCli {
    fn name(&self) -> &str {
        "remotion"
    }

    async fn probe(&self) -> Result<()> {
        which::which(&self.bin).map_err(|e| {
            RenderError::EngineUnavailable(format!("{} not found: {}", self.bin, e))
        })?;
        if !tokio::fs::try_exists(&self.entry).await.unwrap_or(false) {
            return Err(RenderError::EngineUnavailable(format!(
                "entry point {} not found",
                self.entry.display()
            )));
        }
        Ok(())
    }

    async fn bundle(&self) -> Result<Bundle> {
        tokio::fs::create_dir_all(&self.bundle_dir).await?;

        let mut command = self.command();
        command
            .arg("bundle")
            .arg(&self.entry)
            .arg("--out-dir")
            .arg(&self.bundle_dir);
        run_bounded(command, self.limits(), &no_progress, &NoProgress)
            .await
            .map_err(engine_failure)?;

        Ok(Bundle {
            serve_url: self.bundle_dir.to_string_lossy().into_owned(),
        })
    }

    async fn select_composition(
        &self,
        bundle: &Bundle,
        composition_id: &str,
        props: &InputProps,
    ) -> Result<Composition> {
        let props_file = self.props_file(props).await?;

        let mut command = self.command();
        command
            .arg("compositions")
            .arg(&bundle.serve_url)
            .arg(format!("--props={}", props_file.path().display()));
        let outcome = run_bounded(command, self.limits(), &no_progress, &NoProgress)
            .await
            .map_err(engine_failure)?;

        let listed = parse_composition(&outcome.stdout_tail, composition_id).ok_or_else(|| {
            RenderError::EngineRender(format!("composition {} not found", composition_id))
        })?;
        debug!(
            composition = composition_id,
            listed_frames = listed.duration_in_frames,
            "composition resolved"
        );

        // computed props own the timeline length
        Ok(Composition {
            duration_in_frames: props.duration_in_frames,
            ..listed
        })
    }

    async fn render(
        &self,
        bundle: &Bundle,
        composition: &Composition,
        props: &InputProps,
        encoder: EncoderSettings,
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let props_file = self.props_file(props).await?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let last_frame = composition.duration_in_frames.saturating_sub(1);
        let mut command = self.command();
        command
            .arg("render")
            .arg(&bundle.serve_url)
            .arg(&composition.id)
            .arg(output)
            .arg(format!("--props={}", props_file.path().display()))
            .arg("--codec=h264")
            .arg(format!("--crf={}", encoder.crf))
            .arg(format!("--concurrency={}", self.concurrency))
            .arg(format!("--frames=0-{}", last_frame))
            .arg(format!("--timeout={}", self.timeout.as_millis()));

        run_bounded(command, self.limits(), &parse_frame_progress, progress)
            .await
            .map_err(engine_failure)?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(RenderError::EngineRender(format!(
                "engine finished without writing {}",
                output.display()
            )));
        }
        Ok(())
    }
}
