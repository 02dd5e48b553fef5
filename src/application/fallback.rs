//! Slideshow encoding used when the primary engine cannot render a job.
//!
//! Each image is looped for its display duration, scaled and padded to the
//! output frame, and concatenated. Captions are not drawn on this path.

use super::progress::{JobProgress, FRAMES};
use crate::config::RenderConfig;
use crate::domain::assets::{AudioAsset, ImageAsset};
use crate::domain::composition::{EncoderSettings, FrameSettings};
use crate::error::{RenderError, Result};
use crate::ports::encoder::{EncoderCommand, EncoderExecutor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Audio bed of the fallback render.
#[derive(Debug, Clone, Copy)]
pub enum Soundtrack<'a> {
    Music(&'a AudioAsset),
    /// Music was requested but could not be staged
    Silence,
    None,
}

pub struct FallbackEncoder {
    executor: Arc<dyn EncoderExecutor>,
    program: String,
    timeout: Duration,
    output_cap: usize,
    frame: FrameSettings,
}

impl FallbackEncoder {
    pub fn new(executor: Arc<dyn EncoderExecutor>, config: &RenderConfig) -> Self {
        Self {
            executor,
            program: config.encoder_bin.clone(),
            timeout: config.encoder_timeout,
            output_cap: config.encoder_output_cap,
            frame: FrameSettings {
                fps: config.fps,
                width: config.width,
                height: config.height,
                margin_ms: config.timeline_margin_ms,
            },
        }
    }

    pub fn build_command(
        &self,
        images: &[ImageAsset],
        soundtrack: Soundtrack<'_>,
        encoder: EncoderSettings,
        output: &Path,
    ) -> EncoderCommand {
        let slideshow_ms = images
            .iter()
            .fold(0u64, |total, image| total.saturating_add(image.display_duration_ms));
        let mut args: Vec<String> = Vec::new();

        for image in images {
            args.extend([
                "-loop".to_string(),
                "1".to_string(),
                "-t".to_string(),
                seconds(image.display_duration_ms),
                "-i".to_string(),
                image.local_path.to_string_lossy().into_owned(),
            ]);
        }

        let audio_input = images.len();
        match soundtrack {
            Soundtrack::Music(music) => {
                args.extend([
                    "-stream_loop".to_string(),
                    "-1".to_string(),
                    "-i".to_string(),
                    music.local_path.to_string_lossy().into_owned(),
                ]);
            }
            Soundtrack::Silence => {
                args.extend([
                    "-f".to_string(),
                    "lavfi".to_string(),
                    "-t".to_string(),
                    seconds(slideshow_ms),
                    "-i".to_string(),
                    "anullsrc=r=44100:cl=stereo".to_string(),
                ]);
            }
            Soundtrack::None => {}
        }

        let (width, height) = (self.frame.width, self.frame.height);
        let mut filter = String::new();
        for index in 0..images.len() {
            filter.push_str(&format!(
                "[{index}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
                 pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}[v{index}];",
                fps = self.frame.fps,
            ));
        }
        for index in 0..images.len() {
            filter.push_str(&format!("[v{index}]"));
        }
        filter.push_str(&format!("concat=n={}:v=1:a=0[outv]", images.len()));

        args.extend(["-filter_complex".to_string(), filter]);
        args.extend(["-map".to_string(), "[outv]".to_string()]);
        if !matches!(soundtrack, Soundtrack::None) {
            args.extend(["-map".to_string(), format!("{}:a", audio_input)]);
        }

        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-crf".to_string(),
            encoder.crf.to_string(),
            "-maxrate".to_string(),
            encoder.video_bitrate.to_string(),
            "-bufsize".to_string(),
            encoder.video_bitrate.to_string(),
        ]);
        if !matches!(soundtrack, Soundtrack::None) {
            // The slideshow sets the length; looped music is cut to it.
            args.extend([
                "-c:a".to_string(),
                "aac".to_string(),
                "-t".to_string(),
                seconds(slideshow_ms),
            ]);
        }
        args.extend([
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-preset".to_string(),
            "ultrafast".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-nostats".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ]);

        EncoderCommand {
            program: self.program.clone(),
            args,
            timeout: self.timeout,
            output_cap: self.output_cap,
            expected_duration_ms: slideshow_ms,
        }
    }

    pub async fn encode(
        &self,
        images: &[ImageAsset],
        soundtrack: Soundtrack<'_>,
        encoder: EncoderSettings,
        output: &Path,
        progress: &JobProgress,
    ) -> Result<()> {
        if images.is_empty() {
            return Err(RenderError::Encoding("no images to encode".to_string()));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let command = self.build_command(images, soundtrack, encoder, output);
        debug!(job_id = progress.job_id(), args = ?command.args, "fallback encoder command");

        let frames = progress.stage(FRAMES);
        frames.enter().await;
        let result = self.executor.run(&command, &frames).await?;
        frames.finish().await;

        info!(
            job_id = progress.job_id(),
            images = images.len(),
            diagnostics_bytes = result.diagnostics.len(),
            "fallback encode finished"
        );
        Ok(())
    }
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::memory::InMemoryJobStore;
    use crate::application::progress::STAGING;
    use crate::domain::assets::AudioKind;
    use crate::domain::composition::Quality;
    use crate::domain::jobs::{JobUpdate, RenderJob};
    use crate::ports::encoder::EncoderOutput;
    use crate::ports::job_store::JobStore;
    use crate::ports::progress::ProgressSink;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn images() -> Vec<ImageAsset> {
        [3000u64, 4500]
            .iter()
            .enumerate()
            .map(|(i, &duration)| ImageAsset {
                source_reference: format!("/uploads/{}.jpg", i),
                local_path: PathBuf::from(format!("/scratch/job_x_img_{}.jpg", i)),
                render_url: String::new(),
                display_duration_ms: duration,
                sequence_index: i,
            })
            .collect()
    }

    fn encoder(executor: Arc<dyn EncoderExecutor>) -> FallbackEncoder {
        FallbackEncoder::new(executor, &RenderConfig::default())
    }

    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<EncoderCommand>>,
    }

    #[async_trait]
    impl EncoderExecutor for RecordingExecutor {
        async fn run(
            &self,
            command: &EncoderCommand,
            progress: &dyn ProgressSink,
        ) -> Result<EncoderOutput> {
            self.commands.lock().unwrap().push(command.clone());
            progress.report(0.5).await;
            Ok(EncoderOutput::default())
        }
    }

    fn position(args: &[String], value: &str) -> usize {
        args.iter().position(|arg| arg == value).unwrap()
    }

    #[test]
    fn images_loop_for_their_durations() {
        let command = encoder(Arc::new(RecordingExecutor::default())).build_command(
            &images(),
            Soundtrack::None,
            Quality::Medium.encoder_settings(),
            Path::new("/scratch/out.mp4"),
        );

        assert_eq!(command.program, "ffmpeg");
        assert_eq!(command.expected_duration_ms, 7500);
        assert_eq!(
            &command.args[..12],
            &[
                "-loop", "1", "-t", "3.000", "-i", "/scratch/job_x_img_0.jpg", "-loop", "1",
                "-t", "4.500", "-i", "/scratch/job_x_img_1.jpg",
            ]
        );
        assert_eq!(command.args[position(&command.args, "-crf") + 1], "22");
        assert!(!command.args.contains(&"-shortest".to_string()));
        assert_eq!(command.args.last().unwrap(), "/scratch/out.mp4");
    }

    #[test]
    fn filter_scales_pads_and_concatenates() {
        let command = encoder(Arc::new(RecordingExecutor::default())).build_command(
            &images(),
            Soundtrack::None,
            Quality::Low.encoder_settings(),
            Path::new("/scratch/out.mp4"),
        );
        let filter = &command.args[position(&command.args, "-filter_complex") + 1];
        assert!(filter.starts_with(
            "[0:v]scale=1080:1920:force_original_aspect_ratio=decrease,pad=1080:1920:(ow-iw)/2:(oh-ih)/2,setsar=1"
        ));
        assert!(filter.ends_with("[v0][v1]concat=n=2:v=1:a=0[outv]"));
    }

    #[test]
    fn music_is_mapped_after_the_images() {
        let music = AudioAsset {
            source_reference: "/musics/ambient-1.mp3".into(),
            local_path: PathBuf::from("/scratch/job_x_music.mp3"),
            render_url: String::new(),
            kind: AudioKind::Music,
        };
        let command = encoder(Arc::new(RecordingExecutor::default())).build_command(
            &images(),
            Soundtrack::Music(&music),
            Quality::High.encoder_settings(),
            Path::new("/scratch/out.mp4"),
        );
        let input = position(&command.args, "/scratch/job_x_music.mp3");
        assert_eq!(&command.args[input - 3..input], &["-stream_loop", "-1", "-i"]);
        assert!(command.args.contains(&"2:a".to_string()));
        assert!(!command.args.contains(&"-shortest".to_string()));

        let audio_codec = position(&command.args, "aac");
        assert_eq!(&command.args[audio_codec + 1..audio_codec + 3], &["-t", "7.500"]);
        assert_eq!(command.args[position(&command.args, "-crf") + 1], "18");
    }

    #[test]
    fn missing_music_becomes_silence_for_the_whole_slideshow() {
        let command = encoder(Arc::new(RecordingExecutor::default())).build_command(
            &images(),
            Soundtrack::Silence,
            Quality::Medium.encoder_settings(),
            Path::new("/scratch/out.mp4"),
        );
        let source = position(&command.args, "anullsrc=r=44100:cl=stereo");
        assert_eq!(command.args[source - 2], "7.500");
        assert_eq!(command.args[source - 4], "lavfi");
        assert!(command.args.contains(&"2:a".to_string()));
    }

    #[tokio::test]
    async fn encode_reports_into_the_frames_window() {
        let store = Arc::new(InMemoryJobStore::new());
        store.create(RenderJob::with_id("job")).await.unwrap();
        store.update("job", JobUpdate::Started).await.unwrap();
        let progress = JobProgress::new(store.clone(), "job", STAGING);

        let executor = Arc::new(RecordingExecutor::default());
        let dir = tempfile::tempdir().unwrap();
        encoder(executor.clone())
            .encode(
                &images(),
                Soundtrack::None,
                Quality::Medium.encoder_settings(),
                &dir.path().join("out.mp4"),
                &progress,
            )
            .await
            .unwrap();

        assert_eq!(executor.commands.lock().unwrap().len(), 1);
        assert_eq!(store.get("job").await.unwrap().unwrap().progress_percent, 95);
    }

    #[tokio::test]
    async fn nothing_to_encode_is_an_error() {
        let store = Arc::new(InMemoryJobStore::new());
        let progress = JobProgress::new(store, "job", STAGING);
        let err = encoder(Arc::new(RecordingExecutor::default()))
            .encode(
                &[],
                Soundtrack::None,
                Quality::Medium.encoder_settings(),
                Path::new("/tmp/out.mp4"),
                &progress,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Encoding(_)));
    }
}
