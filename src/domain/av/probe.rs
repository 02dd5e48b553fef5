use crate::error::{RenderError, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;
use tokio::task;

/// Container-level facts about a staged audio file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioProbe {
    pub duration_seconds: f64,
    pub has_audio_stream: bool,
}

impl AudioProbe {
    /// Duration worth planning a timeline around: an audio stream with a
    /// positive length.
    pub fn usable_duration(&self) -> Option<f64> {
        (self.has_audio_stream && self.duration_seconds > 0.0).then_some(self.duration_seconds)
    }
}

/// Read the container duration of `path` through libav.
pub async fn probe_audio(path: &Path) -> Result<AudioProbe> {
    let path_clone = path.to_path_buf();

    task::spawn_blocking(move || -> Result<AudioProbe> {
        ffmpeg::init().map_err(|e| RenderError::asset(path_clone.display().to_string(), e))?;
        let context = ffmpeg::format::input(&path_clone)
            .map_err(|e| RenderError::asset(path_clone.display().to_string(), e))?;

        let has_audio_stream = context.streams().best(ffmpeg::media::Type::Audio).is_some();
        let raw = context.duration();
        let duration_seconds = if raw > 0 {
            raw as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            0.0
        };

        Ok(AudioProbe {
            duration_seconds,
            has_audio_stream,
        })
    })
    .await
    .map_err(|e| RenderError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
