use crate::domain::captions::CaptionSegment;
use crate::domain::composition::Quality;
use crate::error::{RenderError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display duration applied to images submitted without one.
pub const DEFAULT_IMAGE_DURATION_MS: u64 = 3000;

/// Longest timeline a request may ask for, one hour.
pub const MAX_TIMELINE_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Rendering,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Rendering)
    }
}

/// Which execution path produced a job's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPath {
    /// Compositing engine, captions burnt in.
    Primary,
    /// Command-line encoder, no caption overlays.
    Fallback,
}

/// Path announced at submission time, before the pipeline has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionMode {
    Primary,
    FallbackUnknownYet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    pub id: String,
    pub status: JobStatus,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_path: Option<RenderPath>,
}

/// A state change requested by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Started,
    Progress(u8),
    Completed {
        output_location: String,
        render_path: RenderPath,
    },
    Failed {
        detail: String,
    },
}

impl RenderJob {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress_percent: 0,
            output_location: None,
            error_detail: None,
            render_path: None,
        }
    }

    /// Apply an update, enforcing forward-only status transitions and
    /// non-decreasing progress.
    pub fn apply(&mut self, update: JobUpdate) -> Result<()> {
        match (self.status, update) {
            (JobStatus::Pending, JobUpdate::Started) => {
                self.status = JobStatus::Rendering;
            }
            (JobStatus::Rendering, JobUpdate::Progress(percent)) => {
                self.progress_percent = self.progress_percent.max(percent.min(100));
            }
            (
                JobStatus::Rendering,
                JobUpdate::Completed {
                    output_location,
                    render_path,
                },
            ) => {
                self.status = JobStatus::Completed;
                self.progress_percent = 100;
                self.output_location = Some(output_location);
                self.render_path = Some(render_path);
            }
            (JobStatus::Pending | JobStatus::Rendering, JobUpdate::Failed { detail }) => {
                self.status = JobStatus::Failed;
                self.error_detail = Some(detail);
            }
            (status, update) => {
                return Err(RenderError::InvalidTransition(format!(
                    "job {} cannot apply {:?} while {:?}",
                    self.id, update, status
                )));
            }
        }
        Ok(())
    }
}

impl Default for RenderJob {
    fn default() -> Self {
        Self::new()
    }
}

/// One image of the slideshow, in caller order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    pub url: String,
    /// Display duration in milliseconds.
    #[serde(default = "default_image_duration")]
    pub duration: u64,
}

fn default_image_duration() -> u64 {
    DEFAULT_IMAGE_DURATION_MS
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub images: Vec<ImageInput>,
    /// Precomputed captions; take precedence over `narration_text`.
    #[serde(default)]
    pub captions: Option<Vec<CaptionSegment>>,
    /// Raw narration script captions are derived from.
    #[serde(default, alias = "text")]
    pub narration_text: Option<String>,
    #[serde(default)]
    pub narration_audio_url: Option<String>,
    /// Duration hint supplied by the narration synthesizer.
    #[serde(default)]
    pub narration_duration_seconds: Option<f64>,
    #[serde(default)]
    pub music_url: Option<String>,
    /// Catalog id, used when no `music_url` is given.
    #[serde(default)]
    pub music_id: Option<String>,
    #[serde(default)]
    pub quality: Quality,
}

impl RenderRequest {
    /// Shape checks performed by the transport before a job is submitted.
    pub fn validate(&self) -> Result<()> {
        if self.images.is_empty() {
            return Err(RenderError::Validation("no images provided".into()));
        }
        for (index, image) in self.images.iter().enumerate() {
            if image.url.trim().is_empty() {
                return Err(RenderError::Validation(format!(
                    "image {} has an empty url",
                    index
                )));
            }
            if image.duration == 0 || image.duration > MAX_TIMELINE_MS {
                return Err(RenderError::Validation(format!(
                    "image {} duration must be between 1 and {} ms",
                    index, MAX_TIMELINE_MS
                )));
            }
        }
        if let Some(captions) = &self.captions {
            for caption in captions {
                if caption.text.trim().is_empty()
                    || caption.start_time_seconds < 0.0
                    || caption.duration_seconds <= 0.0
                    || !caption.start_time_seconds.is_finite()
                    || !caption.duration_seconds.is_finite()
                    || caption.end_time_seconds() * 1000.0 > MAX_TIMELINE_MS as f64
                {
                    return Err(RenderError::Validation(format!(
                        "malformed caption {:?}",
                        caption.text
                    )));
                }
            }
        }
        if let Some(hint) = self.narration_duration_seconds {
            if !hint.is_finite() || hint < 0.0 || hint * 1000.0 > MAX_TIMELINE_MS as f64 {
                return Err(RenderError::Validation(format!(
                    "narration duration must be between 0 and {} s",
                    MAX_TIMELINE_MS / 1000
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendering_job() -> RenderJob {
        let mut job = RenderJob::with_id("job-1");
        job.apply(JobUpdate::Started).unwrap();
        job
    }

    #[test]
    fn new_jobs_are_pending_with_unique_ids() {
        let a = RenderJob::new();
        let b = RenderJob::new();
        assert_eq!(a.status, JobStatus::Pending);
        assert_eq!(a.progress_percent, 0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = rendering_job();
        job.apply(JobUpdate::Progress(40)).unwrap();
        job.apply(JobUpdate::Progress(25)).unwrap();
        assert_eq!(job.progress_percent, 40);
        job.apply(JobUpdate::Progress(250)).unwrap();
        assert_eq!(job.progress_percent, 100);
    }

    #[test]
    fn completion_sets_output_and_full_progress() {
        let mut job = rendering_job();
        job.apply(JobUpdate::Completed {
            output_location: "/generated/job-1.mp4".into(),
            render_path: RenderPath::Fallback,
        })
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100);
        assert_eq!(job.output_location.as_deref(), Some("/generated/job-1.mp4"));
        assert!(job.error_detail.is_none());
    }

    #[test]
    fn terminal_jobs_cannot_be_resurrected() {
        let mut job = rendering_job();
        job.apply(JobUpdate::Failed {
            detail: "encoder timed out".into(),
        })
        .unwrap();

        assert!(job.apply(JobUpdate::Started).is_err());
        assert!(job.apply(JobUpdate::Progress(50)).is_err());
        assert!(job
            .apply(JobUpdate::Completed {
                output_location: "/generated/x.mp4".into(),
                render_path: RenderPath::Primary,
            })
            .is_err());
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.output_location.is_none());
    }

    #[test]
    fn pending_jobs_can_fail_but_not_complete() {
        let mut job = RenderJob::with_id("job-2");
        assert!(job
            .apply(JobUpdate::Completed {
                output_location: "/generated/job-2.mp4".into(),
                render_path: RenderPath::Primary,
            })
            .is_err());
        job.apply(JobUpdate::Failed {
            detail: "pipeline panicked".into(),
        })
        .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn status_json_omits_unset_fields() {
        let job = rendering_job();
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "rendering");
        assert_eq!(json["progressPercent"], 0);
        assert!(json.get("outputLocation").is_none());
        assert!(json.get("errorDetail").is_none());
    }

    #[test]
    fn request_accepts_original_field_names() {
        let request: RenderRequest = serde_json::from_str(
            r#"{
                "images": [{"url": "/uploads/a.jpg", "duration": 4000}, {"url": "/uploads/b.jpg"}],
                "text": "Welcome home.",
                "musicId": "fun-upbeat",
                "quality": "high"
            }"#,
        )
        .unwrap();
        assert_eq!(request.images[1].duration, DEFAULT_IMAGE_DURATION_MS);
        assert_eq!(request.narration_text.as_deref(), Some("Welcome home."));
        assert_eq!(request.quality, Quality::High);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn validation_rejects_empty_and_zero_duration_images() {
        let empty = RenderRequest::default();
        assert!(matches!(empty.validate(), Err(RenderError::Validation(_))));

        let zero = RenderRequest {
            images: vec![ImageInput {
                url: "/uploads/a.jpg".into(),
                duration: 0,
            }],
            ..RenderRequest::default()
        };
        assert!(matches!(zero.validate(), Err(RenderError::Validation(_))));
    }

    #[test]
    fn validation_rejects_negative_captions() {
        let request = RenderRequest {
            images: vec![ImageInput {
                url: "/uploads/a.jpg".into(),
                duration: 3000,
            }],
            captions: Some(vec![CaptionSegment {
                text: "Hello.".into(),
                start_time_seconds: -1.0,
                duration_seconds: 1.0,
            }]),
            ..RenderRequest::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn validation_bounds_timeline_lengths() {
        let image = |duration| ImageInput {
            url: "/uploads/a.jpg".into(),
            duration,
        };
        let longest = RenderRequest {
            images: vec![image(MAX_TIMELINE_MS)],
            narration_duration_seconds: Some(3600.0),
            ..RenderRequest::default()
        };
        assert!(longest.validate().is_ok());

        let long_image = RenderRequest {
            images: vec![image(MAX_TIMELINE_MS + 1)],
            ..RenderRequest::default()
        };
        assert!(matches!(long_image.validate(), Err(RenderError::Validation(_))));

        let long_narration = RenderRequest {
            narration_duration_seconds: Some(1.0e17),
            ..longest.clone()
        };
        assert!(matches!(long_narration.validate(), Err(RenderError::Validation(_))));

        let late_caption = RenderRequest {
            captions: Some(vec![CaptionSegment {
                text: "Hello.".into(),
                start_time_seconds: 3599.5,
                duration_seconds: 1.0,
            }]),
            ..longest
        };
        assert!(late_caption.validate().is_err());
    }
}
