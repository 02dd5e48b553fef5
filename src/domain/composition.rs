//! Timeline computation for a render job.
//!
//! The timeline must fit the longest of the image, caption and narration
//! tracks; the margin is appended after the longest one.

use super::assets::{AudioAsset, ImageAsset};
use super::captions::CaptionSegment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

/// Encoder knobs for a quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncoderSettings {
    pub crf: u8,
    pub video_bitrate: &'static str,
}

impl Quality {
    pub fn encoder_settings(self) -> EncoderSettings {
        match self {
            Quality::Low => EncoderSettings {
                crf: 28,
                video_bitrate: "2M",
            },
            Quality::Medium => EncoderSettings {
                crf: 22,
                video_bitrate: "4M",
            },
            Quality::High => EncoderSettings {
                crf: 18,
                video_bitrate: "8M",
            },
        }
    }
}

/// Output frame geometry and timeline margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettings {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub margin_ms: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            width: 1080,
            height: 1920,
            margin_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionTiming {
    pub image_track_ms: u64,
    pub caption_track_ms: u64,
    pub audio_track_ms: u64,
    pub total_duration_ms: u64,
    pub total_duration_frames: u64,
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideProps {
    pub url: String,
    /// Display duration in milliseconds.
    pub duration: u64,
    pub start_frame: u64,
    pub duration_in_frames: u64,
}

/// Caption window in milliseconds, as the template consumes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionProps {
    pub text: String,
    pub start_time: u64,
    pub end_time: u64,
}

/// Input properties handed to the render template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputProps {
    pub images: Vec<SlideProps>,
    pub captions: Vec<CaptionProps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_audio: Option<String>,
    pub duration_in_frames: u64,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionPlan {
    pub timing: CompositionTiming,
    pub props: InputProps,
    pub encoder: EncoderSettings,
}

pub struct CompositionInput<'a> {
    pub images: &'a [ImageAsset],
    pub captions: &'a [CaptionSegment],
    pub music: Option<&'a AudioAsset>,
    pub narration: Option<&'a AudioAsset>,
    pub narration_seconds: Option<f64>,
    pub quality: Quality,
}

pub struct CompositionBuilder {
    settings: FrameSettings,
}

impl CompositionBuilder {
    pub fn new(settings: FrameSettings) -> Self {
        Self { settings }
    }

    /// Callers reject empty image lists and non-positive durations first.
    pub fn build(&self, input: &CompositionInput<'_>) -> CompositionPlan {
        let timing = self.timing(input.images, input.captions, input.narration_seconds);

        let mut cursor_ms = 0u64;
        let images = input
            .images
            .iter()
            .map(|image| {
                let slide = SlideProps {
                    url: image.render_url.clone(),
                    duration: image.display_duration_ms,
                    start_frame: self.ms_to_frames(cursor_ms),
                    duration_in_frames: self.ms_to_frames(image.display_duration_ms),
                };
                cursor_ms = cursor_ms.saturating_add(image.display_duration_ms);
                slide
            })
            .collect();

        let captions = input
            .captions
            .iter()
            .map(|caption| CaptionProps {
                text: caption.text.clone(),
                start_time: seconds_to_ms(caption.start_time_seconds),
                end_time: seconds_to_ms(caption.end_time_seconds()),
            })
            .collect();

        CompositionPlan {
            timing,
            props: InputProps {
                images,
                captions,
                music_url: input.music.map(|audio| audio.render_url.clone()),
                narration_audio: input.narration.map(|audio| audio.render_url.clone()),
                duration_in_frames: timing.total_duration_frames,
                fps: self.settings.fps,
                width: self.settings.width,
                height: self.settings.height,
            },
            encoder: input.quality.encoder_settings(),
        }
    }

    pub fn timing(
        &self,
        images: &[ImageAsset],
        captions: &[CaptionSegment],
        narration_seconds: Option<f64>,
    ) -> CompositionTiming {
        let image_track_ms = images
            .iter()
            .fold(0u64, |total, image| total.saturating_add(image.display_duration_ms));
        let caption_track_ms = captions
            .iter()
            .map(|caption| seconds_to_ms(caption.end_time_seconds()))
            .max()
            .unwrap_or(0);
        let audio_track_ms = narration_seconds.map(seconds_to_ms).unwrap_or(0);

        let total_duration_ms = image_track_ms
            .max(caption_track_ms)
            .max(audio_track_ms)
            .saturating_add(self.settings.margin_ms);

        CompositionTiming {
            image_track_ms,
            caption_track_ms,
            audio_track_ms,
            total_duration_ms,
            total_duration_frames: self.ms_to_frames(total_duration_ms),
            fps: self.settings.fps,
        }
    }

    /// `ceil(ms / 1000 * fps)` without going through floating point.
    /// Saturates instead of wrapping.
    fn ms_to_frames(&self, ms: u64) -> u64 {
        match ms.checked_mul(u64::from(self.settings.fps)) {
            Some(scaled) => scaled.div_ceil(1000),
            None => (ms / 1000).saturating_mul(u64::from(self.settings.fps)).saturating_add(1),
        }
    }
}

fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).ceil() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assets::AudioKind;
    use crate::domain::captions::caption_timeline;
    use std::path::PathBuf;

    fn images(durations: &[u64]) -> Vec<ImageAsset> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &duration)| ImageAsset {
                source_reference: format!("/uploads/{}.jpg", i),
                local_path: PathBuf::from(format!("/tmp/job_img_{}.jpg", i)),
                render_url: format!("http://localhost:3001/temp/job_img_{}.jpg", i),
                display_duration_ms: duration,
                sequence_index: i,
            })
            .collect()
    }

    fn input<'a>(
        images: &'a [ImageAsset],
        captions: &'a [CaptionSegment],
        narration_seconds: Option<f64>,
    ) -> CompositionInput<'a> {
        CompositionInput {
            images,
            captions,
            music: None,
            narration: None,
            narration_seconds,
            quality: Quality::Medium,
        }
    }

    #[test]
    fn three_images_without_audio() {
        let builder = CompositionBuilder::new(FrameSettings::default());
        let images = images(&[3000, 4000, 2000]);
        let plan = builder.build(&input(&images, &[], None));

        assert_eq!(plan.timing.image_track_ms, 9000);
        assert_eq!(plan.timing.total_duration_ms, 9000 + 500);
        assert_eq!(plan.timing.total_duration_frames, 285);
        assert_eq!(plan.props.duration_in_frames, 285);
    }

    #[test]
    fn slides_are_placed_back_to_back_in_order() {
        let builder = CompositionBuilder::new(FrameSettings::default());
        let images = images(&[3000, 4000, 2000]);
        let plan = builder.build(&input(&images, &[], None));

        let starts: Vec<u64> = plan.props.images.iter().map(|s| s.start_frame).collect();
        assert_eq!(starts, vec![0, 90, 210]);
        assert_eq!(plan.props.images[1].url, images[1].render_url);
    }

    #[test]
    fn long_captions_extend_the_timeline() {
        let builder = CompositionBuilder::new(FrameSettings::default());
        let images = images(&[1000]);
        let captions = caption_timeline(
            "Welcome home. This kitchen is stunning! The garden opens onto a quiet street.",
        );
        let plan = builder.build(&input(&images, &captions, None));

        let caption_end = captions.last().unwrap().end_time_seconds();
        assert!(plan.timing.total_duration_ms as f64 >= caption_end * 1000.0);
        assert!(plan.timing.total_duration_ms >= plan.timing.image_track_ms);
        assert_eq!(
            plan.props.captions[0],
            CaptionProps {
                text: "Welcome home.".into(),
                start_time: 500,
                end_time: 1500,
            }
        );
    }

    #[test]
    fn narration_longer_than_images_wins() {
        let builder = CompositionBuilder::new(FrameSettings {
            margin_ms: 0,
            ..FrameSettings::default()
        });
        let images = images(&[2000, 2000]);
        let timing = builder.timing(&images, &[], Some(12.25));
        assert_eq!(timing.audio_track_ms, 12250);
        assert_eq!(timing.total_duration_ms, 12250);
        assert_eq!(timing.total_duration_frames, 368);
    }

    #[test]
    fn frames_round_up() {
        let builder = CompositionBuilder::new(FrameSettings {
            fps: 30,
            margin_ms: 1,
            ..FrameSettings::default()
        });
        let images = images(&[1000]);
        assert_eq!(builder.timing(&images, &[], None).total_duration_frames, 31);
    }

    #[test]
    fn oversized_tracks_saturate_instead_of_wrapping() {
        let builder = CompositionBuilder::new(FrameSettings::default());
        let single = images(&[3000]);
        let timing = builder.timing(&single, &[], Some(1.0e17));
        assert_eq!(timing.total_duration_ms, u64::MAX);
        assert!(timing.total_duration_ms >= timing.image_track_ms);
        assert!(timing.total_duration_frames >= 90);

        let huge = images(&[u64::MAX, 3000]);
        let plan = builder.build(&input(&huge, &[], None));
        assert_eq!(plan.timing.image_track_ms, u64::MAX);
        assert_eq!(plan.props.images[1].start_frame, plan.timing.total_duration_frames);
    }

    #[test]
    fn building_twice_is_identical() {
        let builder = CompositionBuilder::new(FrameSettings::default());
        let images = images(&[3500, 3500]);
        let captions = caption_timeline("Sunny balcony. Two parking spaces!");
        let first = builder.build(&input(&images, &captions, Some(6.0)));
        let second = builder.build(&input(&images, &captions, Some(6.0)));
        assert_eq!(first, second);
    }

    #[test]
    fn quality_tiers_map_to_fixed_settings() {
        assert_eq!(Quality::Low.encoder_settings().crf, 28);
        assert_eq!(Quality::Medium.encoder_settings().crf, 22);
        assert_eq!(Quality::High.encoder_settings().crf, 18);
        assert_eq!(Quality::High.encoder_settings().video_bitrate, "8M");
    }

    #[test]
    fn audio_urls_flow_into_props() {
        let builder = CompositionBuilder::new(FrameSettings::default());
        let images = images(&[3000]);
        let music = AudioAsset {
            source_reference: "/musics/ambient-1.mp3".into(),
            local_path: PathBuf::from("/tmp/job_music.mp3"),
            render_url: "http://localhost:3001/temp/job_music.mp3".into(),
            kind: AudioKind::Music,
        };
        let plan = builder.build(&CompositionInput {
            music: Some(&music),
            ..input(&images, &[], None)
        });
        assert_eq!(plan.props.music_url.as_deref(), Some(music.render_url.as_str()));
        assert!(plan.props.narration_audio.is_none());

        let json = serde_json::to_value(&plan.props).unwrap();
        assert_eq!(json["durationInFrames"], 105);
        assert!(json.get("narrationAudio").is_none());
    }
}
