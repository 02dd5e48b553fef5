//! Caption timing derived from narration text.
//!
//! Durations are estimated from word counts, not aligned against the
//! synthesized narration. Captions drift from the audio when the speaker's
//! pace differs from the assumed rate.

use serde::{Deserialize, Serialize};

pub const SECONDS_PER_WORD: f64 = 0.17;
pub const SENTENCE_PAUSE_SECONDS: f64 = 0.3;
pub const LEADING_PAUSE_SECONDS: f64 = 0.5;
pub const MIN_SEGMENT_SECONDS: f64 = 1.0;

/// Extra time added to every fragment on top of the per-word rate.
const FRAGMENT_PADDING_SECONDS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub text: String,
    #[serde(rename = "startTime")]
    pub start_time_seconds: f64,
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
}

impl CaptionSegment {
    pub fn end_time_seconds(&self) -> f64 {
        self.start_time_seconds + self.duration_seconds
    }
}

/// Pacing constants for caption placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionPacing {
    pub seconds_per_word: f64,
    pub sentence_pause: f64,
    pub leading_pause: f64,
    pub min_segment: f64,
}

impl Default for CaptionPacing {
    fn default() -> Self {
        Self {
            seconds_per_word: SECONDS_PER_WORD,
            sentence_pause: SENTENCE_PAUSE_SECONDS,
            leading_pause: LEADING_PAUSE_SECONDS,
            min_segment: MIN_SEGMENT_SECONDS,
        }
    }
}

impl CaptionPacing {
    pub fn estimate_duration(&self, fragment: &str) -> f64 {
        let words = fragment.split_whitespace().count() as f64;
        (words * self.seconds_per_word + FRAGMENT_PADDING_SECONDS).max(self.min_segment)
    }

    /// Place every sentence of `text` back to back on the timeline.
    pub fn timeline(&self, text: &str) -> Vec<CaptionSegment> {
        let mut segments = Vec::new();
        let mut cursor = self.leading_pause;

        for sentence in split_sentences(text) {
            let duration = self.estimate_duration(&sentence);
            segments.push(CaptionSegment {
                text: sentence,
                start_time_seconds: cursor,
                duration_seconds: duration,
            });
            cursor += duration + self.sentence_pause;
        }

        segments
    }
}

/// Split on `.`, `!` and `?`, keeping runs of terminal punctuation with the
/// fragment they close. Fragments without any word characters are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if is_terminal(c) && !chars.peek().copied().is_some_and(is_terminal) {
            push_fragment(&mut sentences, &current);
            current.clear();
        }
    }
    push_fragment(&mut sentences, &current);

    sentences
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn push_fragment(sentences: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if trimmed.chars().any(char::is_alphanumeric) {
        sentences.push(trimmed.to_string());
    }
}

/// Captions for `text` with the default pacing.
pub fn caption_timeline(text: &str) -> Vec<CaptionSegment> {
    CaptionPacing::default().timeline(text)
}
