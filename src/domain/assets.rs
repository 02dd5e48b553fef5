use std::path::PathBuf;

/// An image staged into the scratch area.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    /// Reference supplied by the caller.
    pub source_reference: String,
    /// Staged copy on disk.
    pub local_path: PathBuf,
    /// Same-origin URL of the staged copy.
    pub render_url: String,
    pub display_duration_ms: u64,
    /// Slide position, zero-based.
    pub sequence_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Music,
    Narration,
}

impl AudioKind {
    pub fn label(self) -> &'static str {
        match self {
            AudioKind::Music => "music",
            AudioKind::Narration => "narration",
        }
    }
}

/// An audio track staged into the scratch area.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub source_reference: String,
    pub local_path: PathBuf,
    pub render_url: String,
    pub kind: AudioKind,
}

/// Everything staged for one job, in slide order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedAssets {
    pub images: Vec<ImageAsset>,
    pub music: Option<AudioAsset>,
    pub narration: Option<AudioAsset>,
}

impl StagedAssets {
    /// Every file written to the scratch area for this job.
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        self.images
            .iter()
            .map(|image| image.local_path.clone())
            .chain(self.music.iter().map(|audio| audio.local_path.clone()))
            .chain(self.narration.iter().map(|audio| audio.local_path.clone()))
            .collect()
    }
}
