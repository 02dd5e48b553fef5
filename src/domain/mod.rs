//! Domain layer - Pure business logic.

// Media inspection (requires ffmpeg-next)
pub mod av;

pub mod assets;
pub mod captions;
pub mod composition;
pub mod jobs;
pub mod music;
