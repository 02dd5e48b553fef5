//! Error taxonomy for the render pipeline.

use std::any::Any;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    /// A referenced image or audio file could not be resolved by any path.
    #[error("asset unavailable: {reference} ({reason})")]
    AssetUnavailable { reference: String, reason: String },

    /// The primary engine is missing or its entry artifact is absent.
    #[error("primary engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The primary engine started but failed while rendering.
    #[error("primary engine render failed: {0}")]
    EngineRender(String),

    /// The fallback encoder exited non-zero or timed out.
    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("invalid render request: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid job transition: {0}")]
    InvalidTransition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    pub fn asset(reference: impl Into<String>, reason: impl ToString) -> Self {
        RenderError::AssetUnavailable {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }

    /// Engine failures are recovered by the fallback encoder; everything else
    /// terminates the job.
    pub fn falls_back(&self) -> bool {
        matches!(
            self,
            RenderError::EngineUnavailable(_) | RenderError::EngineRender(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Text of a caught panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
