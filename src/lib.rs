//! Reelsmith - Render job pipeline for short vertical property videos.
//!
//! Hexagonal Architecture:
//! - domain/: Pure logic (captions, composition timing, jobs, music catalog)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (filesystem, HTTP, engine CLIs)
//! - application/: Services driving the ports (pipeline, orchestrator)
//! - config: Environment configuration
//!
//! A job is rendered by the compositing engine when it is installed and by
//! a caption-free command-line encoder otherwise.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use config::RenderConfig;
pub use error::{RenderError, Result};
