//! Local adapters for single-server deployment.

pub mod api;
pub mod compositor;
pub mod fetch;
pub mod ffmpeg;
pub mod fs;
pub mod memory;
pub mod process;
