//! Ports - Trait definitions implemented by adapters.

pub mod encoder;
pub mod fetch;
pub mod job_store;
pub mod progress;
pub mod renderer;
pub mod storage;
