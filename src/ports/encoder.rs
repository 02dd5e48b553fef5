use super::progress::ProgressSink;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A single encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Wall-clock limit for the whole invocation
    pub timeout: Duration,
    /// Bytes of diagnostic output retained
    pub output_cap: usize,
    /// Length of the produced video, used to turn encoder timestamps into progress
    pub expected_duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderOutput {
    /// Last `output_cap` bytes of diagnostics
    pub diagnostics: String,
}

#[async_trait]
pub trait EncoderExecutor: Send + Sync {
    /// Run `command` to completion; non-zero exit and timeout are `Encoding` errors
    async fn run(&self, command: &EncoderCommand, progress: &dyn ProgressSink)
        -> Result<EncoderOutput>;
}
