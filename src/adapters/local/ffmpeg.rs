use super::process::{run_bounded, ProcessLimits};
use crate::error::{RenderError, Result};
use crate::ports::encoder::{EncoderCommand, EncoderExecutor, EncoderOutput};
use crate::ports::progress::ProgressSink;
use async_trait::async_trait;
use tokio::process::Command;

/// Runs the fallback encoder as a child process.
///
/// Commands are expected to carry `-progress pipe:1` so the encoder writes
/// `key=value` progress records to stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegExecutor;

impl FfmpegExecutor {
    pub fn new() -> Self {
        Self
    }
}

/// Fraction of `expected_ms` covered by an encoder progress record.
pub fn parse_progress_line(line: &str, expected_ms: u64) -> Option<f64> {
    let (key, value) = line.split_once('=')?;
    match key.trim() {
        // both keys carry microseconds
        "out_time_us" | "out_time_ms" => {
            let micros: f64 = value.trim().parse().ok()?;
            if expected_ms == 0 || micros < 0.0 {
                return None;
            }
            Some((micros / 1000.0 / expected_ms as f64).min(1.0))
        }
        "progress" if value.trim() == "end" => Some(1.0),
        _ => None,
    }
}

#[async_trait]
impl EncoderExecutor for FfmpegExecutor {
    async fn run(
        &self,
        command: &EncoderCommand,
        progress: &dyn ProgressSink,
    ) -> Result<EncoderOutput> {
        let mut process = Command::new(&command.program);
        process.args(&command.args);

        let limits = ProcessLimits {
            timeout: command.timeout,
            output_cap: command.output_cap,
        };
        let expected_ms = command.expected_duration_ms;
        let parse = move |line: &str| parse_progress_line(line, expected_ms);

        let outcome = run_bounded(process, limits, &parse, progress)
            .await
            .map_err(|failure| RenderError::Encoding(failure.to_string()))?;

        Ok(EncoderOutput {
            diagnostics: outcome.stderr_tail,
        })
    }
}
