//! Bounded external process execution shared by the engine and encoder adapters.

use crate::ports::progress::ProgressSink;
use bytes::BytesMut;
use futures::TryStreamExt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio_util::codec::{Decoder, FramedRead};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    /// Bytes retained from each output stream
    pub output_cap: usize,
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub status: ExitStatus,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

#[derive(Debug, Error)]
pub enum ProcessFailure {
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} timed out after {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("{program} I/O error: {source}")]
    Io { program: String, source: io::Error },

    #[error("{program} exited with {status}: {diagnostics}")]
    Exited {
        program: String,
        status: ExitStatus,
        diagnostics: String,
    },
}

/// Keeps the last `cap` bytes written to it.
pub(crate) struct TailBuffer {
    buf: String,
    cap: usize,
}

impl TailBuffer {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
        }
    }

    pub(crate) fn push_line(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');
        if self.buf.len() > self.cap {
            let mut cut = self.buf.len() - self.cap;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    pub(crate) fn into_string(self) -> String {
        self.buf
    }
}

/// Newline-delimited decoder that cuts lines at `max_length` bytes and
/// drops the rest of the line, so a stream without newlines stays bounded.
pub(crate) struct BoundedLines {
    max_length: usize,
    discarding: bool,
}

impl BoundedLines {
    pub(crate) fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            discarding: false,
        }
    }
}

impl Decoder for BoundedLines {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        loop {
            match buf.iter().position(|b| *b == b'\n') {
                Some(newline) => {
                    let line = buf.split_to(newline + 1);
                    if std::mem::take(&mut self.discarding) {
                        continue;
                    }
                    let end = newline.min(self.max_length);
                    return Ok(Some(String::from_utf8_lossy(&line[..end]).into_owned()));
                }
                None if self.discarding => {
                    buf.clear();
                    return Ok(None);
                }
                None if buf.len() > self.max_length => {
                    let line = buf.split_to(self.max_length);
                    self.discarding = true;
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() || std::mem::take(&mut self.discarding) {
            buf.clear();
            return Ok(None);
        }
        let line = buf.split();
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

async fn read_tail<R: AsyncRead + Unpin>(reader: R, cap: usize) -> io::Result<String> {
    let mut lines = FramedRead::new(reader, BoundedLines::new(cap));
    let mut tail = TailBuffer::new(cap);
    while let Some(line) = lines.try_next().await? {
        tail.push_line(line.trim_end());
    }
    Ok(tail.into_string())
}

/// Run `command` to completion within `limits`.
///
/// Every stdout line is offered to `parse_progress`; parsed fractions are
/// forwarded to `progress`. The child is killed when the timeout fires.
pub async fn run_bounded(
    mut command: Command,
    limits: ProcessLimits,
    parse_progress: &(dyn Fn(&str) -> Option<f64> + Send + Sync),
    progress: &dyn ProgressSink,
) -> Result<ProcessOutcome, ProcessFailure> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ProcessFailure::Spawn {
        program: program.clone(),
        source,
    })?;

    let io_failure = |source: io::Error| ProcessFailure::Io {
        program: program.clone(),
        source,
    };
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_failure(io::Error::new(io::ErrorKind::Other, "stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_failure(io::Error::new(io::ErrorKind::Other, "stderr not captured")))?;

    let cap = limits.output_cap;
    let stderr_task = tokio::spawn(read_tail(stderr, cap));

    let work = async {
        let mut lines = FramedRead::new(stdout, BoundedLines::new(cap));
        let mut tail = TailBuffer::new(cap);
        while let Some(line) = lines.try_next().await? {
            let text = line.trim_end();
            if let Some(fraction) = parse_progress(text) {
                progress.report(fraction.clamp(0.0, 1.0)).await;
            }
            tail.push_line(text);
        }
        let status = child.wait().await?;
        Ok::<_, io::Error>((status, tail.into_string()))
    };

    let finished = tokio::time::timeout(limits.timeout, work).await;
    let (status, stdout_tail) = match finished {
        Ok(result) => result.map_err(io_failure)?,
        Err(_) => {
            let _ = child.kill().await;
            stderr_task.abort();
            return Err(ProcessFailure::TimedOut {
                program,
                after: limits.timeout,
            });
        }
    };

    let stderr_tail = match stderr_task.await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => format!("<stderr unreadable: {}>", e),
        Err(e) => format!("<stderr reader failed: {}>", e),
    };

    if !status.success() {
        return Err(ProcessFailure::Exited {
            program,
            status,
            diagnostics: stderr_tail,
        });
    }

    Ok(ProcessOutcome {
        status,
        stdout_tail,
        stderr_tail,
    })
}
