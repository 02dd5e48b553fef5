use async_trait::async_trait;

/// Receives fractional progress in `[0, 1]` from a long-running stage.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, fraction: f64);
}

/// Sink that drops every report.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _fraction: f64) {}
}
