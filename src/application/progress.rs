//! Mapping of pipeline stages onto the job's progress percentage.

use crate::domain::jobs::JobUpdate;
use crate::ports::job_store::JobStore;
use crate::ports::progress::ProgressSink;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Slice of the 0-100 range reserved for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageWindow {
    pub start: u8,
    pub end: u8,
}

pub const STAGING: StageWindow = StageWindow { start: 0, end: 10 };
pub const COMPOSITION: StageWindow = StageWindow { start: 10, end: 30 };
pub const FRAMES: StageWindow = StageWindow { start: 30, end: 95 };
pub const FINALIZING: StageWindow = StageWindow { start: 95, end: 100 };

impl StageWindow {
    pub fn percent(&self, fraction: f64) -> u8 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f64::from(self.end - self.start);
        self.start + (fraction * span).floor() as u8
    }
}

/// Reports a job's progress within one stage window.
pub struct JobProgress {
    store: Arc<dyn JobStore>,
    job_id: String,
    window: StageWindow,
}

impl JobProgress {
    pub fn new(store: Arc<dyn JobStore>, job_id: impl Into<String>, window: StageWindow) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            window,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The same job, reporting into another window.
    pub fn stage(&self, window: StageWindow) -> Self {
        Self {
            store: self.store.clone(),
            job_id: self.job_id.clone(),
            window,
        }
    }

    pub async fn enter(&self) {
        self.report(0.0).await;
    }

    pub async fn finish(&self) {
        self.report(1.0).await;
    }
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, fraction: f64) {
        let percent = self.window.percent(fraction);
        if let Err(e) = self
            .store
            .update(&self.job_id, JobUpdate::Progress(percent))
            .await
        {
            debug!(job_id = %self.job_id, percent, error = %e, "progress update dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::memory::InMemoryJobStore;
    use crate::domain::jobs::RenderJob;

    #[test]
    fn windows_are_contiguous_and_cover_everything() {
        assert_eq!(STAGING.start, 0);
        assert_eq!(STAGING.end, COMPOSITION.start);
        assert_eq!(COMPOSITION.end, FRAMES.start);
        assert_eq!(FRAMES.end, FINALIZING.start);
        assert_eq!(FINALIZING.end, 100);
    }

    #[test]
    fn fractions_map_into_the_window() {
        assert_eq!(FRAMES.percent(0.0), 30);
        assert_eq!(FRAMES.percent(0.5), 62);
        assert_eq!(FRAMES.percent(1.0), 95);
        assert_eq!(FRAMES.percent(7.0), 95);
        assert_eq!(FRAMES.percent(f64::NAN), 30);
    }

    #[tokio::test]
    async fn reports_land_in_the_store() {
        let store = Arc::new(InMemoryJobStore::new());
        store.create(RenderJob::with_id("job")).await.unwrap();
        store.update("job", JobUpdate::Started).await.unwrap();

        let progress = JobProgress::new(store.clone(), "job", COMPOSITION);
        progress.report(0.5).await;
        assert_eq!(store.get("job").await.unwrap().unwrap().progress_percent, 20);

        progress.stage(STAGING).finish().await;
        assert_eq!(store.get("job").await.unwrap().unwrap().progress_percent, 20);
    }
}
