use crate::domain::jobs::{JobStatus, JobUpdate, RenderJob};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly submitted job
    async fn create(&self, job: RenderJob) -> Result<()>;

    async fn get(&self, job_id: &str) -> Result<Option<RenderJob>>;

    /// Apply an update atomically and return the resulting record
    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<RenderJob>;

    /// Jobs whose status is one of `statuses`
    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<RenderJob>>;
}
