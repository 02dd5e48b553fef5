//! In-process job table.

use crate::domain::jobs::{JobStatus, JobUpdate, RenderJob};
use crate::error::{RenderError, Result};
use crate::ports::job_store::JobStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Jobs live for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, RenderJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: RenderJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(RenderError::InvalidTransition(format!(
                "job {} already exists",
                job.id
            )));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<RenderJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<RenderJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RenderError::JobNotFound(job_id.to_string()))?;
        job.apply(update)?;
        Ok(job.clone())
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<RenderJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| statuses.contains(&job.status))
            .cloned()
            .collect())
    }
}
