use super::pipeline::RenderPipeline;
use crate::domain::jobs::{JobStatus, JobUpdate, RenderJob, RenderRequest, SubmissionMode};
use crate::error::{panic_message, RenderError, Result};
use crate::ports::job_store::JobStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// Answer to a render submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub job_id: String,
    pub status: JobStatus,
    pub mode: SubmissionMode,
}

/// Owns the job lifecycle. Every submitted job runs in its own task, watched
/// by a supervisor that records failures and panics against the job.
pub struct JobOrchestrator<R> {
    store: Arc<R>,
    pipeline: Arc<RenderPipeline>,
    permits: Option<Arc<Semaphore>>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl<R> JobOrchestrator<R>
where
    R: JobStore + 'static,
{
    /// `max_concurrent` of `None` lets every job render at once.
    pub fn new(store: Arc<R>, pipeline: Arc<RenderPipeline>, max_concurrent: Option<usize>) -> Self {
        Self {
            store,
            pipeline,
            permits: max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    /// Record a pending job and start rendering it in the background.
    pub async fn submit(&self, request: RenderRequest) -> Result<Submission> {
        let job = RenderJob::new();
        let job_id = job.id.clone();
        self.store.create(job).await?;

        let mode = if self.pipeline.engine().is_available() {
            SubmissionMode::Primary
        } else {
            SubmissionMode::FallbackUnknownYet
        };
        info!(job_id = %job_id, ?mode, images = request.images.len(), "render submitted");

        let work: JoinHandle<Result<RenderJob>> = {
            let pipeline = self.pipeline.clone();
            let permits = self.permits.clone();
            let job_id = job_id.clone();
            tokio::spawn(async move {
                let _permit = match permits {
                    Some(permits) => Some(permits.acquire_owned().await.map_err(|_| {
                        RenderError::InvalidTransition("render queue closed".to_string())
                    })?),
                    None => None,
                };
                pipeline.run(&job_id, &request).await
            })
        };

        let supervisor = {
            let store = self.store.clone();
            let job_id = job_id.clone();
            tokio::spawn(async move {
                let detail = match work.await {
                    Ok(Ok(_)) => return,
                    Ok(Err(e)) => e.to_string(),
                    Err(join_error) => join_failure(join_error),
                };
                error!(job_id = %job_id, %detail, "render failed");
                if let Err(e) = store.update(&job_id, JobUpdate::Failed { detail }).await {
                    error!(job_id = %job_id, error = %e, "could not record job failure");
                }
            })
        };

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, handle| !handle.is_finished());
        tasks.insert(job_id.clone(), supervisor);

        Ok(Submission {
            job_id,
            status: JobStatus::Pending,
            mode,
        })
    }

    pub async fn get_status(&self, job_id: &str) -> Result<Option<RenderJob>> {
        self.store.get(job_id).await
    }

    pub async fn list_active(&self) -> Result<Vec<RenderJob>> {
        self.store
            .list_by_status(&[JobStatus::Pending, JobStatus::Rendering])
            .await
    }

    /// Wait for every in-flight job to reach a terminal state.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = self.tasks.lock().await.drain().collect();
        if !handles.is_empty() {
            info!(jobs = handles.len(), "waiting for in-flight renders");
        }
        for (job_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(job_id = %job_id, error = %e, "render supervisor did not finish cleanly");
            }
        }
    }
}

fn join_failure(join_error: JoinError) -> String {
    if join_error.is_panic() {
        format!("render task panicked: {}", panic_message(join_error.into_panic()))
    } else {
        format!("render task aborted: {}", join_error)
    }
}
