//! Registry of running backup and restore jobs.
//!
//! Each running job owns a [`CancellationToken`]. Cancelling it makes the
//! orchestrator kill the job's child process (or drop its admin connection)
//! and report the job as failed with `Cancelled`.

use crate::models::{DialectTag, JobOperation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

struct RunningJob {
    operation: JobOperation,
    dialect: DialectTag,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Snapshot of a running job, for listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub operation: JobOperation,
    pub dialect: DialectTag,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, RunningJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a job that is about to start. Returns its cancellation token.
    pub async fn register(
        &self,
        job_id: Uuid,
        operation: JobOperation,
        dialect: DialectTag,
    ) -> CancellationToken {
        let cancel = CancellationToken::new();
        let job = RunningJob {
            operation,
            dialect,
            started_at: Utc::now(),
            cancel: cancel.clone(),
        };
        self.jobs.write().await.insert(job_id, job);
        debug!(job_id = %job_id, %operation, %dialect, "Job registered");
        cancel
    }

    /// Forget a finished job.
    pub async fn finish(&self, job_id: Uuid) {
        if self.jobs.write().await.remove(&job_id).is_some() {
            debug!(job_id = %job_id, "Job unregistered");
        }
    }

    /// Request cancellation. Returns false when no such job is running.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(&job_id) {
            Some(job) => {
                job.cancel.cancel();
                info!(job_id = %job_id, operation = %job.operation, "Job cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every running job. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let jobs = self.jobs.read().await;
        for job in jobs.values() {
            job.cancel.cancel();
        }
        if !jobs.is_empty() {
            info!(count = jobs.len(), "Cancelling all running jobs");
        }
        jobs.len()
    }

    pub async fn list(&self) -> Vec<JobSummary> {
        let now = Utc::now();
        let jobs = self.jobs.read().await;
        let mut summaries: Vec<JobSummary> = jobs
            .iter()
            .map(|(id, job)| JobSummary {
                job_id: *id,
                operation: job.operation,
                dialect: job.dialect,
                started_at: job.started_at,
                duration_secs: (now - job.started_at).num_seconds().max(0) as u64,
            })
            .collect();
        summaries.sort_by_key(|s| s.started_at);
        summaries
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
