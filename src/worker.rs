//! Background job processing
//!
//! One task per job, strictly sequential over the job's URLs with a fixed
//! inter-unit delay. Cancellation is cooperative: the CANCELLED status is
//! polled at every unit boundary, so the worst case latency is one in-flight
//! remote call. Task handles are retained so shutdown is deterministic.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::{JobRegistry, TransitionUpdate};
use crate::remote::RemoteClient;
use crate::types::{JobError, JobId, JobStatus, JobType};

/// Owns the join handles of running job tasks.
#[derive(Default)]
pub struct WorkerSupervisor {
    tasks: DashMap<JobId, JoinHandle<()>>,
}

impl WorkerSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the processing task for a freshly created job.
    pub fn spawn_job(
        &self,
        registry: Arc<JobRegistry>,
        remote: Arc<RemoteClient>,
        job_id: JobId,
        crawl_limit: u32,
        unit_delay: Duration,
    ) {
        let id = job_id.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = process_job(&registry, &remote, &id, crawl_limit, unit_delay).await {
                warn!(job_id = %id, error = %e, "job task failed");
                // Force the job terminal; a job already terminal rejects this
                // and that is fine.
                let _ = registry.transition(
                    &id,
                    JobStatus::Failed,
                    TransitionUpdate {
                        completed_at: Some(Utc::now()),
                        push_error: Some(JobError::new(None, e.to_string())),
                        ..Default::default()
                    },
                );
            }
        });
        self.tasks.insert(job_id, handle);
    }

    /// Number of tasks that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Drop handles of tasks that already ran to completion.
    pub fn reap_finished(&self) {
        self.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Abort and await every outstanding task.
    pub async fn shutdown(&self) {
        let ids: Vec<JobId> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = self.tasks.remove(&id) {
                handle.abort();
                let _ = handle.await;
            }
        }
        info!("worker supervisor shut down");
    }
}

/// Run one job to a terminal state.
///
/// Per-unit failures are recorded and processing continues; only an
/// unexpected error escapes, and the caller forces the job to FAILED.
async fn process_job(
    registry: &JobRegistry,
    remote: &RemoteClient,
    job_id: &str,
    crawl_limit: u32,
    unit_delay: Duration,
) -> anyhow::Result<()> {
    // Pick up the job. A job cancelled while still waiting rejects the
    // transition; there is nothing to do then.
    let job = match registry.transition(
        job_id,
        JobStatus::Running,
        TransitionUpdate { started_at: Some(Utc::now()), ..Default::default() },
    ) {
        Ok(job) => job,
        Err(e) => {
            debug!(job_id, error = %e, "job not picked up");
            return Ok(());
        }
    };

    info!(job_id, urls = job.urls.len(), job_type = job.job_type.as_str(), "job started");

    let mut completed: u64 = 0;
    let mut failed: u64 = 0;

    for url in &job.urls {
        // Re-check after every suspension point: cancellation must be
        // observed at the unit boundary.
        match registry.get(job_id).map(|j| j.status) {
            Some(JobStatus::Running) => {}
            _ => break,
        }

        registry.record_progress(job_id, completed, failed, Some(url.clone()), None)?;

        let outcome = match job.job_type {
            JobType::Crawl => remote.crawl_url(url, crawl_limit).await,
            _ => remote.scrape_url(url).await,
        };

        let error = match outcome {
            Ok(report) => {
                completed += 1;
                debug!(job_id, url, duration = report.duration_seconds, "unit completed");
                None
            }
            Err(e) => {
                failed += 1;
                let verb = if job.job_type == JobType::Crawl { "crawl" } else { "scrape" };
                Some(JobError::new(Some(url.clone()), format!("Failed to {verb} {url}: {e}")))
            }
        };

        registry.record_progress(job_id, completed, failed, None, error)?;

        tokio::time::sleep(unit_delay).await;
    }

    finalize_job(registry, job_id, completed)?;
    Ok(())
}

/// Classify the finished job. Cancellation observed mid-run leaves the
/// record exactly as the cancel path wrote it.
fn finalize_job(registry: &JobRegistry, job_id: &str, completed: u64) -> anyhow::Result<()> {
    let job = registry
        .get(job_id)
        .ok_or_else(|| anyhow::anyhow!("job {job_id} disappeared from registry"))?;

    if job.status != JobStatus::Running {
        info!(job_id, status = %job.status, "job ended without finalization");
        return Ok(());
    }

    let final_status = if job.errors.is_empty() {
        JobStatus::Completed
    } else if completed > 0 {
        JobStatus::CompletedWithErrors
    } else {
        JobStatus::Failed
    };

    registry.transition(
        job_id,
        final_status,
        TransitionUpdate {
            completed_at: Some(Utc::now()),
            current_url: Some(None),
            ..Default::default()
        },
    )?;

    info!(
        job_id,
        status = %final_status,
        completed,
        errors = job.errors.len(),
        "job finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::registry::JobRegistry;
    use crate::types::JobType;

    fn unreachable_remote() -> Arc<RemoteClient> {
        // Discard port; connections are refused immediately.
        let config = RemoteConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        Arc::new(RemoteClient::new(config).unwrap())
    }

    #[tokio::test]
    async fn job_cancelled_before_pickup_stays_cancelled() {
        let registry = Arc::new(JobRegistry::new());
        let remote = unreachable_remote();
        let job = registry.create(JobType::Scrape, vec!["https://a.test".into()]).unwrap();
        registry
            .transition(&job.job_id, JobStatus::Cancelled, TransitionUpdate::default())
            .unwrap();

        process_job(&registry, &remote, &job.job_id, 10, Duration::ZERO).await.unwrap();

        let job = registry.get(&job.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.started_at.is_none());
        assert_eq!(job.completed_urls, 0);
    }

    #[tokio::test]
    async fn all_units_failing_yields_failed() {
        let registry = Arc::new(JobRegistry::new());
        let remote = unreachable_remote();
        let job = registry
            .create(JobType::Scrape, vec!["https://a.test".into(), "https://b.test".into()])
            .unwrap();

        process_job(&registry, &remote, &job.job_id, 10, Duration::ZERO).await.unwrap();

        let job = registry.get(&job.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.completed_urls, 0);
        assert_eq!(job.failed_urls, 2);
        assert_eq!(job.errors.len(), 2);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn supervisor_shutdown_awaits_tasks() {
        let registry = Arc::new(JobRegistry::new());
        let remote = unreachable_remote();
        let supervisor = WorkerSupervisor::new();

        let job = registry.create(JobType::Scrape, vec!["https://a.test".into()]).unwrap();
        supervisor.spawn_job(
            registry.clone(),
            remote.clone(),
            job.job_id.clone(),
            10,
            Duration::ZERO,
        );

        supervisor.shutdown().await;
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn reap_finished_drops_completed_handles() {
        let registry = Arc::new(JobRegistry::new());
        let remote = unreachable_remote();
        let supervisor = WorkerSupervisor::new();

        let job = registry.create(JobType::Scrape, vec!["https://a.test".into()]).unwrap();
        supervisor.spawn_job(
            registry.clone(),
            remote.clone(),
            job.job_id.clone(),
            10,
            Duration::ZERO,
        );

        // Wait for the task to run to completion, then reap.
        for _ in 0..100 {
            if supervisor.active_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        supervisor.reap_finished();
        assert_eq!(supervisor.tasks.len(), 0);
    }
}
