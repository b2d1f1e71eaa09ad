//! Dashboard surface
//!
//! The query/control API consumed by the presentation layer. Every method
//! returns a plain structured result with an explicit success or error
//! field; nothing here ever raises across the boundary, and each data
//! source failing independently degrades only its own contribution.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::metrics::{derive_aggregate_metrics, derive_job_metrics};
use crate::queue::QueueReader;
use crate::reconcile::{reconcile, ReconcileInput, SourceCounts};
use crate::registry::{JobRegistry, RegistryError, TransitionUpdate};
use crate::remote::RemoteClient;
use crate::types::{
    AggregateMetrics, FullHealthReport, HealthResult, JobId, JobMetrics, JobRecord, JobStatus,
    JobType, QueueStatus, QUEUE_MONITOR_JOB_ID,
};
use crate::worker::WorkerSupervisor;

/// A job record annotated with derived metrics, the unit of display.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub record: JobRecord,
    #[serde(flatten)]
    pub metrics: JobMetrics,
}

impl JobView {
    fn annotate(record: JobRecord) -> Self {
        let metrics = derive_job_metrics(&record, Utc::now());
        Self { record, metrics }
    }
}

/// Output of `list_jobs`
#[derive(Debug, Default, Serialize)]
pub struct JobsResponse {
    pub active_jobs: Vec<JobView>,
    pub recent_jobs: Vec<JobView>,
    /// Untruncated partition sizes
    pub active_total: usize,
    pub recent_total: usize,
    pub counts: SourceCounts,
    /// Collector failures; partial data is still served
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Output of `get_job`
#[derive(Debug, Serialize)]
pub struct JobDetailResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of `get_job_data`
#[derive(Debug, Serialize)]
pub struct JobDataResponse {
    pub success: bool,
    pub data: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Distinguishes expired data from an unreachable service
    #[serde(skip)]
    pub not_found: bool,
}

/// Output of `start_job`
#[derive(Debug, Serialize)]
pub struct StartJobResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of `cancel_job`
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

/// One failed cancellation inside `cancel_all`
#[derive(Debug, Serialize)]
pub struct CancelFailure {
    pub job_id: JobId,
    pub error: String,
}

/// Output of `cancel_all`
#[derive(Debug, Serialize)]
pub struct CancelAllResponse {
    pub success: bool,
    pub message: String,
    pub cancelled_jobs: Vec<JobId>,
    pub failed_jobs: Vec<CancelFailure>,
    pub total_attempted: usize,
}

/// Output of `clear_queue`
#[derive(Debug, Serialize)]
pub struct ClearQueueResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The dashboard core: owns the registry, the two external-source clients,
/// and the worker supervisor.
pub struct Dashboard {
    config: Config,
    registry: Arc<JobRegistry>,
    queue: Arc<QueueReader>,
    remote: Arc<RemoteClient>,
    supervisor: WorkerSupervisor,
}

impl Dashboard {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let queue = Arc::new(QueueReader::new(config.queue.clone())?);
        let remote = Arc::new(RemoteClient::new(config.remote.clone())?);
        Ok(Self {
            config,
            registry: Arc::new(JobRegistry::new()),
            queue,
            remote,
            supervisor: WorkerSupervisor::new(),
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The reconciled, metrics-annotated job list.
    pub async fn list_jobs(&self) -> JobsResponse {
        let input = self.collect_sources().await;
        let reconciled = reconcile(input, self.config.dashboard.display_limit);

        JobsResponse {
            active_jobs: reconciled.active.into_iter().map(JobView::annotate).collect(),
            recent_jobs: reconciled.terminal.into_iter().map(JobView::annotate).collect(),
            active_total: reconciled.active_total,
            recent_total: reconciled.terminal_total,
            counts: reconciled.counts,
            errors: reconciled.errors,
        }
    }

    /// One job by id: registry first, then the remote API.
    pub async fn get_job(&self, job_id: &str) -> JobDetailResponse {
        if let Some(record) = self.registry.get(job_id) {
            return JobDetailResponse {
                success: true,
                job: Some(JobView::annotate(record)),
                error: None,
            };
        }
        if let Some(record) = self.remote.fetch_status(job_id).await {
            return JobDetailResponse {
                success: true,
                job: Some(JobView::annotate(record)),
                error: None,
            };
        }
        JobDetailResponse {
            success: false,
            job: None,
            error: Some("Job not found".to_string()),
        }
    }

    /// One page of a crawl's scraped output, proxied from the remote
    /// service. The service expires crawl data, so a miss is reported
    /// distinctly from an outage.
    pub async fn get_job_data(&self, job_id: &str, skip: u64, limit: u64) -> JobDataResponse {
        match self.remote.fetch_job_data(job_id, skip, limit).await {
            Ok(Some(page)) => JobDataResponse {
                success: true,
                data: page.data,
                next: page.next,
                has_more: page.has_more,
                error: None,
                not_found: false,
            },
            Ok(None) => JobDataResponse {
                success: false,
                data: Vec::new(),
                next: None,
                has_more: false,
                error: Some("Job data not found or expired".to_string()),
                not_found: true,
            },
            Err(e) => JobDataResponse {
                success: false,
                data: Vec::new(),
                next: None,
                has_more: false,
                error: Some(e.to_string()),
                not_found: false,
            },
        }
    }

    /// Aggregate metrics over registry jobs.
    pub fn get_metrics(&self) -> AggregateMetrics {
        derive_aggregate_metrics(&self.registry.list_all())
    }

    /// Bucketed queue store snapshot.
    pub async fn get_queue_status(&self) -> QueueStatus {
        self.queue.queue_status().await
    }

    /// Remote service liveness probe.
    pub async fn health(&self) -> HealthResult {
        self.remote.probe_health().await
    }

    /// Liveness plus synthetic-scrape capability check.
    pub async fn full_health(&self) -> FullHealthReport {
        self.remote.probe_full_health().await
    }

    // ------------------------------------------------------------------
    // Control plane
    // ------------------------------------------------------------------

    /// Create a job and spawn its background processing task.
    pub fn start_job(&self, job_type: &str, urls: Vec<String>, limit: Option<u32>) -> StartJobResponse {
        let job_type = match job_type {
            "scrape" => JobType::Scrape,
            _ => JobType::Crawl,
        };
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        let count = urls.len();

        let job = match self.registry.create(job_type, urls) {
            Ok(job) => job,
            Err(e) => {
                return StartJobResponse {
                    success: false,
                    job_id: None,
                    message: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let limit = limit.unwrap_or(self.config.remote.crawl_limit);
        self.supervisor.reap_finished();
        self.supervisor.spawn_job(
            self.registry.clone(),
            self.remote.clone(),
            job.job_id.clone(),
            limit,
            Duration::from_millis(self.config.dashboard.unit_delay_ms),
        );

        info!(job_id = %job.job_id, job_type = job_type.as_str(), urls = count, "job started");
        StartJobResponse {
            success: true,
            job_id: Some(job.job_id),
            message: Some(format!("Started {} job with {} URLs", job_type.as_str(), count)),
            error: None,
        }
    }

    /// Cancel one job: registry jobs cooperatively, unknown ids through the
    /// remote API's cancellation endpoints.
    pub async fn cancel_job(&self, job_id: &str) -> CancelResponse {
        if self.registry.contains(job_id) {
            return match self.registry.transition(
                job_id,
                JobStatus::Cancelled,
                TransitionUpdate::default(),
            ) {
                Ok(_) => CancelResponse {
                    success: true,
                    message: "Dashboard job cancelled successfully".to_string(),
                },
                Err(RegistryError::InvalidTransition { .. }) => CancelResponse {
                    success: false,
                    message: "Job cannot be cancelled in current state".to_string(),
                },
                Err(e) => CancelResponse { success: false, message: e.to_string() },
            };
        }

        if self.remote.cancel_remote(job_id).await {
            CancelResponse {
                success: true,
                message: "External job cancelled successfully".to_string(),
            }
        } else {
            CancelResponse {
                success: false,
                message: "Job not found or cannot be cancelled".to_string(),
            }
        }
    }

    /// Cancel every active job, reporting per-job outcomes.
    pub async fn cancel_all(&self) -> CancelAllResponse {
        let jobs = self.list_jobs().await;
        let mut cancelled_jobs = Vec::new();
        let mut failed_jobs = Vec::new();
        let mut attempted = 0;

        for view in &jobs.active_jobs {
            // The queue-pressure record is a display artifact, not a job.
            if view.record.job_id == QUEUE_MONITOR_JOB_ID {
                continue;
            }
            attempted += 1;
            let result = self.cancel_job(&view.record.job_id).await;
            if result.success {
                cancelled_jobs.push(view.record.job_id.clone());
            } else {
                failed_jobs.push(CancelFailure {
                    job_id: view.record.job_id.clone(),
                    error: result.message,
                });
            }
        }

        CancelAllResponse {
            success: true,
            message: format!("Cancelled {} jobs", cancelled_jobs.len()),
            cancelled_jobs,
            failed_jobs,
            total_attempted: attempted,
        }
    }

    /// Emergency queue wipe.
    pub async fn clear_queue(&self) -> ClearQueueResponse {
        match self.queue.clear_queues().await {
            Ok(deleted_keys) => ClearQueueResponse {
                success: true,
                message: format!("Cleared {} Redis queue keys", deleted_keys.len()),
                deleted_keys,
                error: None,
            },
            Err(e) => ClearQueueResponse {
                success: false,
                message: "Queue store not available".to_string(),
                deleted_keys: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Await or cancel all outstanding job tasks.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Gather the three source collections, isolating failures.
    async fn collect_sources(&self) -> ReconcileInput {
        let mut errors = Vec::new();

        let registry = self.registry.list_all();

        let (queue_status, queue_ids) = self.queue.list_queue_jobs().await;
        if let Some(e) = &queue_status.error {
            errors.push(format!("queue store: {e}"));
        }

        // Enrich a bounded subset of queue-discovered ids via the remote
        // API. Lookup misses are normal (the store outlives remote jobs).
        let known: HashSet<&str> = registry.iter().map(|j| j.job_id.as_str()).collect();
        let mut remote = Vec::new();
        for id in queue_ids
            .iter()
            .filter(|id| !known.contains(id.as_str()))
            .take(self.config.dashboard.remote_lookup_limit)
        {
            match self.remote.fetch_status(id).await {
                Some(mut record) => {
                    if let Some(meta) = self.queue.crawl_meta(id).await {
                        if record.created_at.is_none() {
                            record.created_at = meta
                                .created_at_ms
                                .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
                        }
                        if let Ok(value) = serde_json::to_value(&meta) {
                            record.metadata.insert("queue_meta".to_string(), value);
                        }
                    }
                    remote.push(record);
                }
                None => {
                    warn!(job_id = %id, "queue-tracked job unknown to remote service");
                }
            }
        }

        ReconcileInput {
            registry,
            queue_status,
            queue_ids,
            remote,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_dashboard() -> Dashboard {
        // Both dependencies point at closed ports: every collector must
        // degrade without surfacing a failure.
        let mut config = Config::default();
        config.remote.api_url = "http://127.0.0.1:9".to_string();
        config.queue.url = "redis://127.0.0.1:9/0".to_string();
        config.dashboard.unit_delay_ms = 0;
        Dashboard::new(config).unwrap()
    }

    #[tokio::test]
    async fn start_job_rejects_empty_urls() {
        let dashboard = offline_dashboard();
        let response = dashboard.start_job("scrape", vec!["  ".to_string()], None);
        assert!(!response.success);
        assert!(response.error.unwrap().contains("no URLs"));
    }

    #[tokio::test]
    async fn started_job_appears_in_listing() {
        let dashboard = offline_dashboard();
        let started = dashboard.start_job("scrape", vec!["https://a.test".to_string()], None);
        assert!(started.success);
        let job_id = started.job_id.unwrap();

        let detail = dashboard.get_job(&job_id).await;
        assert!(detail.success);
        let view = detail.job.unwrap();
        assert_eq!(view.record.total_urls, 1);
        assert_eq!(view.metrics.progress_percentage, 0.0);
        assert_eq!(view.metrics.success_rate, 0.0);

        dashboard.shutdown().await;
    }

    #[tokio::test]
    async fn list_jobs_degrades_when_everything_is_down() {
        let dashboard = offline_dashboard();
        let jobs = dashboard.list_jobs().await;
        assert!(jobs.active_jobs.is_empty());
        assert!(jobs.recent_jobs.is_empty());
        assert_eq!(jobs.errors.len(), 1, "queue failure should be recorded");
    }

    #[tokio::test]
    async fn metrics_on_empty_registry_are_zeroed() {
        let dashboard = offline_dashboard();
        let metrics = dashboard.get_metrics();
        assert_eq!(metrics.total_jobs, 0);
        assert_eq!(metrics.success_rate, 0.0);
    }

    #[tokio::test]
    async fn cancel_unknown_job_reports_not_found() {
        let dashboard = offline_dashboard();
        let response = dashboard.cancel_job("no-such-job").await;
        assert!(!response.success);
        assert!(response.message.contains("not found"));
    }

    #[tokio::test]
    async fn cancel_waiting_job_succeeds_once() {
        let dashboard = offline_dashboard();
        let started = dashboard.start_job("scrape", vec!["https://a.test".to_string()], None);
        let job_id = started.job_id.unwrap();

        let first = dashboard.cancel_job(&job_id).await;
        // Worker may have picked the job up already; either way the first
        // cancel succeeds and the job ends Cancelled.
        if first.success {
            let second = dashboard.cancel_job(&job_id).await;
            assert!(!second.success);
            let job = dashboard.get_job(&job_id).await.job.unwrap();
            assert_eq!(job.record.status, JobStatus::Cancelled);
        }

        dashboard.shutdown().await;
    }

    #[tokio::test]
    async fn job_data_against_unreachable_service_is_an_error_not_a_miss() {
        let dashboard = offline_dashboard();
        let response = dashboard.get_job_data("some-remote-id", 0, 10).await;
        assert!(!response.success);
        assert!(!response.not_found);
        assert!(response.data.is_empty());
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn clear_queue_degrades_without_store() {
        let dashboard = offline_dashboard();
        let response = dashboard.clear_queue().await;
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn job_view_serializes_record_and_metrics_flat() {
        let dashboard = offline_dashboard();
        let started = dashboard.start_job("scrape", vec!["https://a.test".to_string()], None);
        let detail = dashboard.get_job(&started.job_id.unwrap()).await;
        let value = serde_json::to_value(detail.job.unwrap()).unwrap();
        assert!(value.get("job_id").is_some());
        assert!(value.get("progress_percentage").is_some());
        assert!(value.get("success_rate").is_some());
        dashboard.shutdown().await;
    }
}
