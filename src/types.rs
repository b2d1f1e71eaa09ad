//! Core types for the scrapewatch dashboard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for a job (locally minted or remote-assigned)
pub type JobId = String;

/// Fixed id of the synthetic queue-pressure record surfaced by the reconciler
pub const QUEUE_MONITOR_JOB_ID: &str = "redis_queue_monitor";

// ============================================================================
// Job lifecycle
// ============================================================================

/// Job lifecycle status.
///
/// The first six states form the registry's state machine. The remainder
/// only appear on queue- or remote-sourced records, whose vocabularies we
/// do not control; an unrecognized remote status parses as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
    // Remote / queue vocabularies
    Active,
    Processing,
    Scraping,
    Delayed,
    Stuck,
    Unknown,
}

impl JobStatus {
    /// Terminal states reject every further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed | Self::Cancelled
        )
    }

    /// States shown in the "active" partition of the job list.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Waiting | Self::Running | Self::Active | Self::Processing | Self::Scraping
        )
    }

    /// Parse a status string from a remote payload, falling back to Unknown.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "waiting" | "queued" => Self::Waiting,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "completed_with_errors" => Self::CompletedWithErrors,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "active" => Self::Active,
            "processing" => Self::Processing,
            "scraping" => Self::Scraping,
            "delayed" => Self::Delayed,
            "stuck" => Self::Stuck,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Active => "active",
            Self::Processing => "processing",
            Self::Scraping => "scraping",
            Self::Delayed => "delayed",
            Self::Stuck => "stuck",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Scrape,
    Crawl,
    /// Synthetic aggregate record representing queue backlog
    QueueSummary,
    Unknown,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Crawl => "crawl",
            Self::QueueSummary => "queue_summary",
            Self::Unknown => "unknown",
        }
    }
}

/// Which source of truth produced a record.
///
/// Reconciliation precedence is Registry > Queue > Remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Registry,
    Queue,
    Remote,
}

/// One recorded per-unit failure. Append-only during processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    /// URL the failure relates to, when known
    pub url: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobError {
    pub fn new(url: impl Into<Option<String>>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Canonical unit of work tracking, populated from any of the three sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub job_type: JobType,
    pub source: JobSource,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Worker progress heartbeat, bumped at every unit boundary
    pub last_activity: Option<DateTime<Utc>>,
    pub total_urls: u64,
    pub completed_urls: u64,
    pub failed_urls: u64,
    /// URL currently in flight, for progress display
    pub current_url: Option<String>,
    /// The job's input URLs (registry jobs only)
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub errors: Vec<JobError>,
    /// Source-specific extra fields, passed through uninterpreted
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl JobRecord {
    /// Minimal record with everything optional unset.
    pub fn new(job_id: impl Into<JobId>, source: JobSource) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Unknown,
            job_type: JobType::Unknown,
            source,
            created_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            last_activity: None,
            total_urls: 0,
            completed_urls: 0,
            failed_urls: 0,
            current_url: None,
            urls: Vec::new(),
            errors: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }
}

// ============================================================================
// Queue store types
// ============================================================================

/// Per-queue counts by lifecycle bucket.
///
/// Completed/failed lists can be unbounded, so they are reported but never
/// counted (always zero).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub active: u64,
    pub waiting: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.active + self.waiting + self.delayed
    }
}

/// Snapshot of the queue store's bucketed state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    pub connected: bool,
    /// BTreeMap so serialized output has a stable queue order
    pub queues: BTreeMap<String, QueueCounts>,
    pub total_jobs: u64,
    /// Total number of matching keys observed, for operator context
    pub redis_keys: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueStatus {
    /// Degraded snapshot used whenever the store is unreachable.
    pub fn disconnected(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Metadata stored under `crawl:{uuid}` plus the most recent completion
/// observed in the job's ordered completion set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlMeta {
    #[serde(rename = "originUrl")]
    pub origin_url: Option<String>,
    /// Creation time in epoch milliseconds, as the store records it
    #[serde(rename = "createdAt")]
    pub created_at_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_at_ms: Option<i64>,
}

// ============================================================================
// Health probe types
// ============================================================================

/// Outcome category of a health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Timeout,
    Error,
}

/// Result of a single health probe against the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub status: HealthStatus,
    pub status_code: u16,
    pub response_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl HealthResult {
    /// Generic probe failure, reported as a server-side error on the wire.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            status_code: 500,
            response_time_ms: 0.0,
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Combined liveness + capability verdict from the full health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullHealthReport {
    /// "healthy" iff both probes pass, otherwise "degraded"
    pub overall_status: String,
    pub health_endpoint: HealthResult,
    /// Synthetic scrape against a known-good public page
    pub scrape_endpoint: HealthResult,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Derived metrics
// ============================================================================

/// Per-job derived metrics, recomputed on every read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    pub throughput_per_minute: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    pub progress_percentage: f64,
    pub success_rate: f64,
}

/// Aggregate counts and rates across registry jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_jobs: u64,
    pub active_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub success_rate: f64,
}
