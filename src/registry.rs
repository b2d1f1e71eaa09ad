//! Job Registry
//!
//! The authoritative in-process store of locally initiated jobs. Records are
//! created here, mutated only through `transition`, and live until process
//! restart. This is the only mutable shared state in the core.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::types::{JobError, JobId, JobRecord, JobSource, JobStatus, JobType};

/// Errors surfaced by registry operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Field updates applied together with a status transition.
///
/// Everything is optional; absent fields are left untouched. Counts are
/// applied verbatim; the registry deliberately does not enforce
/// `completed + failed <= total` (a retried unit may double-count).
#[derive(Debug, Default, Clone)]
pub struct TransitionUpdate {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_urls: Option<u64>,
    pub failed_urls: Option<u64>,
    pub current_url: Option<Option<String>>,
    pub push_error: Option<JobError>,
}

/// In-process job store with a monotonic id counter.
pub struct JobRegistry {
    jobs: DashMap<JobId, JobRecord>,
    counter: AtomicU64,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// Create a new WAITING job from a non-empty URL list.
    pub fn create(&self, job_type: JobType, urls: Vec<String>) -> Result<JobRecord, RegistryError> {
        if urls.is_empty() {
            return Err(RegistryError::InvalidInput("no URLs provided".to_string()));
        }

        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let job_id = format!("dashboard_{}_{}", n, Utc::now().timestamp());

        let mut record = JobRecord::new(job_id.clone(), JobSource::Registry);
        record.status = JobStatus::Waiting;
        record.job_type = job_type;
        record.created_at = Some(Utc::now());
        record.total_urls = urls.len() as u64;
        record.urls = urls;

        debug!(job_id = %job_id, "created job");
        self.jobs.insert(job_id, record.clone());
        Ok(record)
    }

    /// Fetch a copy of a job record.
    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.get(job_id).map(|r| r.clone())
    }

    /// Copies of all tracked jobs.
    pub fn list_all(&self) -> Vec<JobRecord> {
        self.jobs.iter().map(|r| r.clone()).collect()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// Apply a status transition plus field updates atomically.
    ///
    /// Transitions out of a terminal state always fail. The caller supplies
    /// the transition timestamps it wants set; cancellation additionally
    /// stamps `completed_at` when the job was running.
    pub fn transition(
        &self,
        job_id: &str,
        new_status: JobStatus,
        update: TransitionUpdate,
    ) -> Result<JobRecord, RegistryError> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;

        let from = entry.status;
        if !valid_transition(from, new_status) {
            return Err(RegistryError::InvalidTransition { from, to: new_status });
        }

        entry.status = new_status;
        if let Some(t) = update.started_at {
            entry.started_at = Some(t);
        }
        if let Some(t) = update.completed_at {
            entry.completed_at = Some(t);
        }
        if let Some(t) = update.cancelled_at {
            entry.cancelled_at = Some(t);
        }
        if let Some(n) = update.completed_urls {
            entry.completed_urls = n;
        }
        if let Some(n) = update.failed_urls {
            entry.failed_urls = n;
        }
        if let Some(u) = update.current_url {
            entry.current_url = u;
        }
        if let Some(e) = update.push_error {
            entry.errors.push(e);
        }

        if new_status == JobStatus::Cancelled {
            let now = Utc::now();
            if entry.cancelled_at.is_none() {
                entry.cancelled_at = Some(now);
            }
            // A running job's lifetime ends at cancellation
            if from == JobStatus::Running && entry.completed_at.is_none() {
                entry.completed_at = Some(now);
            }
        }

        debug!(job_id = %job_id, from = %from, to = %new_status, "job transition");
        Ok(entry.clone())
    }

    /// Record unit progress without changing status.
    ///
    /// Used by the worker between unit completions; bumps `last_activity`.
    pub fn record_progress(
        &self,
        job_id: &str,
        completed_urls: u64,
        failed_urls: u64,
        current_url: Option<String>,
        error: Option<JobError>,
    ) -> Result<(), RegistryError> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;
        entry.completed_urls = completed_urls;
        entry.failed_urls = failed_urls;
        entry.current_url = current_url;
        entry.last_activity = Some(Utc::now());
        if let Some(e) = error {
            entry.errors.push(e);
        }
        Ok(())
    }
}

/// The registry state machine.
fn valid_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    match (from, to) {
        (Waiting, Running) => true,
        (Waiting, Cancelled) => true,
        (Running, Completed) => true,
        (Running, CompletedWithErrors) => true,
        (Running, Failed) => true,
        (Running, Cancelled) => true,
        _ => false,
    }
}
