//! Job Reconciler
//!
//! Merges the three independently collected job views (registry, queue
//! store, remote API) into one deduplicated collection, classifies each
//! record as active or terminal, and bounds the output for display. This
//! module is pure; the async collection lives in the service layer.

use std::collections::HashMap;

use serde_json::Value;

use crate::types::{
    JobRecord, JobSource, JobStatus, JobType, QueueStatus, QUEUE_MONITOR_JOB_ID,
};

/// Everything the reconciler needs, gathered by the service layer.
///
/// A collector that failed contributes an empty collection and an entry in
/// `errors`; reconciliation itself never fails.
#[derive(Debug, Default)]
pub struct ReconcileInput {
    pub registry: Vec<JobRecord>,
    pub queue_status: QueueStatus,
    /// Crawl-entity ids observed in the queue store
    pub queue_ids: Vec<String>,
    /// Records fetched from the remote API for queue-discovered ids
    pub remote: Vec<JobRecord>,
    /// Collector failures, recorded but not raised
    pub errors: Vec<String>,
}

/// Per-source record counts in the merged output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SourceCounts {
    pub registry: usize,
    pub queue: usize,
    pub remote: usize,
}

/// The merged, partitioned, display-bounded view.
#[derive(Debug, Default)]
pub struct ReconciledJobs {
    pub active: Vec<JobRecord>,
    pub terminal: Vec<JobRecord>,
    /// Untruncated partition sizes
    pub active_total: usize,
    pub terminal_total: usize,
    pub counts: SourceCounts,
    pub errors: Vec<String>,
}

/// Merge, classify, sort, and truncate.
pub fn reconcile(input: ReconcileInput, display_limit: usize) -> ReconciledJobs {
    let mut merged: HashMap<String, JobRecord> = HashMap::new();

    // 1. Registry records are authoritative.
    for record in input.registry {
        merged.insert(record.job_id.clone(), record);
    }

    // 2. Remote-enriched records for ids the registry does not know.
    for record in input.remote {
        merged.entry(record.job_id.clone()).or_insert(record);
    }

    // 3. Queue-discovered ids with no richer record get a minimal entry;
    //    the store tracks these as live crawl entities.
    for id in input.queue_ids {
        merged.entry(id.clone()).or_insert_with(|| {
            let mut record = JobRecord::new(id, JobSource::Queue);
            record.status = JobStatus::Active;
            record.job_type = JobType::Crawl;
            record
        });
    }

    // 4. Queue pressure shows up as one synthetic aggregate record so
    //    backlog is visible even without per-item detail.
    if input.queue_status.connected && input.queue_status.total_jobs > 0 {
        let mut record = JobRecord::new(QUEUE_MONITOR_JOB_ID, JobSource::Queue);
        record.status = JobStatus::Active;
        record.job_type = JobType::QueueSummary;
        record.total_urls = input.queue_status.total_jobs;
        record.metadata.insert(
            "queue_summary".to_string(),
            serde_json::to_value(&input.queue_status.queues).unwrap_or(Value::Null),
        );
        merged.insert(record.job_id.clone(), record);
    }

    let mut counts = SourceCounts::default();
    for record in merged.values() {
        match record.source {
            JobSource::Registry => counts.registry += 1,
            JobSource::Queue => counts.queue += 1,
            JobSource::Remote => counts.remote += 1,
        }
    }

    // Partition, newest first; records without a creation time sort oldest.
    let (mut active, mut terminal): (Vec<JobRecord>, Vec<JobRecord>) =
        merged.into_values().partition(|r| r.status.is_active());
    active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.job_id.cmp(&b.job_id)));
    terminal.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.job_id.cmp(&b.job_id)));

    let active_total = active.len();
    let terminal_total = terminal.len();
    active.truncate(display_limit);
    terminal.truncate(display_limit);

    ReconciledJobs {
        active,
        terminal,
        active_total,
        terminal_total,
        counts,
        errors: input.errors,
    }
}
