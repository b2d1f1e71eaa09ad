//! Metrics Deriver
//!
//! Computes per-job progress/throughput/ETA figures and registry-wide
//! aggregates. Everything here is a pure function of a record and a clock
//! reading; nothing is persisted.

use chrono::{DateTime, Duration, Utc};

use crate::types::{AggregateMetrics, JobMetrics, JobRecord, JobStatus};

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Derive per-job metrics as of `now`.
pub fn derive_job_metrics(job: &JobRecord, now: DateTime<Utc>) -> JobMetrics {
    let elapsed_seconds = elapsed_seconds(job, now);

    let throughput_per_minute = match elapsed_seconds {
        Some(secs) if secs > 0.0 && job.completed_urls > 0 => {
            round2(job.completed_urls as f64 / secs * 60.0)
        }
        _ => 0.0,
    };

    let estimated_completion = if job.status.is_active() && throughput_per_minute > 0.0 {
        let remaining = job.total_urls.saturating_sub(job.completed_urls);
        if remaining > 0 {
            let eta_seconds = remaining as f64 / (throughput_per_minute / 60.0);
            Some(now + Duration::milliseconds((eta_seconds * 1000.0) as i64))
        } else {
            None
        }
    } else {
        None
    };

    // Denominator floor of 1: a zero-URL job reports 0%, not 100%
    let progress_percentage =
        round1(job.completed_urls as f64 / (job.total_urls.max(1)) as f64 * 100.0);

    let attempts = job.completed_urls + job.errors.len() as u64;
    let success_rate = round1(job.completed_urls as f64 / attempts.max(1) as f64 * 100.0);

    JobMetrics {
        elapsed_seconds,
        throughput_per_minute,
        estimated_completion,
        progress_percentage,
        success_rate,
    }
}

/// Elapsed processing time: live span for active jobs, final span for
/// terminal jobs, undefined without a start timestamp.
fn elapsed_seconds(job: &JobRecord, now: DateTime<Utc>) -> Option<f64> {
    let started = job.started_at?;
    if job.status.is_active() {
        Some((now - started).num_milliseconds() as f64 / 1000.0)
    } else {
        let completed = job.completed_at?;
        Some((completed - started).num_milliseconds() as f64 / 1000.0)
    }
}

/// Aggregate counts and the overall success rate across registry jobs.
pub fn derive_aggregate_metrics(jobs: &[JobRecord]) -> AggregateMetrics {
    let total_jobs = jobs.len() as u64;
    let completed_jobs = jobs
        .iter()
        .filter(|j| matches!(j.status, JobStatus::Completed | JobStatus::CompletedWithErrors))
        .count() as u64;
    let failed_jobs = jobs.iter().filter(|j| j.status == JobStatus::Failed).count() as u64;
    let active_jobs = jobs.iter().filter(|j| j.status.is_active()).count() as u64;

    let success_rate = if total_jobs > 0 {
        round1(completed_jobs as f64 / total_jobs as f64 * 100.0)
    } else {
        0.0
    };

    AggregateMetrics {
        total_jobs,
        active_jobs,
        completed_jobs,
        failed_jobs,
        success_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobError, JobSource, JobType};

    fn job(status: JobStatus) -> JobRecord {
        let mut j = JobRecord::new("test_1", JobSource::Registry);
        j.status = status;
        j.job_type = JobType::Scrape;
        j
    }

    #[test]
    fn fresh_job_has_zero_progress_and_zero_success_rate() {
        let mut j = job(JobStatus::Waiting);
        j.total_urls = 4;
        let m = derive_job_metrics(&j, Utc::now());
        assert_eq!(m.progress_percentage, 0.0);
        // 0 completed, 0 errors must be 0.0, not NaN
        assert_eq!(m.success_rate, 0.0);
        assert_eq!(m.throughput_per_minute, 0.0);
        assert!(m.elapsed_seconds.is_none());
        assert!(m.estimated_completion.is_none());
    }

    #[test]
    fn zero_url_job_reports_zero_percent() {
        let j = job(JobStatus::Waiting);
        let m = derive_job_metrics(&j, Utc::now());
        assert_eq!(m.progress_percentage, 0.0);
    }

    #[test]
    fn active_elapsed_uses_now() {
        let now = Utc::now();
        let mut j = job(JobStatus::Running);
        j.started_at = Some(now - Duration::seconds(90));
        let m = derive_job_metrics(&j, now);
        assert_eq!(m.elapsed_seconds, Some(90.0));
    }

    #[test]
    fn terminal_elapsed_uses_completion_span() {
        let now = Utc::now();
        let mut j = job(JobStatus::Completed);
        j.started_at = Some(now - Duration::seconds(300));
        j.completed_at = Some(now - Duration::seconds(180));
        let m = derive_job_metrics(&j, now);
        assert_eq!(m.elapsed_seconds, Some(120.0));
    }

    #[test]
    fn terminal_without_completed_at_has_no_elapsed() {
        let now = Utc::now();
        let mut j = job(JobStatus::Failed);
        j.started_at = Some(now - Duration::seconds(10));
        assert!(derive_job_metrics(&j, now).elapsed_seconds.is_none());
    }

    #[test]
    fn throughput_and_eta_for_running_job() {
        let now = Utc::now();
        let mut j = job(JobStatus::Running);
        j.started_at = Some(now - Duration::seconds(60));
        j.total_urls = 10;
        j.completed_urls = 5;
        let m = derive_job_metrics(&j, now);
        // 5 URLs over 60s = 5/min
        assert_eq!(m.throughput_per_minute, 5.0);
        let eta = m.estimated_completion.unwrap();
        // 5 remaining at 5/min: one minute out
        let delta = (eta - (now + Duration::seconds(60))).num_seconds().abs();
        assert!(delta <= 1, "eta off by {delta}s");
        assert_eq!(m.progress_percentage, 50.0);
    }

    #[test]
    fn no_eta_once_all_urls_are_done() {
        let now = Utc::now();
        let mut j = job(JobStatus::Running);
        j.started_at = Some(now - Duration::seconds(60));
        j.total_urls = 5;
        j.completed_urls = 5;
        let m = derive_job_metrics(&j, now);
        assert!(m.estimated_completion.is_none());
    }

    #[test]
    fn no_eta_for_terminal_job() {
        let now = Utc::now();
        let mut j = job(JobStatus::Completed);
        j.started_at = Some(now - Duration::seconds(60));
        j.completed_at = Some(now);
        j.total_urls = 10;
        j.completed_urls = 5;
        let m = derive_job_metrics(&j, now);
        assert!(m.estimated_completion.is_none());
    }

    #[test]
    fn success_rate_counts_errors_as_attempts() {
        let mut j = job(JobStatus::CompletedWithErrors);
        j.completed_urls = 3;
        j.errors.push(JobError::new(None, "boom"));
        let m = derive_job_metrics(&j, Utc::now());
        assert_eq!(m.success_rate, 75.0);
    }

    #[test]
    fn aggregate_over_empty_registry_is_zeroed() {
        let m = derive_aggregate_metrics(&[]);
        assert_eq!(m, AggregateMetrics::default());
    }

    #[test]
    fn aggregate_counts_and_rate() {
        let jobs = vec![
            job(JobStatus::Completed),
            job(JobStatus::CompletedWithErrors),
            job(JobStatus::Failed),
            job(JobStatus::Running),
        ];
        let m = derive_aggregate_metrics(&jobs);
        assert_eq!(m.total_jobs, 4);
        assert_eq!(m.completed_jobs, 2);
        assert_eq!(m.failed_jobs, 1);
        assert_eq!(m.active_jobs, 1);
        assert_eq!(m.success_rate, 50.0);
    }
}
