//! Remote Status Fetcher and scraping-service client
//!
//! Talks to the Firecrawl-compatible HTTP API: versioned status lookups with
//! fallback, liveness and capability probes, per-unit scrape/crawl calls,
//! and cancellation. The service has no dedicated health endpoint; liveness
//! is inferred from the root page banner.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::types::{
    FullHealthReport, HealthResult, HealthStatus, JobError, JobRecord, JobSource, JobStatus,
    JobType,
};

/// Banner substrings that identify a healthy service root page
const HEALTH_BANNERS: [&str; 2] = ["SCRAPERS", "Hello"];

/// Known-good public page used by the synthetic capability check
const HEALTH_TEST_URL: &str = "https://httpbin.org/html";

/// Crawl-status endpoint templates, newest API version first
const STATUS_ENDPOINTS: [&str; 4] = ["/v2/crawl", "/v1/crawl", "/v0/crawl", "/crawl"];

/// Errors from remote service calls
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("service reported failure: {0}")]
    Api(String),
}

/// Result of one successful scrape/crawl unit
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub url: String,
    pub duration_seconds: f64,
    /// Bytes of scraped content, or pages discovered for a crawl
    pub size: u64,
}

/// One page of a crawl's scraped output, as the service returns it. The
/// service pages with `skip`/`limit` and hands back a `next` link while
/// more pages remain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlDataPage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// Wire shape of a crawl-status payload. Only `status` is required; a body
/// without it is not recognized as a status payload.
#[derive(Debug, Deserialize)]
struct CrawlStatusPayload {
    status: String,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    completed: u64,
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    current_url: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

/// Client for the remote scraping/crawling service.
pub struct RemoteClient {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.has_api_key() {
            builder.bearer_auth(&self.config.api_key)
        } else {
            builder
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    // ------------------------------------------------------------------
    // Status lookup
    // ------------------------------------------------------------------

    /// Look up a job's status, walking endpoint versions newest-first.
    ///
    /// Any single attempt failing (timeout, transport, non-200, bad body)
    /// moves on to the next template; `None` means no template recognized
    /// the job.
    pub async fn fetch_status(&self, job_id: &str) -> Option<JobRecord> {
        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        for endpoint in STATUS_ENDPOINTS {
            let url = self.url(&format!("{endpoint}/{job_id}"));
            let response = self
                .authorize(self.http.get(&url))
                .timeout(timeout)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    debug!(job_id, endpoint, error = %e, "status attempt failed");
                    continue;
                }
            };
            if response.status() != reqwest::StatusCode::OK {
                continue;
            }
            let raw: Value = match response.json().await {
                Ok(v) => v,
                Err(_) => continue,
            };
            let payload: CrawlStatusPayload = match serde_json::from_value(raw.clone()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            debug!(job_id, endpoint, status = %payload.status, "remote job status");
            return Some(record_from_payload(job_id, payload, raw));
        }
        None
    }

    /// Fetch one page of a crawl's scraped data, walking endpoint versions
    /// newest-first.
    ///
    /// `Ok(None)` means every recognized attempt answered 404; the service
    /// expires crawl data, so the caller reports that distinctly. When no
    /// template answers at all, the last transport error surfaces.
    pub async fn fetch_job_data(
        &self,
        job_id: &str,
        skip: u64,
        limit: u64,
    ) -> Result<Option<CrawlDataPage>, RemoteError> {
        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let mut not_found = false;
        let mut last_error = None;
        for endpoint in STATUS_ENDPOINTS {
            let url = self.url(&format!("{endpoint}/{job_id}"));
            let response = self
                .authorize(self.http.get(&url).query(&[("skip", skip), ("limit", limit)]))
                .timeout(timeout)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    debug!(job_id, endpoint, error = %e, "data attempt failed");
                    last_error = Some(if e.is_timeout() {
                        RemoteError::Timeout(timeout)
                    } else {
                        RemoteError::Http(e)
                    });
                    continue;
                }
            };
            match response.status() {
                reqwest::StatusCode::OK => {
                    let mut page: CrawlDataPage = match response.json().await {
                        Ok(p) => p,
                        Err(e) => {
                            last_error = Some(RemoteError::Http(e));
                            continue;
                        }
                    };
                    // Older service versions omit has_more; the next link
                    // is authoritative either way.
                    if page.next.is_some() {
                        page.has_more = true;
                    }
                    debug!(job_id, endpoint, items = page.data.len(), "crawl data page");
                    return Ok(Some(page));
                }
                reqwest::StatusCode::NOT_FOUND => not_found = true,
                other => last_error = Some(RemoteError::Status(other.as_u16())),
            }
        }
        if not_found {
            return Ok(None);
        }
        Err(last_error.unwrap_or_else(|| RemoteError::Api("no endpoint recognized the job".to_string())))
    }

    // ------------------------------------------------------------------
    // Health probes
    // ------------------------------------------------------------------

    /// Fast liveness probe: GET the service root and match the banner.
    pub async fn probe_health(&self) -> HealthResult {
        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let start = Instant::now();
        let response = self
            .authorize(self.http.get(self.url("/")))
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let response_time_ms = elapsed_ms(start);
                if status_code == 200 && HEALTH_BANNERS.iter().any(|b| body.contains(b)) {
                    HealthResult {
                        status: HealthStatus::Healthy,
                        status_code,
                        response_time_ms,
                        timestamp: Utc::now(),
                        message: "service is responding".to_string(),
                    }
                } else {
                    HealthResult {
                        status: HealthStatus::Unhealthy,
                        status_code,
                        response_time_ms,
                        timestamp: Utc::now(),
                        message: format!("Unexpected response: {}", truncate(&body, 50)),
                    }
                }
            }
            Err(e) if e.is_timeout() => HealthResult {
                status: HealthStatus::Timeout,
                status_code: 408,
                response_time_ms: timeout.as_millis() as f64,
                timestamp: Utc::now(),
                message: "request timeout".to_string(),
            },
            Err(e) => HealthResult::error(e.to_string()),
        }
    }

    /// Full health check: liveness probe plus a synthetic scrape of a
    /// known-good public page. The scrape causes real work on the remote
    /// service; that is the point, it validates the whole request path.
    pub async fn probe_full_health(&self) -> FullHealthReport {
        let health_endpoint = self.probe_health().await;

        let timeout = Duration::from_secs(self.config.health_scrape_timeout_secs);
        let start = Instant::now();
        let body = serde_json::json!({
            "url": HEALTH_TEST_URL,
            "formats": ["markdown"],
        });
        let response = self
            .authorize(self.http.post(self.url("/v2/scrape")))
            .json(&body)
            .timeout(timeout)
            .send()
            .await;

        let scrape_endpoint = match response {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let response_time_ms = elapsed_ms(start);
                if status_code == 200 {
                    let success = response
                        .json::<Value>()
                        .await
                        .ok()
                        .and_then(|v| v.get("success").and_then(Value::as_bool))
                        .unwrap_or(false);
                    HealthResult {
                        status: if success { HealthStatus::Healthy } else { HealthStatus::Unhealthy },
                        status_code,
                        response_time_ms,
                        timestamp: Utc::now(),
                        message: if success {
                            "scrape test successful".to_string()
                        } else {
                            "scrape test failed".to_string()
                        },
                    }
                } else {
                    HealthResult {
                        status: HealthStatus::Unhealthy,
                        status_code,
                        response_time_ms,
                        timestamp: Utc::now(),
                        message: format!("HTTP {status_code}"),
                    }
                }
            }
            Err(e) if e.is_timeout() => HealthResult {
                status: HealthStatus::Timeout,
                status_code: 408,
                response_time_ms: timeout.as_millis() as f64,
                timestamp: Utc::now(),
                message: "request timeout".to_string(),
            },
            Err(e) => HealthResult::error(e.to_string()),
        };

        let overall = if health_endpoint.status == HealthStatus::Healthy
            && scrape_endpoint.status == HealthStatus::Healthy
        {
            "healthy"
        } else {
            "degraded"
        };

        FullHealthReport {
            overall_status: overall.to_string(),
            health_endpoint,
            scrape_endpoint,
            timestamp: Utc::now(),
        }
    }

    // ------------------------------------------------------------------
    // Unit processing
    // ------------------------------------------------------------------

    /// Scrape one URL through the service.
    pub async fn scrape_url(&self, url: &str) -> Result<UnitReport, RemoteError> {
        let timeout = Duration::from_secs(self.config.scrape_timeout_secs);
        let body = serde_json::json!({
            "url": url,
            "formats": self.config.formats,
        });
        let start = Instant::now();
        let data = self.post_unit("/v2/scrape", &body, timeout).await?;
        let size = data
            .get("data")
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .map(|c| c.len() as u64)
            .unwrap_or(0);
        Ok(UnitReport {
            url: url.to_string(),
            duration_seconds: start.elapsed().as_secs_f64(),
            size,
        })
    }

    /// Crawl one site (bounded by `limit` pages) through the service.
    pub async fn crawl_url(&self, url: &str, limit: u32) -> Result<UnitReport, RemoteError> {
        let timeout = Duration::from_secs(self.config.crawl_timeout_secs);
        let body = serde_json::json!({
            "url": url,
            "limit": limit,
            "scrapeOptions": { "formats": self.config.formats },
        });
        let start = Instant::now();
        let data = self.post_unit("/v2/crawl", &body, timeout).await?;
        let size = data
            .get("data")
            .and_then(Value::as_array)
            .map(|pages| pages.len() as u64)
            .unwrap_or(1);
        Ok(UnitReport {
            url: url.to_string(),
            duration_seconds: start.elapsed().as_secs_f64(),
            size,
        })
    }

    async fn post_unit(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, RemoteError> {
        let response = self
            .authorize(self.http.post(self.url(path)))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout(timeout)
                } else {
                    RemoteError::Http(e)
                }
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(RemoteError::Status(response.status().as_u16()));
        }
        let data: Value = response.json().await?;
        if !data.get("success").and_then(Value::as_bool).unwrap_or(false) {
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            return Err(RemoteError::Api(message));
        }
        Ok(data)
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Cancel a remote job, trying DELETE and then PATCH across endpoint
    /// versions. Returns true on the first acknowledged cancellation.
    pub async fn cancel_remote(&self, job_id: &str) -> bool {
        let timeout = Duration::from_secs(self.config.health_scrape_timeout_secs);
        for endpoint in STATUS_ENDPOINTS {
            let url = self.url(&format!("{endpoint}/{job_id}"));

            match self.authorize(self.http.delete(&url)).timeout(timeout).send().await {
                Ok(r) if r.status() == reqwest::StatusCode::OK => return true,
                Ok(r) if r.status() == reqwest::StatusCode::NOT_FOUND => continue,
                Ok(_) => {
                    // Some versions only support the PATCH form
                    let patched = self
                        .authorize(self.http.patch(&url))
                        .json(&serde_json::json!({ "status": "cancelled" }))
                        .timeout(timeout)
                        .send()
                        .await;
                    if let Ok(r) = patched {
                        if r.status() == reqwest::StatusCode::OK {
                            return true;
                        }
                    }
                }
                Err(e) => {
                    debug!(job_id, endpoint, error = %e, "cancel attempt failed");
                    continue;
                }
            }
        }
        warn!(job_id, "remote job could not be cancelled on any endpoint");
        false
    }
}

/// Convert a recognized status payload into a canonical remote-sourced
/// record, echoing the raw payload into metadata.
fn record_from_payload(job_id: &str, payload: CrawlStatusPayload, raw: Value) -> JobRecord {
    let mut record = JobRecord::new(job_id, JobSource::Remote);
    record.status = JobStatus::parse_lenient(&payload.status);
    record.job_type = JobType::Crawl;
    record.total_urls = payload.total;
    record.completed_urls = payload.completed;
    record.current_url = payload.current_url;
    record.created_at = payload.created_at.as_deref().and_then(parse_timestamp);
    record.last_activity = payload.updated_at.as_deref().and_then(parse_timestamp);
    record.errors = payload
        .errors
        .into_iter()
        .map(|e| {
            let message = match &e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            JobError::new(None, message)
        })
        .collect();
    if let Value::Object(map) = raw {
        record.metadata = map;
    }
    record
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_requires_status_field() {
        let raw = serde_json::json!({ "total": 5, "completed": 2 });
        assert!(serde_json::from_value::<CrawlStatusPayload>(raw).is_err());

        let raw = serde_json::json!({ "status": "scraping" });
        let p: CrawlStatusPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(p.status, "scraping");
        assert_eq!(p.total, 0);
    }

    #[test]
    fn record_from_payload_normalizes_fields() {
        let raw = serde_json::json!({
            "status": "scraping",
            "total": 10,
            "completed": 4,
            "current_url": "https://example.com/page",
            "errors": ["boom", {"url": "https://x.test"}],
            "updated_at": "2026-08-25T10:00:00Z",
        });
        let payload: CrawlStatusPayload = serde_json::from_value(raw.clone()).unwrap();
        let record = record_from_payload("abc", payload, raw);

        assert_eq!(record.job_id, "abc");
        assert_eq!(record.source, JobSource::Remote);
        assert_eq!(record.job_type, JobType::Crawl);
        assert_eq!(record.status, JobStatus::Scraping);
        assert_eq!(record.total_urls, 10);
        assert_eq!(record.completed_urls, 4);
        assert_eq!(record.current_url.as_deref(), Some("https://example.com/page"));
        assert_eq!(record.errors.len(), 2);
        assert_eq!(record.errors[0].message, "boom");
        assert!(record.last_activity.is_some());
        // Raw payload is echoed for display
        assert_eq!(record.metadata.get("total").and_then(Value::as_u64), Some(10));
    }

    #[test]
    fn unknown_remote_status_is_lenient() {
        let raw = serde_json::json!({ "status": "weird-new-state" });
        let payload: CrawlStatusPayload = serde_json::from_value(raw.clone()).unwrap();
        let record = record_from_payload("abc", payload, raw);
        assert_eq!(record.status, JobStatus::Unknown);
    }

    #[test]
    fn data_page_fields_all_default() {
        let p: CrawlDataPage = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(p.data.is_empty());
        assert!(p.next.is_none());
        assert!(!p.has_more);

        let p: CrawlDataPage = serde_json::from_value(serde_json::json!({
            "status": "completed",
            "data": [{ "markdown": "# hi" }],
            "next": "https://svc.test/v1/crawl/abc?skip=10",
        }))
        .unwrap();
        assert_eq!(p.data.len(), 1);
        assert!(p.next.is_some());
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("short", 50), "short");
        let long = "x".repeat(80);
        let t = truncate(&long, 50);
        assert_eq!(t.len(), 53);
        assert!(t.ends_with("..."));
    }
}
