//! Queue Reader
//!
//! Reads the Bull-style queue store: bucketed pending counts per queue,
//! crawl job entities, per-crawl metadata, and the emergency queue wipe.
//! The store being down is an expected condition for a monitoring tool, so
//! every operation degrades to an empty result instead of failing.

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::types::{CrawlMeta, QueueCounts, QueueStatus};

/// Lifecycle bucket of a queue key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Active,
    Waiting,
    Delayed,
    Completed,
    Failed,
}

impl Bucket {
    fn from_segment(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "waiting" => Some(Self::Waiting),
            "delayed" => Some(Self::Delayed),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Active/waiting/delayed lists are short and worth counting;
    /// completed/failed lists can be unbounded.
    pub fn is_counted(&self) -> bool {
        matches!(self, Self::Active | Self::Waiting | Self::Delayed)
    }
}

/// Parse `{prefix}:{queue}:{bucket}` into its queue name and bucket.
pub fn parse_bucket_key(key: &str, prefix: &str) -> Option<(String, Bucket)> {
    let rest = key.strip_prefix(prefix)?.strip_prefix(':')?;
    let (queue_name, bucket_segment) = rest.rsplit_once(':')?;
    if queue_name.is_empty() {
        return None;
    }
    let bucket = Bucket::from_segment(bucket_segment)?;
    Some((queue_name.to_string(), bucket))
}

/// Parse `{prefix}:{uuid}` into the crawl job id. Keys with further colon
/// segments are sub-keys, not job entities.
pub fn parse_crawl_key(key: &str, prefix: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?.strip_prefix(':')?;
    if rest.contains(':') {
        return None;
    }
    Uuid::parse_str(rest).ok()?;
    Some(rest.to_string())
}

/// Fold measured bucket lengths into a per-queue summary.
pub fn build_summary(entries: &[(String, Bucket, u64)]) -> (std::collections::BTreeMap<String, QueueCounts>, u64) {
    let mut queues = std::collections::BTreeMap::<String, QueueCounts>::new();
    let mut total = 0u64;
    for (queue_name, bucket, len) in entries {
        let counts = queues.entry(queue_name.clone()).or_default();
        match bucket {
            Bucket::Active => counts.active = *len,
            Bucket::Waiting => counts.waiting = *len,
            Bucket::Delayed => counts.delayed = *len,
            Bucket::Completed | Bucket::Failed => {}
        }
        if bucket.is_counted() {
            total += len;
        }
    }
    (queues, total)
}

/// Client for the queue store with a lazily established, cached connection.
pub struct QueueReader {
    config: QueueConfig,
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl QueueReader {
    pub fn new(config: QueueConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            config,
            client,
            conn: Mutex::new(None),
        })
    }

    /// Get the cached connection, establishing it if needed.
    async fn connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_tokio_connection().await?;
        debug!(url = %self.config.url, "connected to queue store");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection after a command failure so the next call
    /// reconnects from scratch.
    async fn invalidate(&self) {
        *self.conn.lock().await = None;
    }

    /// Bucketed queue counts. Never fails; a down store yields
    /// `connected: false` with the error recorded.
    pub async fn queue_status(&self) -> QueueStatus {
        match self.try_queue_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "queue store unavailable");
                self.invalidate().await;
                QueueStatus::disconnected(e.to_string())
            }
        }
    }

    async fn try_queue_status(&self) -> Result<QueueStatus, redis::RedisError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", self.config.bull_prefix);
        let keys: Vec<String> = conn.keys(pattern).await?;

        let mut entries = Vec::new();
        for key in &keys {
            if let Some((queue_name, bucket)) = parse_bucket_key(key, &self.config.bull_prefix) {
                let len = if bucket.is_counted() {
                    conn.llen(key).await?
                } else {
                    0
                };
                entries.push((queue_name, bucket, len));
            }
        }

        let (queues, total_jobs) = build_summary(&entries);
        Ok(QueueStatus {
            connected: true,
            queues,
            total_jobs,
            redis_keys: keys.len() as u64,
            error: None,
        })
    }

    /// Ids of externally tracked crawl jobs (`crawl:{uuid}` entity keys).
    /// Empty when the store is down.
    pub async fn list_crawl_ids(&self) -> Vec<String> {
        match self.try_list_crawl_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to list crawl jobs from queue store");
                self.invalidate().await;
                Vec::new()
            }
        }
    }

    async fn try_list_crawl_ids(&self) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", self.config.crawl_prefix);
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys
            .iter()
            .filter_map(|k| parse_crawl_key(k, &self.config.crawl_prefix))
            .collect())
    }

    /// One call producing both views of the store: the bucketed summary and
    /// the crawl-entity ids.
    pub async fn list_queue_jobs(&self) -> (QueueStatus, Vec<String>) {
        let status = self.queue_status().await;
        let ids = if status.connected {
            self.list_crawl_ids().await
        } else {
            Vec::new()
        };
        (status, ids)
    }

    /// Metadata blob for one crawl job plus its most recent completion from
    /// the ordered completion set.
    pub async fn crawl_meta(&self, job_id: &str) -> Option<CrawlMeta> {
        match self.try_crawl_meta(job_id).await {
            Ok(meta) => meta,
            Err(e) => {
                debug!(job_id, error = %e, "failed to read crawl metadata");
                self.invalidate().await;
                None
            }
        }
    }

    async fn try_crawl_meta(&self, job_id: &str) -> Result<Option<CrawlMeta>, redis::RedisError> {
        let mut conn = self.connection().await?;
        let key = format!("{}:{}", self.config.crawl_prefix, job_id);
        let blob: Option<String> = conn.get(&key).await?;
        let Some(blob) = blob else {
            return Ok(None);
        };

        let mut meta: CrawlMeta = serde_json::from_str(&blob).unwrap_or_default();

        // Last element of the sorted set is the most recent completion
        // (member = unit id, score = completion timestamp in ms).
        let done_key = format!("{}:{}:jobs_donez_ordered", self.config.crawl_prefix, job_id);
        let last: Vec<(String, f64)> = conn.zrange_withscores(&done_key, -1, -1).await?;
        if let Some((member, score)) = last.into_iter().next() {
            meta.last_completed_url = Some(member);
            meta.last_completed_at_ms = Some(score as i64);
        }

        Ok(Some(meta))
    }

    /// Emergency wipe of every queue bucket key. Returns the deleted keys.
    pub async fn clear_queues(&self) -> Result<Vec<String>, redis::RedisError> {
        let result = self.try_clear_queues().await;
        if result.is_err() {
            self.invalidate().await;
        }
        result
    }

    async fn try_clear_queues(&self) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", self.config.bull_prefix);
        let keys: Vec<String> = conn.keys(pattern).await?;
        for key in &keys {
            let _: () = conn.del(key).await?;
        }
        if !keys.is_empty() {
            warn!(deleted = keys.len(), "cleared queue store keys");
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_key_parsing() {
        assert_eq!(
            parse_bucket_key("bull:email:active", "bull"),
            Some(("email".to_string(), Bucket::Active))
        );
        assert_eq!(
            parse_bucket_key("bull:scrape-queue:waiting", "bull"),
            Some(("scrape-queue".to_string(), Bucket::Waiting))
        );
        // Unrecognized bucket segments are not queue buckets
        assert_eq!(parse_bucket_key("bull:email:id:lock", "bull"), None);
        assert_eq!(parse_bucket_key("bull:email", "bull"), None);
        assert_eq!(parse_bucket_key("other:email:active", "bull"), None);
    }

    #[test]
    fn crawl_key_parsing_requires_bare_uuid() {
        let id = "8f2ba06c-26e6-4610-a503-ab427e1c9a4d";
        assert_eq!(parse_crawl_key(&format!("crawl:{id}"), "crawl"), Some(id.to_string()));
        // Sub-keys are queue internals, not job entities
        assert_eq!(parse_crawl_key(&format!("crawl:{id}:jobs_donez_ordered"), "crawl"), None);
        assert_eq!(parse_crawl_key("crawl:not-a-uuid", "crawl"), None);
        assert_eq!(parse_crawl_key("bull:email:active", "crawl"), None);
    }

    #[test]
    fn summary_counts_only_countable_buckets() {
        let entries = vec![
            ("email".to_string(), Bucket::Active, 3),
            ("email".to_string(), Bucket::Waiting, 5),
            ("email".to_string(), Bucket::Completed, 0),
            ("scrape".to_string(), Bucket::Delayed, 2),
        ];
        let (queues, total) = build_summary(&entries);
        assert_eq!(total, 10);
        let email = &queues["email"];
        assert_eq!(
            *email,
            QueueCounts { active: 3, waiting: 5, delayed: 0, completed: 0, failed: 0 }
        );
        assert_eq!(queues["scrape"].delayed, 2);
    }

    #[test]
    fn disconnected_status_is_zeroed_with_error() {
        let status = QueueStatus::disconnected("connection refused");
        assert!(!status.connected);
        assert_eq!(status.total_jobs, 0);
        assert!(status.queues.is_empty());
        assert_eq!(status.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn operations_degrade_when_store_is_down() {
        // Nothing listens on this port; every call must degrade, not fail.
        let config = QueueConfig {
            url: "redis://127.0.0.1:1/0".to_string(),
            ..Default::default()
        };
        let reader = QueueReader::new(config).unwrap();

        let status = reader.queue_status().await;
        assert!(!status.connected);
        assert!(status.error.is_some());

        assert!(reader.list_crawl_ids().await.is_empty());
        assert!(reader.crawl_meta("8f2ba06c-26e6-4610-a503-ab427e1c9a4d").await.is_none());

        let (status, ids) = reader.list_queue_jobs().await;
        assert!(!status.connected);
        assert!(ids.is_empty());
    }
}
