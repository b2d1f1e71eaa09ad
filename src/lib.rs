//! ScrapeWatch: Monitoring and Control Dashboard for a Scraping Service
//!
//! Watches a self-hosted scraping service and its Redis-backed work queue,
//! featuring:
//! - Job orchestration with cooperative cancellation
//! - Three-source job reconciliation (local registry, queue store, remote API)
//! - Derived progress metrics (throughput, ETA, success rates)
//! - Queue store inspection with bucketed pending counts
//! - Two-tier health probing of the remote service
//! - REST API for the browser frontend

pub mod config;
pub mod http;
pub mod metrics;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod remote;
pub mod service;
pub mod types;
pub mod worker;

pub use config::Config;
pub use service::Dashboard;
pub use types::*;
