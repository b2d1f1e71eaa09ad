//! HTTP API Server Module
//!
//! Exposes the dashboard's query and control surface as a REST API for the
//! browser frontend.

pub mod handlers;
pub mod routes;
pub mod server;

pub use server::HttpServer;
