//! Metrics and instrumentation for the application.
//!
//! Prometheus-compatible metrics for block execution and the agent oracle,
//! plus a small HTTP exporter that serves `/metrics` in Prometheus text
//! format.
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use hac_chain::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "127.0.0.1:9898".parse()?;
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
//!
//! registry.app.block_execution_seconds.observe(duration_secs);
//! ```

pub mod prometheus;

pub use prometheus::{AppMetrics, MetricsRegistry, run_prometheus_http_server};
