//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the application metrics, and an async HTTP exporter that
//! serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    HeaderMap, Method, Request, Response, StatusCode, body::Incoming, header,
    header::HeaderValue, server::conn::http1, service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, warn};

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Block-execution metrics.
///
/// Registered into a [`Registry`] and updated by the application driver
/// and the oracle client.
#[derive(Clone)]
pub struct AppMetrics {
    /// Time to finalize a block, in seconds.
    pub block_execution_seconds: Histogram,
    /// Latency of a single oracle request, in seconds.
    pub oracle_seconds: Histogram,
    /// Transactions refused by CheckTx or dropped while preparing.
    pub txs_rejected: IntCounter,
    /// Proposed blocks rejected by ProcessProposal.
    pub blocks_rejected: IntCounter,
    /// Last committed height.
    pub committed_height: IntGauge,
}

impl AppMetrics {
    /// Registers application metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let block_execution_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "app_block_execution_seconds",
                "Time to execute and finalize a block in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(block_execution_seconds.clone()))?;

        let oracle_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "app_oracle_seconds",
                "Latency of agent oracle requests in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
        )?;
        registry.register(Box::new(oracle_seconds.clone()))?;

        let txs_rejected = IntCounter::with_opts(Opts::new(
            "app_txs_rejected",
            "Total number of transactions rejected by admission or preparation",
        ))?;
        registry.register(Box::new(txs_rejected.clone()))?;

        let blocks_rejected = IntCounter::with_opts(Opts::new(
            "app_blocks_rejected",
            "Total number of proposed blocks rejected during verification",
        ))?;
        registry.register(Box::new(blocks_rejected.clone()))?;

        let committed_height = IntGauge::with_opts(Opts::new(
            "app_committed_height",
            "Height of the last committed block",
        ))?;
        registry.register(Box::new(committed_height.clone()))?;

        Ok(Self {
            block_execution_seconds,
            oracle_seconds,
            txs_rejected,
            blocks_rejected,
            committed_height,
        })
    }
}

/// Wrapper around a Prometheus registry and the application metrics.
///
/// Cheap to clone; every clone updates the same underlying collectors.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub app: AppMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("hac".to_string()), None)?;
        let app = AppMetrics::register(&registry)?;
        Ok(Self { registry, app })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// Serves `GET /metrics` with the Prometheus text exposition format. All
/// other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(error = %err, "prometheus HTTP connection error");
            }
        });
    }
}

fn respond(status: StatusCode, headers: HeaderMap, body: String) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            Ok(respond(StatusCode::OK, headers, metrics.gather_text()))
        }
        _ => Ok(respond(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            "not found".to_string(),
        )),
    }
}
