//! API gateway binary.
//!
//! Runs a single-node HAC devnet and exposes a small HTTP API on top of
//! the `hac-chain` crate:
//!
//! - `GET /health`
//! - `POST /txs`
//! - `GET /accounts/{id}`
//! - `GET /validators`
//!
//! It embeds a `ConsensusEngine` over the configured store backend, a
//! background block producer loop, and a Prometheus metrics exporter on
//! `/metrics`.

mod config;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::ApiConfig;
use hac_chain::{
    ChainConfig, ConsensusEngine, HacApp, MetricsRegistry, StateDB, run_prometheus_http_server,
};
use routes::{health, query, txs};
use state::{AppState, SharedState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hac_gateway=info,hac_chain=info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let api_cfg = ApiConfig::from_env()?;
    let chain_cfg = match &api_cfg.chain_config {
        Some(path) => ChainConfig::load(path).map_err(|e| e.to_string())?,
        None => ChainConfig::default(),
    };

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if chain_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = chain_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                error!("metrics HTTP server error: {e}");
            }
        });
        info!("metrics exporter listening on http://{}/metrics", addr);
    }

    let listener = tokio::net::TcpListener::bind(api_cfg.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", api_cfg.listen_addr))?;

    // ---------------------------
    // Storage + application + engine
    // ---------------------------

    // The oracle client blocks, so it is built and used off the async workers.
    let engine = {
        let cfg = chain_cfg.clone();
        let metrics = metrics.as_ref().clone();
        tokio::task::spawn_blocking(move || build_engine(&cfg, metrics))
            .await
            .map_err(|e| format!("engine setup task failed: {e}"))??
    };

    // ---------------------------
    // Block producer loop
    // ---------------------------

    let interval = Duration::from_millis(chain_cfg.consensus.block_time_ms.max(1));
    let producer = tokio::spawn(run_block_producer(engine.clone(), interval));

    // ---------------------------
    // HTTP router
    // ---------------------------

    let app_state: SharedState = Arc::new(AppState {
        engine: engine.clone(),
        chain_id: chain_cfg.app.chain_id.clone(),
    });

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/txs", post(txs::submit_tx))
        .route("/accounts/{id}", get(query::account))
        .route("/validators", get(query::validators))
        .with_state(app_state);

    info!("API gateway listening on http://{}", api_cfg.listen_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("API server error: {e}"));

    producer.abort();
    let _ = producer.await;
    // Last reference goes away on a blocking thread with the oracle client.
    let _ = tokio::task::spawn_blocking(move || drop(engine)).await;

    served
}

/// Opens the store, connects the oracle and runs genesis when the store
/// is empty.
fn build_engine(
    cfg: &ChainConfig,
    metrics: MetricsRegistry,
) -> Result<Arc<ConsensusEngine>, String> {
    let backend = cfg.open_backend().map_err(|e| {
        format!(
            "failed to open store at {}: {e}",
            cfg.resolved_storage().path
        )
    })?;
    let db = StateDB::open(backend).map_err(|e| format!("failed to load state: {e}"))?;
    let oracle = cfg
        .oracle
        .build(Some(metrics.clone()))
        .map_err(|e| format!("failed to create oracle client: {e}"))?;

    let app = HacApp::new(db, oracle).with_metrics(metrics);
    let engine = ConsensusEngine::new(cfg.consensus.clone(), Arc::new(app));
    if engine
        .ensure_genesis(&cfg.app.init_chain_request())
        .map_err(|e| format!("genesis failed: {e}"))?
    {
        info!(
            chain_id = %cfg.app.chain_id,
            validators = cfg.app.genesis.len(),
            "genesis applied"
        );
    }
    Ok(Arc::new(engine))
}

/// Background block producer loop.
///
/// Periodically asks the engine to produce and commit the next block from
/// its mempool.
async fn run_block_producer(engine: Arc<ConsensusEngine>, interval: Duration) {
    info!(interval_ms = interval.as_millis() as u64, "block producer running");

    loop {
        let tick = engine.clone();
        match tokio::task::spawn_blocking(move || tick.produce_block()).await {
            Ok(Ok(Some(block))) => {
                info!(
                    height = block.height,
                    txs = block.tx_results.len(),
                    vote_code = block.vote_code,
                    app_hash = %block.app_hash,
                    "committed block"
                );
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!("failed to produce block: {e}"),
            Err(e) => error!("block producer task failed: {e}"),
        }

        tokio::time::sleep(interval).await;
    }
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown signal received");
}
