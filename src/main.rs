use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};

use ratewarden::config::RatewardenConfig;
use ratewarden::grpc::GrpcServer;
use ratewarden::metrics;
use ratewarden::ratelimit::{
    AdmissionCache, CounterStore, DecisionEngine, LimitTable, RedisCounterStore, UpdateBatcher,
};

/// Ratewarden - Distributed rate limiting decision service for Envoy Proxy
#[derive(Parser, Debug)]
#[command(name = "ratewarden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the service configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// gRPC server address
    #[arg(short = 'a', long = "addr")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Ratewarden Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration: compiled-in defaults, then the optional file,
    // then environment overrides.
    let mut config = match args.config {
        Some(ref path) => RatewardenConfig::from_file(path)?,
        None => RatewardenConfig::default(),
    };
    config.apply_env()?;

    // Override with CLI arguments
    if let Some(ref addr) = args.addr {
        config.server.grpc_addr = addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid gRPC address {}: {}", addr, e))?;
    }

    info!(
        grpc_addr = %config.server.grpc_addr,
        metrics_addr = %config.server.metrics_addr,
        window_secs = config.limits.window_secs,
        ip_limit = config.limits.ip,
        path_limit = config.limits.path,
        company_limit = config.limits.company,
        user_limit = config.limits.user,
        "Configuration loaded"
    );

    // Metrics exporter serves /metrics on its own listener.
    metrics::init(config.server.metrics_addr)?;

    // Connect to the Redis cluster and verify it is reachable before
    // accepting traffic.
    let store = Arc::new(RedisCounterStore::connect(&config.redis, config.limits.window()).await?);
    store.ping().await?;
    info!(
        endpoints = ?config.redis.cluster_addrs,
        "Connected to Redis cluster"
    );

    // Assemble the process-wide decision state.
    let cache = AdmissionCache::new(&config.cache, config.limits.window());
    let batcher = UpdateBatcher::spawn(Arc::clone(&store), &config.batcher);
    let limits = LimitTable::from(&config.limits);
    let engine = Arc::new(DecisionEngine::new(store, cache, limits, batcher));

    info!(
        workers = config.batcher.workers,
        queue_capacity = config.batcher.queue_capacity,
        "Update batcher started"
    );

    let grpc_server = GrpcServer::new(config.server.grpc_addr, engine);

    info!("Starting gRPC server on {}", config.server.grpc_addr);
    grpc_server
        .serve_with_shutdown(async {
            // SIGTERM from the orchestrator or Ctrl+C on a terminal.
            #[cfg(unix)]
            {
                let mut sigterm =
                    signal::unix::signal(signal::unix::SignalKind::terminate())
                        .expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");

            info!("Shutdown signal received, draining gRPC server");
        })
        .await?;

    info!("Ratewarden Rate Limiting Service stopped");
    Ok(())
}
