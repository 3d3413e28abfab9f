// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::{http::StatusCode, routing::get, Router};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::{self, store::Writer};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use nc_failover::cloud::FailoverCloud;
use nc_failover::config::CloudConfig;
use nc_failover::constants::{
    CLOUD_CONFIG_ENV, DEFAULT_NODE_MONITOR_SECS, DEFAULT_SERVICE_RESYNC_SECS,
    METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH, METRICS_SERVER_PORT, TOKIO_WORKER_THREADS,
};
use nc_failover::context::{Context, Intervals};
use nc_failover::controllers;
use nc_failover::metrics::gather_metrics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Failover IP load balancer and node controller for netcup servers.
#[derive(Parser, Debug)]
#[command(name = "nc-failover", version, about, long_about = None)]
struct Args {
    /// Path of the cloud configuration file
    #[arg(long, env = CLOUD_CONFIG_ENV)]
    cloud_config: PathBuf,

    /// Port of the Prometheus metrics endpoint
    #[arg(long, default_value_t = METRICS_SERVER_PORT)]
    metrics_port: u16,

    /// Seconds between reconciliations of a healthy Service
    #[arg(long, default_value_t = DEFAULT_SERVICE_RESYNC_SECS)]
    service_resync_seconds: u64,

    /// Seconds between reconciliations of a Node
    #[arg(long, default_value_t = DEFAULT_NODE_MONITOR_SECS)]
    node_monitor_seconds: u64,
}

impl Args {
    fn intervals(&self) -> Intervals {
        Intervals {
            service_resync: Duration::from_secs(self.service_resync_seconds),
            node_monitor: Duration::from_secs(self.node_monitor_seconds),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("nc-failover")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

fn init_tracing() {
    // RUST_LOG selects the filter (default info), RUST_LOG_FORMAT=json switches to JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing();
    info!("Starting nc-failover controller");

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install the rustls crypto provider"))?;

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    let mut config = CloudConfig::from_path(&args.cloud_config)?;
    config
        .load_references(&client)
        .await
        .context("failed to load cloud configuration references")?;
    let config = config.validate()?;

    let cloud = FailoverCloud::from_config(client.clone(), config)?;

    let (nodes, writer) = reflector::store::<Node>();
    let ctx = Arc::new(Context {
        cloud,
        nodes,
        intervals: args.intervals(),
    });

    info!("Starting all controllers");

    tokio::select! {
        () = controllers::service::run(client.clone(), ctx.clone()) => {
            error!("CRITICAL: Service controller exited unexpectedly");
            anyhow::bail!("Service controller exited unexpectedly")
        }
        () = controllers::node::run(client.clone(), ctx.clone()) => {
            error!("CRITICAL: Node controller exited unexpectedly");
            anyhow::bail!("Node controller exited unexpectedly")
        }
        () = run_node_reflector(client.clone(), writer) => {
            error!("CRITICAL: Node reflector exited unexpectedly");
            anyhow::bail!("Node reflector exited unexpectedly")
        }
        result = serve_metrics(args.metrics_port) => {
            error!("CRITICAL: metrics server exited: {:?}", result);
            result?;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received, stopping");
            Ok(())
        }
    }
}

/// Keep the shared Node store current.
async fn run_node_reflector(client: Client, writer: Writer<Node>) {
    info!("Starting Node reflector");
    let api = Api::<Node>::all(client);
    reflector::reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .touched_objects()
        .for_each(|result| {
            if let Err(e) = result {
                debug!(error = %e, "Node watch error");
            }
            futures::future::ready(())
        })
        .await;
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    gather_metrics().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Serve Prometheus metrics until the listener fails.
async fn serve_metrics(port: u16) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
    let listener = tokio::net::TcpListener::bind((METRICS_SERVER_BIND_ADDRESS, port))
        .await
        .with_context(|| format!("failed to bind metrics server on port {port}"))?;
    info!(
        address = %METRICS_SERVER_BIND_ADDRESS,
        port = port,
        path = METRICS_SERVER_PATH,
        "Serving metrics"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
