// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use kube::Client;
use kube_local_dns::{
    config::Args,
    constants::TOKIO_WORKER_THREADS,
    plugin::DnsPlugin,
    status::{status_channel, StatusReceiver},
};
use tracing::{debug, info};

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("kube-local-dns")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Respects RUST_LOG (default: info) and RUST_LOG_FORMAT=json
    init_logging();

    info!("Starting kube-local-dns");
    let config = args.into_plugin_config();
    debug!(?config, "Configuration loaded");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let (status_tx, status_rx) = status_channel(config.status_buffer);
    let status_task = tokio::spawn(log_status(status_rx));

    let mut plugin = DnsPlugin::new(config, client);
    let name = plugin.start(status_tx).await?;
    info!(plugin = %name, "Plugin started; waiting for shutdown signal");

    shutdown_signal().await?;

    info!("Shutting down");
    plugin.stop().await?;
    drop(plugin);
    let _ = status_task.await;

    info!("kube-local-dns stopped");
    Ok(())
}

fn init_logging() {
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

/// Log every status message until all publishers are gone.
async fn log_status(mut status_rx: StatusReceiver) {
    while let Some(message) = status_rx.recv().await {
        info!(
            box_name = %message.box_name,
            published_at = %message.published_at.to_rfc3339(),
            "\n{}",
            message.text
        );
    }
}

/// Wait for Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
