// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for kube-local-dns.
//!
//! All metrics share the namespace prefix `kube_local_dns_`.
//!
//! # Metrics Categories
//!
//! - **Query Metrics** - DNS questions answered by type and response code
//! - **Watch Metrics** - Events received and stream restarts per resource kind
//! - **Reconciliation Metrics** - Failed events, event latency and tracked entries
//!
//! # Example
//!
//! ```rust,no_run
//! use kube_local_dns::metrics::{gather_metrics, record_watch_event};
//!
//! record_watch_event("Ingress", "added");
//! let text = gather_metrics().unwrap();
//! ```

use crate::constants::METRICS_SERVER_PATH;
use crate::dns_errors::PluginError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "kube_local_dns";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Query Metrics
// ============================================================================

/// Total number of DNS questions answered
///
/// Labels:
/// - `qtype`: Question type (e.g., `A`, `AAAA`)
/// - `rcode`: Response code of the enclosing response (`NoError`, `NXDomain`)
pub static QUERIES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_queries_total"),
        "Total number of DNS questions answered by type and response code",
    );
    let counter = CounterVec::new(opts, &["qtype", "rcode"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Watch Metrics
// ============================================================================

/// Total number of watch events dispatched
///
/// Labels:
/// - `kind`: Resource kind (`Ingress`, `Service`)
/// - `event`: Event type (`added`, `modified`, `deleted`)
pub static WATCH_EVENTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_events_total"),
        "Total number of watch events dispatched by kind and event type",
    );
    let counter = CounterVec::new(opts, &["kind", "event"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of watch stream restarts (the first open is not counted)
///
/// Labels:
/// - `kind`: Resource kind
pub static WATCH_RESTARTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_restarts_total"),
        "Total number of watch stream restarts by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of watch events whose application failed
///
/// Labels:
/// - `kind`: Resource kind
pub static RECONCILE_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconcile_errors_total"),
        "Total number of watch events that failed to apply by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of handling a single watch event in seconds
///
/// Labels:
/// - `kind`: Resource kind
pub static EVENT_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_event_duration_seconds"),
        "Duration of handling a single watch event by kind",
    )
    .buckets(vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0]);
    let histogram = HistogramVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Number of cluster objects currently tracked by a reconciler
///
/// Labels:
/// - `kind`: Resource kind
pub static TRACKED_ENTRIES: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_tracked_entries"),
        "Number of cluster objects currently tracked by kind",
    );
    let gauge = GaugeVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record an answered question
///
/// # Arguments
/// * `qtype` - The question's record type
/// * `rcode` - The response code of the response carrying it
pub fn record_query(qtype: &str, rcode: &str) {
    QUERIES_TOTAL.with_label_values(&[qtype, rcode]).inc();
}

/// Record a dispatched watch event
///
/// # Arguments
/// * `kind` - The resource kind being watched
/// * `event` - Event type (`added`, `modified`, `deleted`)
pub fn record_watch_event(kind: &str, event: &str) {
    WATCH_EVENTS_TOTAL.with_label_values(&[kind, event]).inc();
}

/// Record a watch stream restart after an interruption or a failed open
pub fn record_watch_restart(kind: &str) {
    WATCH_RESTARTS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record how long applying one event took and whether it failed
///
/// # Arguments
/// * `kind` - The resource kind being watched
/// * `duration` - Time spent in the handler
/// * `failed` - Whether the handler returned an error
pub fn record_event_handled(kind: &str, duration: Duration, failed: bool) {
    EVENT_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
    if failed {
        RECONCILE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Record the number of entries a reconciler tracks
#[allow(clippy::cast_precision_loss)]
pub fn record_tracked_entries(kind: &str, count: usize) {
    TRACKED_ENTRIES.with_label_values(&[kind]).set(count as f64);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Returns
/// Prometheus-formatted metrics as a String
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

// ============================================================================
// Metrics Endpoint
// ============================================================================

async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// HTTP server exposing [`gather_metrics`] on `/metrics`.
pub struct MetricsServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl MetricsServer {
    /// Bind `addr` and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(addr: SocketAddr) -> Result<Self, PluginError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| PluginError::Bind { addr, source })?;
        let local_addr = listener.local_addr().unwrap_or(addr);

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %local_addr, path = METRICS_SERVER_PATH, "Metrics endpoint listening");
        Ok(Self {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    /// Address the endpoint is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop serving and release the socket.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        match self.task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Metrics endpoint failed"),
            Err(e) => error!(error = %e, "Metrics endpoint task panicked"),
        }
    }
}
