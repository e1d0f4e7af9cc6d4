// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for kube-local-dns.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Plugin Constants
// ============================================================================

/// Name returned by the plugin lifecycle `start` call
pub const PLUGIN_NAME: &str = "kube-local-dns";

/// Status box used for plugin lifecycle messages
pub const STATUS_BOX_DNS: &str = "DNS";

/// Default capacity of the status channel
pub const DEFAULT_STATUS_BUFFER: usize = 64;

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// TTL attached to every served resource record (1 minute)
pub const DEFAULT_RECORD_TTL_SECS: u32 = 60;

/// Maximum length of a domain name in presentation format, without the root dot
pub const MAX_DOMAIN_NAME_LEN: usize = 253;

/// Maximum length of a single domain name label
pub const MAX_LABEL_LEN: usize = 63;

// ============================================================================
// Wire Protocol Constants
// ============================================================================

/// Default gRPC port the DNS frontend forwards queries to
pub const DEFAULT_GRPC_PORT: u16 = 30053;

// ============================================================================
// Kubernetes Constants
// ============================================================================

/// Kind name for `Ingress` resources
pub const KIND_INGRESS: &str = "Ingress";

/// Kind name for `Service` resources
pub const KIND_SERVICE: &str = "Service";

/// Default cluster domain used for synthesized Service hostnames
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Namespace assumed when an object carries none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Service type that exposes load-balancer ingress addresses
pub const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";

/// Service type that aliases an external hostname
pub const SERVICE_TYPE_EXTERNAL_NAME: &str = "ExternalName";

/// Page size for Kubernetes API list operations
///
/// Limits memory usage and API server load during the pre-fetch pass.
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

/// Server-side timeout for a single watch request.
///
/// The API server closes the stream after this long, which the watcher treats
/// like any other stream end and resumes from its cursor.
pub const WATCH_TIMEOUT_SECS: u32 = 290;

/// HTTP status the API server uses when a watch cursor is too old
pub const WATCH_EXPIRED_CODE: u16 = 410;

// ============================================================================
// Watcher Constants
// ============================================================================

/// Default pause between a watch stream ending and the next attempt
pub const DEFAULT_RESTART_DELAY_MILLIS: u64 = 1000;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";
