// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration.
//!
//! [`Args`] is parsed by the binary; the library only ever sees the plain
//! [`PluginConfig`] produced by [`Args::into_plugin_config`].

use crate::constants::{
    DEFAULT_CLUSTER_DOMAIN, DEFAULT_GRPC_PORT, DEFAULT_RECORD_TTL_SECS,
    DEFAULT_RESTART_DELAY_MILLIS, DEFAULT_STATUS_BUFFER,
};
use crate::entry::EntryKind;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// Resource kinds that can be watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WatchKind {
    /// Ingress host rules
    Ingress,
    /// `LoadBalancer` and `ExternalName` Services
    Service,
}

impl From<WatchKind> for EntryKind {
    fn from(kind: WatchKind) -> Self {
        match kind {
            WatchKind::Ingress => Self::Ingress,
            WatchKind::Service => Self::Service,
        }
    }
}

/// Serve Kubernetes Ingress and Service host names to a local CoreDNS.
#[derive(Parser, Debug, Clone)]
#[command(name = "kube-local-dns")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Loopback port of the gRPC DNS backend.
    #[arg(long, env = "KUBE_LOCAL_DNS_LISTEN_PORT", default_value_t = DEFAULT_GRPC_PORT)]
    pub listen_port: u16,

    /// Cluster domain used for Service host names.
    #[arg(long, env = "KUBE_LOCAL_DNS_CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// Resource kinds to watch (repeatable). Defaults to all.
    #[arg(long = "watch", value_enum)]
    pub watch: Vec<WatchKind>,

    /// Reconcile without serving DNS; changes are only logged.
    #[arg(long)]
    pub no_dns_server: bool,

    /// Address for the Prometheus `/metrics` endpoint. Disabled when unset.
    #[arg(long, env = "KUBE_LOCAL_DNS_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Capacity of the status message channel.
    #[arg(long, default_value_t = DEFAULT_STATUS_BUFFER)]
    pub status_buffer: usize,

    /// Pause between watch stream restarts in milliseconds (0 disables).
    #[arg(long, default_value_t = DEFAULT_RESTART_DELAY_MILLIS)]
    pub restart_delay_ms: u64,
}

impl Args {
    /// Convert parsed arguments into the library configuration.
    #[must_use]
    pub fn into_plugin_config(self) -> PluginConfig {
        let watch = if self.watch.is_empty() {
            vec![EntryKind::Ingress, EntryKind::Service]
        } else {
            let mut kinds: Vec<EntryKind> = Vec::new();
            for kind in self.watch.into_iter().map(EntryKind::from) {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
            kinds
        };

        PluginConfig {
            listen_port: self.listen_port,
            cluster_domain: self.cluster_domain,
            watch,
            serve_dns: !self.no_dns_server,
            metrics_addr: self.metrics_addr,
            status_buffer: self.status_buffer,
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            record_ttl: DEFAULT_RECORD_TTL_SECS,
        }
    }
}

/// Runtime configuration of the DNS plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Loopback port of the gRPC backend; `0` picks an ephemeral port
    pub listen_port: u16,
    /// Cluster domain for Service host names
    pub cluster_domain: String,
    /// Kinds to watch, in start order
    pub watch: Vec<EntryKind>,
    /// Whether to run the record store and gRPC backend
    pub serve_dns: bool,
    /// Optional metrics endpoint
    pub metrics_addr: Option<SocketAddr>,
    /// Status channel capacity
    pub status_buffer: usize,
    /// Pause between watch restarts
    pub restart_delay: Duration,
    /// TTL of every served record
    pub record_ttl: u32,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_GRPC_PORT,
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            watch: vec![EntryKind::Ingress, EntryKind::Service],
            serve_dns: true,
            metrics_addr: None,
            status_buffer: DEFAULT_STATUS_BUFFER,
            restart_delay: Duration::from_millis(DEFAULT_RESTART_DELAY_MILLIS),
            record_ttl: DEFAULT_RECORD_TTL_SECS,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
