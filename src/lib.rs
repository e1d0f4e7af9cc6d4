// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # kube-local-dns - Kubernetes host names for a local resolver
//!
//! kube-local-dns lets a developer machine resolve Ingress hosts and Service names
//! through a local CoreDNS that forwards a zone to this process over gRPC. The
//! answers are kept in step with live cluster state by watching the API server.
//!
//! ## Overview
//!
//! ```text
//! accessor -> watcher -> reconciler -> dns_manager -> store -> query -> rpc
//! ```
//!
//! - An accessor lists and watches one resource kind and flattens objects into
//!   entries.
//! - The watcher pumps events to the reconciler one at a time and restarts the
//!   stream from its cursor whenever it fails.
//! - The reconciler diffs each entry against the last applied one and issues the
//!   minimal host adds and removes.
//! - The record store answers DNS questions arriving over gRPC.
//!
//! ## Modules
//!
//! - [`store`] - Concurrent in-memory resource-record store
//! - [`query`] - DNS message decoding and answering
//! - [`rpc`] - `coredns.dns.DnsService` gRPC server
//! - [`accessor`] - Ingress and Service list/watch/convert capability sets
//! - [`watcher`] - Restart-on-error event pump
//! - [`reconciler`] - Baseline diffing into host operations
//! - [`dns_manager`] - Bridge from the reconciler to the store
//! - [`plugin`] - Start/stop lifecycle tying everything together
//!
//! ## Example
//!
//! ```rust,no_run
//! use kube_local_dns::store::RecordStore;
//! use hickory_proto::rr::RecordType;
//!
//! let store = RecordStore::default();
//! store.add_host("web.example.com", "192.168.49.2").unwrap();
//! let records = store.get_resource_record("web.example.com.", RecordType::A).unwrap();
//! assert_eq!(records.len(), 1);
//! ```

pub mod accessor;
pub mod config;
pub mod constants;
pub mod dns_errors;
pub mod dns_manager;
pub mod entry;
pub mod metrics;
pub mod plugin;
pub mod query;
pub mod reconciler;
pub mod rpc;
pub mod status;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod test_support;
