// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for kube-local-dns.
//!
//! This module provides specialized error types for:
//! - Record store validation and lookups
//! - Wire-level query decoding and encoding
//! - Kubernetes resource access (list, watch, conversion)
//! - Per-event reconciliation failures
//! - Plugin lifecycle (socket binding, double start/stop)
//!
//! Validation errors are returned to the immediate caller and never crash the
//! process. Reconciliation errors aggregate every failed host so that one bad
//! hostname never blocks the others.

use hickory_proto::error::ProtoError;
use hickory_proto::rr::RecordType;
use thiserror::Error;

/// Errors returned by the in-memory record store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The name is not a syntactically legal domain name.
    #[error("Invalid domain name '{name}': {reason}")]
    InvalidName {
        /// The offending name as given by the caller
        name: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// The value does not parse as an IP address at all.
    #[error("Invalid IP address '{value}' for '{name}'")]
    InvalidAddress {
        /// The record name the address was meant for
        name: String,
        /// The unparseable value
        value: String,
    },

    /// The address parsed but belongs to the wrong IP family for the record type.
    #[error("Address '{value}' for '{name}' is not valid for a {expected} record")]
    AddressFamilyMismatch {
        /// The record name the address was meant for
        name: String,
        /// The record type that was requested (A or AAAA)
        expected: RecordType,
        /// The address that was rejected
        value: String,
    },

    /// No records exist for the requested name and type.
    ///
    /// This is an expected outcome of a lookup and is never logged by the store.
    #[error("No {record_type} records for '{name}'")]
    NotFound {
        /// The normalized name that was looked up
        name: String,
        /// The record type that was looked up
        record_type: RecordType,
    },
}

impl StoreError {
    /// Returns true for caller mistakes (bad names or addresses), false for lookup misses.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }
}

/// Errors produced while answering a wire-level query.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The incoming packet could not be decoded as a DNS message.
    #[error("Malformed DNS packet: {0}")]
    MalformedPacket(#[source] ProtoError),

    /// The packet decoded but is not a query.
    #[error("DNS message {id} is not a query")]
    NotAQuery {
        /// Message id of the rejected packet
        id: u16,
    },

    /// The response could not be encoded.
    #[error("Failed to encode DNS response: {0}")]
    Encode(#[source] ProtoError),
}

/// Errors raised by resource accessors.
#[derive(Error, Debug)]
pub enum AccessorError {
    /// Kubernetes API call failed.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The object lacks metadata needed to build its identity.
    #[error("{kind} object is missing metadata field '{field}'")]
    MissingMetadata {
        /// Kind of the object (Ingress, Service)
        kind: &'static str,
        /// The missing field
        field: &'static str,
    },
}

/// Errors raised while applying one watch event.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The object could not be converted into an entry.
    #[error(transparent)]
    Accessor(#[from] AccessorError),

    /// The entry was recorded but has nothing to resolve to.
    #[error("{identity} has no load-balancer targets; hosts not registered")]
    NoTargets {
        /// `namespace/name` of the object
        identity: String,
    },

    /// One or more host operations failed; the rest were still applied.
    #[error("{} DNS operation(s) failed for {identity}: {}", failures.len(), join_failures(failures))]
    Apply {
        /// `namespace/name` of the object
        identity: String,
        /// Every individual failure, in the order encountered
        failures: Vec<StoreError>,
    },
}

fn join_failures(failures: &[StoreError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by the plugin lifecycle.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A listening socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind
        addr: std::net::SocketAddr,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Pre-fetching initial cluster state failed.
    #[error("Initial sync of {kind} objects failed: {source}")]
    PreFetch {
        /// Kind being synchronized
        kind: &'static str,
        /// Underlying accessor error
        #[source]
        source: AccessorError,
    },

    /// `start` was called twice.
    #[error("Plugin is already running")]
    AlreadyStarted,

    /// `stop` was called before `start`.
    #[error("Plugin is not running")]
    NotStarted,
}
