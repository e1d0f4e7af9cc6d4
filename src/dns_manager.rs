// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bridge between reconciler output and the record store.
//!
//! The reconciler talks to a [`DnsManager`] and never to the store directly, so it
//! behaves the same whether or not DNS serving is active:
//!
//! - [`StoreDnsManager`] forwards to a live [`RecordStore`]
//! - [`LoggingDnsManager`] only logs what it would have done

use crate::dns_errors::StoreError;
use crate::store::RecordStore;
use hickory_proto::rr::RecordType;
use std::sync::Arc;
use tracing::info;

/// Host-level DNS operations issued by the reconciler.
///
/// Calls are synchronous and local; implementations must not block on I/O.
pub trait DnsManager: Send + Sync {
    /// Resolve `host` to `ip` (A or AAAA by address family).
    ///
    /// # Errors
    ///
    /// Returns an error if the host name or address is invalid.
    fn add_host(&self, host: &str, ip: &str) -> Result<(), StoreError>;

    /// Alias `host` to `target` (CNAME).
    ///
    /// # Errors
    ///
    /// Returns an error if either name is invalid.
    fn add_alias(&self, host: &str, target: &str) -> Result<(), StoreError>;

    /// Remove everything registered for `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host name is invalid.
    fn remove_host(&self, host: &str) -> Result<(), StoreError>;
}

/// Forwards host operations to a running record store.
#[derive(Clone, Debug)]
pub struct StoreDnsManager {
    store: Arc<RecordStore>,
}

impl StoreDnsManager {
    /// Wrap a shared store.
    #[must_use]
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

impl DnsManager for StoreDnsManager {
    fn add_host(&self, host: &str, ip: &str) -> Result<(), StoreError> {
        self.store.add_host(host, ip)
    }

    fn add_alias(&self, host: &str, target: &str) -> Result<(), StoreError> {
        self.store.add_cname(host, target)
    }

    fn remove_host(&self, host: &str) -> Result<(), StoreError> {
        // The host may have switched address family or been an alias.
        self.store.remove_resource_record(host, RecordType::A)?;
        self.store.remove_resource_record(host, RecordType::AAAA)?;
        self.store.remove_resource_record(host, RecordType::CNAME)
    }
}

/// Stand-in used when no DNS backend is running.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingDnsManager;

impl DnsManager for LoggingDnsManager {
    fn add_host(&self, host: &str, ip: &str) -> Result<(), StoreError> {
        info!(host = %host, ip = %ip, "DNS backend disabled; would add host");
        Ok(())
    }

    fn add_alias(&self, host: &str, target: &str) -> Result<(), StoreError> {
        info!(host = %host, target = %target, "DNS backend disabled; would add alias");
        Ok(())
    }

    fn remove_host(&self, host: &str) -> Result<(), StoreError> {
        info!(host = %host, "DNS backend disabled; would remove host");
        Ok(())
    }
}

#[cfg(test)]
#[path = "dns_manager_tests.rs"]
mod dns_manager_tests;
