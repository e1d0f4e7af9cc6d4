// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Host-name reconciliation.
//!
//! The [`Reconciler`] is the watcher's handler. It keeps the last applied
//! [`Entry`] (the baseline) per object identity and turns each incoming object
//! into the minimal set of `add_host`, `add_alias` and `remove_host` calls on the
//! DNS manager:
//!
//! | Event | Action |
//! |-------|--------|
//! | Added, no baseline | register every host, store the baseline |
//! | Added, baseline exists | handled as Updated |
//! | Updated, no baseline | handled as Added |
//! | Updated, no targets | remove every old host |
//! | Updated | remove dropped hosts, re-register kept hosts if targets changed, register new hosts |
//! | Deleted | remove every owned host, forget the baseline |
//! | Resync | apply every listed object as Added, remove tracked objects missing from the list |
//!
//! A changed target set is applied to a kept host by remove-then-add; the store
//! never overwrites in place. Failures on one host never stop the others and are
//! reported together as [`ReconcileError::Apply`].
//!
//! The baseline map is owned by the reconciler and only touched from the single
//! watch task that drives it.

use crate::accessor::ResourceAccessor;
use crate::dns_errors::{AccessorError, ReconcileError, StoreError};
use crate::dns_manager::DnsManager;
use crate::entry::Entry;
use crate::metrics;
use crate::status::{render_entries_table, StatusPublisher, StatusSender};
use crate::watcher::WatchHandler;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Diff-based handler that keeps DNS in step with one resource kind.
pub struct Reconciler<A: ResourceAccessor> {
    accessor: Arc<A>,
    dns: Arc<dyn DnsManager>,
    entries: BTreeMap<String, Entry>,
    status: StatusPublisher,
}

impl<A: ResourceAccessor> Reconciler<A> {
    /// Create a reconciler with an empty baseline map.
    ///
    /// Status tables are published under the box `"<Kind> Hosts"`.
    pub fn new(accessor: Arc<A>, dns: Arc<dyn DnsManager>, status_tx: StatusSender) -> Self {
        let box_name = format!("{} Hosts", accessor.kind());
        Self {
            accessor,
            dns,
            entries: BTreeMap::new(),
            status: StatusPublisher::new(box_name, status_tx),
        }
    }

    /// Tracked baselines, ordered by identity.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// The baseline for `namespace/name`, if tracked.
    #[must_use]
    pub fn entry(&self, identity: &str) -> Option<&Entry> {
        self.entries.get(identity)
    }

    /// List the current state of the cluster and apply it through [`WatchHandler::resync`].
    ///
    /// Returns the list cursor the watch should resume from. Per-object failures
    /// are logged and do not abort the pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the objects cannot be listed.
    pub async fn pre_fetch(&mut self) -> Result<String, AccessorError> {
        let kind = self.accessor.kind();
        let (objects, cursor) = self.accessor.pre_fetch().await?;
        info!(kind = %kind, count = objects.len(), cursor = %cursor, "Pre-fetched objects");

        self.resync(&objects).await;
        self.post_event().await;

        Ok(cursor)
    }

    fn add_entry(&mut self, entry: Entry) -> Result<(), ReconcileError> {
        let identity = entry.identity();
        if !entry.has_targets() {
            debug!(identity = %identity, "Tracking entry without targets");
            self.entries.insert(identity.clone(), entry);
            return Err(ReconcileError::NoTargets { identity });
        }

        let failures = self.register(&entry, entry.host_names.iter());
        info!(
            identity = %identity,
            hosts = entry.host_names.len(),
            "Registered hosts"
        );
        self.entries.insert(identity.clone(), entry);
        into_result(identity, failures)
    }

    fn update_entry(&mut self, old: &Entry, new: Entry) -> Result<(), ReconcileError> {
        let identity = new.identity();

        if !new.has_targets() {
            let failures = self.unregister(old.host_names.iter());
            info!(identity = %identity, "Entry lost its targets; removed hosts");
            self.entries.insert(identity.clone(), new);
            return into_result(identity, failures);
        }

        let mut failures = Vec::new();

        let dropped: BTreeSet<&String> = old.host_names.difference(&new.host_names).collect();
        failures.extend(self.unregister(dropped.iter().copied()));

        if !new.has_same_targets(old) {
            let kept: Vec<&String> = old.host_names.intersection(&new.host_names).collect();
            for host in kept {
                failures.extend(self.unregister(std::iter::once(host)));
                failures.extend(self.register(&new, std::iter::once(host)));
            }
        }

        let added: Vec<&String> = new.host_names.difference(&old.host_names).collect();
        failures.extend(self.register(&new, added.iter().copied()));

        debug!(
            identity = %identity,
            dropped = dropped.len(),
            added = added.len(),
            "Applied update"
        );
        self.entries.insert(identity.clone(), new);
        into_result(identity, failures)
    }

    fn remove_entry(&mut self, identity: &str, hosts: &BTreeSet<String>) -> Result<(), ReconcileError> {
        let failures = self.unregister(hosts.iter());
        self.entries.remove(identity);
        info!(identity = %identity, hosts = hosts.len(), "Removed hosts");
        into_result(identity.to_string(), failures)
    }

    fn register<'a, I>(&self, entry: &Entry, hosts: I) -> Vec<StoreError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut failures = Vec::new();
        for host in hosts {
            for ip in &entry.target_ips {
                if let Err(e) = self.dns.add_host(host, ip) {
                    log_rejected(host, &e);
                    failures.push(e);
                }
            }
            for target in &entry.target_hosts {
                if let Err(e) = self.dns.add_alias(host, target) {
                    log_rejected(host, &e);
                    failures.push(e);
                }
            }
        }
        failures
    }

    fn unregister<'a, I>(&self, hosts: I) -> Vec<StoreError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        hosts
            .into_iter()
            .filter_map(|host| self.dns.remove_host(host).err())
            .collect()
    }
}

// Bad names and addresses come from the cluster object; anything else is ours.
fn log_rejected(host: &str, e: &StoreError) {
    if e.is_validation() {
        debug!(host = %host, error = %e, "Store rejected host");
    } else {
        error!(host = %host, error = %e, "Unexpected store failure");
    }
}

fn into_result(identity: String, failures: Vec<StoreError>) -> Result<(), ReconcileError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ReconcileError::Apply { identity, failures })
    }
}

#[async_trait::async_trait]
impl<A: ResourceAccessor> WatchHandler<A::Object> for Reconciler<A> {
    async fn added_event(&mut self, object: &A::Object) -> Result<(), ReconcileError> {
        if !self.accessor.matches_preconditions(object) {
            // Replayed adds after an expired cursor may concern a tracked object.
            return self.updated_event(object).await;
        }

        let entry = self.accessor.convert_to_entry(object)?;
        match self.entries.get(&entry.identity()).cloned() {
            Some(old) => self.update_entry(&old, entry),
            None => self.add_entry(entry),
        }
    }

    async fn updated_event(&mut self, object: &A::Object) -> Result<(), ReconcileError> {
        let entry = self.accessor.convert_to_entry(object)?;
        let identity = entry.identity();

        if !self.accessor.matches_preconditions(object) {
            // An object that stops qualifying (e.g. a Service changed to ClusterIP)
            // gives up the hosts it registered while it did.
            return match self.entries.get(&identity).cloned() {
                Some(old) => self.remove_entry(&identity, &old.host_names),
                None => {
                    debug!(identity = %identity, "Ignoring object that fails preconditions");
                    Ok(())
                }
            };
        }

        match self.entries.get(&identity).cloned() {
            Some(old) => self.update_entry(&old, entry),
            None => {
                debug!(identity = %identity, "Update without baseline; applying as add");
                self.add_entry(entry)
            }
        }
    }

    async fn deleted_event(&mut self, object: &A::Object) -> Result<(), ReconcileError> {
        let entry = self.accessor.convert_to_entry(object)?;
        let identity = entry.identity();

        let hosts: BTreeSet<String> = match self.entries.get(&identity) {
            Some(old) => old.host_names.union(&entry.host_names).cloned().collect(),
            None if self.accessor.matches_preconditions(object) => entry.host_names,
            None => {
                debug!(identity = %identity, "Ignoring delete of untracked object");
                return Ok(());
            }
        };
        self.remove_entry(&identity, &hosts)
    }

    async fn resync(&mut self, objects: &[A::Object]) {
        let kind = self.accessor.kind();
        let mut listed = BTreeSet::new();

        for object in objects {
            if let Ok(entry) = self.accessor.convert_to_entry(object) {
                listed.insert(entry.identity());
            }
            if let Err(e) = self.added_event(object).await {
                warn!(kind = %kind, error = %e, "Failed to apply listed object");
            }
        }

        let vanished: Vec<(String, Entry)> = self
            .entries
            .iter()
            .filter(|(identity, _)| !listed.contains(*identity))
            .map(|(identity, entry)| (identity.clone(), entry.clone()))
            .collect();
        for (identity, old) in vanished {
            if let Err(e) = self.remove_entry(&identity, &old.host_names) {
                warn!(kind = %kind, error = %e, "Failed to remove vanished object");
            }
        }
    }

    async fn post_event(&mut self) {
        let table = render_entries_table(self.entries.values());
        self.status.publish(table).await;
        metrics::record_tracked_entries(self.accessor.kind().as_str(), self.entries.len());
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
