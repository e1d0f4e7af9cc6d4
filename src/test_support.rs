// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fakes for unit tests: a scripted accessor and a recording DNS manager.

use crate::accessor::ingress::ingress_to_entry;
use crate::accessor::{Event, EventStream, ResourceAccessor};
use crate::dns_errors::{AccessorError, StoreError};
use crate::dns_manager::DnsManager;
use crate::entry::{Entry, EntryKind};
use futures::stream::{self, StreamExt};
use k8s_openapi::api::networking::v1::Ingress;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Build an Ingress with the given hosts and load-balancer IPs.
pub fn ingress(name: &str, resource_version: Option<&str>, hosts: &[&str], ips: &[&str]) -> Ingress {
    let rules: Vec<_> = hosts.iter().map(|host| json!({ "host": host })).collect();
    let points: Vec<_> = ips.iter().map(|ip| json!({ "ip": ip })).collect();
    let mut metadata = json!({ "name": name, "namespace": "default" });
    if let Some(version) = resource_version {
        metadata["resourceVersion"] = json!(version);
    }
    serde_json::from_value(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": metadata,
        "spec": { "rules": rules },
        "status": { "loadBalancer": { "ingress": points } }
    }))
    .expect("valid Ingress")
}

/// Sets a flag when dropped; used to prove a stream was closed.
pub struct DropFlag(pub Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Accessor that serves a fixed list and pre-scripted watch streams.
///
/// Each `watch` call pops the next script; its events are yielded and then the
/// stream ends. Once the scripts run out the stream stays open forever.
#[derive(Default)]
pub struct ScriptedAccessor {
    pub listed: Vec<Ingress>,
    pub list_cursor: String,
    pub scripts: Mutex<VecDeque<Vec<Event<Ingress>>>>,
    pub opened_with: Mutex<Vec<String>>,
    pub idle_stream_dropped: Arc<AtomicBool>,
    pub reject_all: AtomicBool,
    pub fail_pre_fetch: bool,
    /// Kind reported to metrics and status; Ingress when unset
    pub kind_label: Option<EntryKind>,
    pub pre_fetch_calls: AtomicUsize,
}

impl ScriptedAccessor {
    pub fn with_scripts(scripts: Vec<Vec<Event<Ingress>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    pub fn opened_with(&self) -> Vec<String> {
        self.opened_with.lock().clone()
    }
}

#[async_trait::async_trait]
impl ResourceAccessor for ScriptedAccessor {
    type Object = Ingress;

    fn kind(&self) -> EntryKind {
        self.kind_label.unwrap_or(EntryKind::Ingress)
    }

    async fn pre_fetch(&self) -> Result<(Vec<Ingress>, String), AccessorError> {
        self.pre_fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pre_fetch {
            return Err(AccessorError::MissingMetadata {
                kind: "Ingress",
                field: "resourceVersion",
            });
        }
        Ok((self.listed.clone(), self.list_cursor.clone()))
    }

    async fn watch(&self, cursor: &str) -> Result<EventStream<Ingress>, AccessorError> {
        self.opened_with.lock().push(cursor.to_string());
        match self.scripts.lock().pop_front() {
            Some(events) => Ok(stream::iter(events).boxed()),
            None => {
                let guard = DropFlag(Arc::clone(&self.idle_stream_dropped));
                Ok(stream::unfold(guard, |guard| async move {
                    let _held = guard;
                    std::future::pending::<Option<(Event<Ingress>, DropFlag)>>().await
                })
                .boxed())
            }
        }
    }

    fn convert_to_entry(&self, object: &Ingress) -> Result<Entry, AccessorError> {
        ingress_to_entry(object)
    }

    fn matches_preconditions(&self, _object: &Ingress) -> bool {
        !self.reject_all.load(Ordering::SeqCst)
    }
}

/// One call made on a [`RecordingDnsManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsCall {
    AddHost(String, String),
    AddAlias(String, String),
    RemoveHost(String),
}

/// DNS manager that records every call and optionally fails some.
#[derive(Default)]
pub struct RecordingDnsManager {
    pub calls: Mutex<Vec<DnsCall>>,
    pub failing_hosts: Vec<String>,
}

impl RecordingDnsManager {
    pub fn calls(&self) -> Vec<DnsCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn check(&self, host: &str) -> Result<(), StoreError> {
        if self.failing_hosts.iter().any(|failing| failing == host) {
            return Err(StoreError::InvalidName {
                name: host.to_string(),
                reason: "rejected by test".to_string(),
            });
        }
        Ok(())
    }
}

impl DnsManager for RecordingDnsManager {
    fn add_host(&self, host: &str, ip: &str) -> Result<(), StoreError> {
        self.check(host)?;
        self.calls
            .lock()
            .push(DnsCall::AddHost(host.to_string(), ip.to_string()));
        Ok(())
    }

    fn add_alias(&self, host: &str, target: &str) -> Result<(), StoreError> {
        self.check(host)?;
        self.calls
            .lock()
            .push(DnsCall::AddAlias(host.to_string(), target.to_string()));
        Ok(())
    }

    fn remove_host(&self, host: &str) -> Result<(), StoreError> {
        self.calls
            .lock()
            .push(DnsCall::RemoveHost(host.to_string()));
        Ok(())
    }
}
