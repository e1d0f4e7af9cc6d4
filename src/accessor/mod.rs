// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resource accessors: list, watch, convert and filter one Kubernetes kind.
//!
//! A [`ResourceAccessor`] is the only thing the generic watcher and the reconciler
//! know about the cluster. Two implementations exist:
//!
//! - [`ingress::IngressAccessor`] - every Ingress, hosts from rules and TLS blocks
//! - [`service::ServiceAccessor`] - `LoadBalancer` and `ExternalName` Services under
//!   a synthesized `<name>.<namespace>.svc.<cluster-domain>.` host
//!
//! The accessor is chosen once at startup from configuration and injected.
//!
//! Raw `kube` watch events are flattened into the tagged [`Event`] enum so the
//! watcher's dispatch table is explicit and can be driven from a scripted stream.

pub mod ingress;
pub mod pagination;
pub mod service;

use crate::constants::{DEFAULT_NAMESPACE, WATCH_TIMEOUT_SECS};
use crate::dns_errors::AccessorError;
use crate::entry::{Entry, EntryKind};
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{WatchEvent, WatchParams};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// One item of a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<K> {
    /// Object created (or replayed when a watch starts without a cursor)
    Added(K),
    /// Object changed
    Modified(K),
    /// Object deleted; carries the last known state
    Deleted(K),
    /// Progress marker carrying a newer resource version
    Bookmark(String),
    /// The stream failed and must be reopened
    Error {
        /// HTTP-style status code, `0` when the failure was not an API status
        code: u16,
        /// Human-readable reason
        message: String,
    },
}

impl<K> Event<K> {
    /// Flatten one item of a `kube` watch stream.
    pub fn from_watch(item: Result<WatchEvent<K>, kube::Error>) -> Self {
        match item {
            Ok(WatchEvent::Added(object)) => Self::Added(object),
            Ok(WatchEvent::Modified(object)) => Self::Modified(object),
            Ok(WatchEvent::Deleted(object)) => Self::Deleted(object),
            Ok(WatchEvent::Bookmark(bookmark)) => {
                Self::Bookmark(bookmark.metadata.resource_version)
            }
            Ok(WatchEvent::Error(status)) => Self::Error {
                code: status.code,
                message: status.message.clone(),
            },
            Err(kube::Error::Api(status)) => Self::Error {
                code: status.code,
                message: status.message.clone(),
            },
            Err(e) => Self::Error {
                code: 0,
                message: e.to_string(),
            },
        }
    }
}

/// A live event stream.
pub type EventStream<K> = BoxStream<'static, Event<K>>;

/// Capability set over one Kubernetes resource kind.
#[async_trait::async_trait]
pub trait ResourceAccessor: Send + Sync + 'static {
    /// The typed object this accessor lists and watches.
    type Object: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static;

    /// Kind of the entries this accessor produces.
    fn kind(&self) -> EntryKind;

    /// List every current object and return the list's resume cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes API call fails.
    async fn pre_fetch(&self) -> Result<(Vec<Self::Object>, String), AccessorError>;

    /// Open a live event stream starting after `cursor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened.
    async fn watch(&self, cursor: &str) -> Result<EventStream<Self::Object>, AccessorError>;

    /// Flatten an object into an [`Entry`].
    ///
    /// # Errors
    ///
    /// Returns an error if the object lacks the metadata that forms its identity.
    fn convert_to_entry(&self, object: &Self::Object) -> Result<Entry, AccessorError>;

    /// Whether the object belongs in the reconciliation pipeline at all.
    fn matches_preconditions(&self, object: &Self::Object) -> bool;
}

/// Open a cluster-wide watch on `api` and flatten its events.
///
/// # Errors
///
/// Returns an error if the watch request fails.
pub async fn watch_api<K>(api: &Api<K>, cursor: &str) -> Result<EventStream<K>, AccessorError>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
    let stream = api.watch(&params, cursor).await?;
    Ok(stream.map(Event::from_watch).boxed())
}

/// Extract `(namespace, name)` from an object's metadata.
///
/// # Errors
///
/// Returns an error if the object has no name.
pub fn object_identity<K>(kind: EntryKind, object: &K) -> Result<(String, String), AccessorError>
where
    K: Resource,
{
    let meta = object.meta();
    let name = meta.name.clone().ok_or(AccessorError::MissingMetadata {
        kind: kind.as_str(),
        field: "name",
    })?;
    let namespace = meta
        .namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    Ok((namespace, name))
}

/// Split load-balancer ingress points into target IPs and target hosts.
///
/// Points with both fields set contribute to both lists; order is preserved.
pub fn split_load_balancer_targets<'a, I>(points: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = (Option<&'a String>, Option<&'a String>)>,
{
    let mut ips = Vec::new();
    let mut hosts = Vec::new();
    for (ip, hostname) in points {
        if let Some(ip) = ip.filter(|ip| !ip.is_empty()) {
            ips.push(ip.clone());
        }
        if let Some(hostname) = hostname.filter(|host| !host.is_empty()) {
            hosts.push(hostname.clone());
        }
    }
    (ips, hosts)
}
