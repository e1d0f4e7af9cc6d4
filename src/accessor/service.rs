// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service accessor.
//!
//! Only `LoadBalancer` and `ExternalName` Services carry a target reachable from
//! outside the cluster; `ClusterIP` and `NodePort` Services are filtered out
//! before they reach the reconciler.
//!
//! Each Service publishes a single synthesized host
//! `<name>.<namespace>.svc.<cluster-domain>.` resolving to its load-balancer
//! addresses, or aliasing its external name.

use super::pagination::list_all_paginated;
use super::{object_identity, split_load_balancer_targets, watch_api, EventStream, ResourceAccessor};
use crate::constants::{SERVICE_TYPE_EXTERNAL_NAME, SERVICE_TYPE_LOAD_BALANCER};
use crate::dns_errors::AccessorError;
use crate::entry::{Entry, EntryKind};
use k8s_openapi::api::core::v1::Service;
use kube::api::ListParams;
use kube::{Api, Client};

/// Lists and watches every Service in the cluster.
#[derive(Clone)]
pub struct ServiceAccessor {
    api: Api<Service>,
    cluster_domain: String,
}

impl ServiceAccessor {
    /// Create an accessor over all namespaces.
    #[must_use]
    pub fn new(client: Client, cluster_domain: impl Into<String>) -> Self {
        Self {
            api: Api::all(client),
            cluster_domain: cluster_domain.into(),
        }
    }
}

#[async_trait::async_trait]
impl ResourceAccessor for ServiceAccessor {
    type Object = Service;

    fn kind(&self) -> EntryKind {
        EntryKind::Service
    }

    async fn pre_fetch(&self) -> Result<(Vec<Service>, String), AccessorError> {
        list_all_paginated(&self.api, ListParams::default()).await
    }

    async fn watch(&self, cursor: &str) -> Result<EventStream<Service>, AccessorError> {
        watch_api(&self.api, cursor).await
    }

    fn convert_to_entry(&self, object: &Service) -> Result<Entry, AccessorError> {
        service_to_entry(object, &self.cluster_domain)
    }

    fn matches_preconditions(&self, object: &Service) -> bool {
        service_is_routable(object)
    }
}

/// True for `LoadBalancer` and `ExternalName` Services.
#[must_use]
pub fn service_is_routable(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .is_some_and(|kind| {
            kind == SERVICE_TYPE_LOAD_BALANCER || kind == SERVICE_TYPE_EXTERNAL_NAME
        })
}

/// The cluster-local host name a Service is published under.
#[must_use]
pub fn service_host_name(name: &str, namespace: &str, cluster_domain: &str) -> String {
    format!(
        "{name}.{namespace}.svc.{}.",
        cluster_domain.trim_end_matches('.')
    )
}

/// Flatten a Service into an [`Entry`].
///
/// # Errors
///
/// Returns an error if the Service has no name.
pub fn service_to_entry(service: &Service, cluster_domain: &str) -> Result<Entry, AccessorError> {
    let (namespace, name) = object_identity(EntryKind::Service, service)?;
    let host = service_host_name(&name, &namespace, cluster_domain);
    let mut entry = Entry::new(EntryKind::Service, namespace, name);
    entry.host_names.insert(host);

    let points = service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());
    let (ips, mut hosts) = split_load_balancer_targets(
        points
            .into_iter()
            .flatten()
            .map(|point| (point.ip.as_ref(), point.hostname.as_ref())),
    );

    let external_name = service
        .spec
        .as_ref()
        .filter(|spec| spec.type_.as_deref() == Some(SERVICE_TYPE_EXTERNAL_NAME))
        .and_then(|spec| spec.external_name.clone())
        .filter(|external| !external.is_empty());
    if let Some(external) = external_name {
        hosts.push(external);
    }

    entry.target_ips = ips;
    entry.target_hosts = hosts;
    Ok(entry)
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
