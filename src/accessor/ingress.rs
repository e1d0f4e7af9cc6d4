// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ingress accessor.
//!
//! Host names are the union of every rule host and every TLS host. Targets come
//! from `.status.loadBalancer.ingress[]`. Every Ingress passes the precondition
//! check; one without targets is still tracked so a later update has a baseline.

use super::pagination::list_all_paginated;
use super::{object_identity, split_load_balancer_targets, watch_api, EventStream, ResourceAccessor};
use crate::dns_errors::AccessorError;
use crate::entry::{Entry, EntryKind};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ListParams;
use kube::{Api, Client};

/// Lists and watches every Ingress in the cluster.
#[derive(Clone)]
pub struct IngressAccessor {
    api: Api<Ingress>,
}

impl IngressAccessor {
    /// Create an accessor over all namespaces.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait::async_trait]
impl ResourceAccessor for IngressAccessor {
    type Object = Ingress;

    fn kind(&self) -> EntryKind {
        EntryKind::Ingress
    }

    async fn pre_fetch(&self) -> Result<(Vec<Ingress>, String), AccessorError> {
        list_all_paginated(&self.api, ListParams::default()).await
    }

    async fn watch(&self, cursor: &str) -> Result<EventStream<Ingress>, AccessorError> {
        watch_api(&self.api, cursor).await
    }

    fn convert_to_entry(&self, object: &Ingress) -> Result<Entry, AccessorError> {
        ingress_to_entry(object)
    }

    fn matches_preconditions(&self, _object: &Ingress) -> bool {
        true
    }
}

/// Flatten an Ingress into an [`Entry`].
///
/// # Errors
///
/// Returns an error if the Ingress has no name.
pub fn ingress_to_entry(ingress: &Ingress) -> Result<Entry, AccessorError> {
    let (namespace, name) = object_identity(EntryKind::Ingress, ingress)?;
    let mut entry = Entry::new(EntryKind::Ingress, namespace, name);

    if let Some(spec) = &ingress.spec {
        let rule_hosts = spec
            .rules
            .iter()
            .flatten()
            .filter_map(|rule| rule.host.clone());
        let tls_hosts = spec
            .tls
            .iter()
            .flatten()
            .flat_map(|tls| tls.hosts.iter().flatten().cloned());
        entry.host_names = rule_hosts
            .chain(tls_hosts)
            .filter(|host| !host.is_empty())
            .collect();
    }

    let points = ingress
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());
    let (ips, hosts) = split_load_balancer_targets(
        points
            .into_iter()
            .flatten()
            .map(|point| (point.ip.as_ref(), point.hostname.as_ref())),
    );
    entry.target_ips = ips;
    entry.target_hosts = hosts;

    Ok(entry)
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
