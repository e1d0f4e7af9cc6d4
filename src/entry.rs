// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Normalized DNS-relevant snapshot of one cluster object.

use crate::constants::{KIND_INGRESS, KIND_SERVICE};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of cluster object an [`Entry`] was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// `networking.k8s.io/v1` Ingress
    Ingress,
    /// core/v1 Service
    Service,
}

impl EntryKind {
    /// The Kubernetes kind name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => KIND_INGRESS,
            Self::Service => KIND_SERVICE,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the host names an object publishes and where they resolve to.
///
/// `target_ips` and `target_hosts` keep the order the load balancer reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
    /// Object kind
    pub kind: EntryKind,
    /// Host names to register
    pub host_names: BTreeSet<String>,
    /// Addresses the host names resolve to (A/AAAA)
    pub target_ips: Vec<String>,
    /// Host names the host names alias (CNAME)
    pub target_hosts: Vec<String>,
}

impl Entry {
    /// Create an entry with no hosts and no targets.
    #[must_use]
    pub fn new(kind: EntryKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
            host_names: BTreeSet::new(),
            target_ips: Vec::new(),
            target_hosts: Vec::new(),
        }
    }

    /// `namespace/name`, unique per kind.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// True when there is at least one IP or host to resolve to.
    #[must_use]
    pub fn has_targets(&self) -> bool {
        !self.target_ips.is_empty() || !self.target_hosts.is_empty()
    }

    /// True when both entries resolve to the same targets.
    ///
    /// Ordering is ignored: a load balancer reporting the same addresses in a
    /// different order is not a change.
    #[must_use]
    pub fn has_same_targets(&self, other: &Self) -> bool {
        same_members(&self.target_ips, &other.target_ips)
            && same_members(&self.target_hosts, &other.target_hosts)
    }
}

fn same_members(left: &[String], right: &[String]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut left: Vec<&String> = left.iter().collect();
    let mut right: Vec<&String> = right.iter().collect();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod entry_tests;
