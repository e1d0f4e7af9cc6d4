// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pagination helpers for Kubernetes API list operations.
//!
//! The pre-fetch pass lists every object of a kind across all namespaces. Large
//! clusters are fetched in pages to reduce memory usage and API server load.

use crate::constants::KUBE_LIST_PAGE_SIZE;
use crate::dns_errors::AccessorError;
use kube::{api::ListParams, Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// List all resources with automatic pagination.
///
/// Returns every object together with the resource version of the list
/// snapshot. All pages of a continued list share the first page's snapshot, so
/// that version is the cursor a subsequent watch resumes from.
///
/// # Arguments
///
/// * `api` - Kubernetes API client for the resource type
/// * `list_params` - Base list parameters (labels, fields, etc.)
///
/// # Example
///
/// ```no_run
/// use k8s_openapi::api::networking::v1::Ingress;
/// use kube::{Api, Client, api::ListParams};
/// use kube_local_dns::accessor::pagination::list_all_paginated;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let api: Api<Ingress> = Api::all(client);
///
/// let (ingresses, cursor) = list_all_paginated(&api, ListParams::default()).await?;
/// println!("Found {} ingresses at version {cursor}", ingresses.len());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if Kubernetes API operations fail.
pub async fn list_all_paginated<K>(
    api: &Api<K>,
    mut list_params: ListParams,
) -> Result<(Vec<K>, String), AccessorError>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    list_params.limit = Some(KUBE_LIST_PAGE_SIZE);

    let mut all_items = Vec::new();
    let mut resource_version: Option<String> = None;
    let mut page_count = 0;

    loop {
        page_count += 1;
        let result = api.list(&list_params).await?;

        if resource_version.is_none() {
            resource_version = result.metadata.resource_version.clone();
        }

        let item_count = result.items.len();
        all_items.extend(result.items);

        debug!(
            page = page_count,
            items_in_page = item_count,
            total_items = all_items.len(),
            "Fetched page from Kubernetes API"
        );

        match result.metadata.continue_ {
            Some(continue_token) if !continue_token.is_empty() => {
                list_params.continue_token = Some(continue_token);
            }
            _ => break,
        }
    }

    debug!(
        total_pages = page_count,
        total_items = all_items.len(),
        "Completed paginated list operation"
    );

    Ok((all_items, resource_version.unwrap_or_default()))
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod pagination_tests;
