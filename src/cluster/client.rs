// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`ClusterApi`] backed by a `kube` client.

use super::patch::{object_patch, with_resource_version};
use super::ClusterApi;
use crate::constants::{KIND_NODE, KIND_SERVICE, KUBE_LIST_PAGE_SIZE};
use crate::errors::{Error, Result};
use crate::labels::SERVICE_NODE_KEY;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Kubernetes-backed cluster access.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap a `kube` client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Send the merge patches turning `observed` into `desired`.
///
/// The main resource is patched first; the status patch then uses the
/// `resourceVersion` returned by that call, so both stay guarded.
async fn apply_diff<K>(api: &Api<K>, kind: &'static str, observed: &K, desired: &K) -> Result<K>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned,
{
    let name = observed.name_any();
    let patch = object_patch(
        &serde_json::to_value(observed)?,
        &serde_json::to_value(desired)?,
    );
    if patch.is_empty() {
        debug!(kind = kind, name = %name, "No changes to patch");
        return Ok(observed.clone());
    }

    let params = PatchParams::default();
    let mut current = observed.clone();

    if let Some(main) = patch.main {
        let body = with_resource_version(main, current.resource_version().as_deref());
        debug!(kind = kind, name = %name, patch = %body, "Patching object");
        current = api
            .patch(&name, &params, &Patch::Merge(&body))
            .await
            .map_err(|e| Error::from_kube(e, kind, &name))?;
    }

    if let Some(status) = patch.status {
        let body = with_resource_version(status, current.resource_version().as_deref());
        debug!(kind = kind, name = %name, patch = %body, "Patching object status");
        current = api
            .patch_status(&name, &params, &Patch::Merge(&body))
            .await
            .map_err(|e| Error::from_kube(e, kind, &name))?;
    }

    Ok(current)
}

/// List all resources matching `list_params`, fetching in pages.
async fn list_all_paginated<K>(api: &Api<K>, mut list_params: ListParams) -> Result<Vec<K>>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    list_params.limit = Some(KUBE_LIST_PAGE_SIZE);

    let mut all_items = Vec::new();
    let mut page_count = 0;

    loop {
        page_count += 1;
        let result = api.list(&list_params).await?;

        let item_count = result.items.len();
        all_items.extend(result.items);

        debug!(
            page = page_count,
            items_in_page = item_count,
            total_items = all_items.len(),
            "Fetched page from Kubernetes API"
        );

        if let Some(continue_token) = result.metadata.continue_ {
            list_params.continue_token = Some(continue_token);
        } else {
            break;
        }
    }

    Ok(all_items)
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(e, KIND_NODE, name))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(e, KIND_SERVICE, name))
    }

    async fn patch_node(&self, observed: &Node, desired: &Node) -> Result<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        apply_diff(&api, KIND_NODE, observed, desired).await
    }

    async fn patch_service(&self, observed: &Service, desired: &Service) -> Result<Service> {
        let namespace = observed.namespace().unwrap_or_default();
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        apply_diff(&api, KIND_SERVICE, observed, desired).await
    }

    async fn services_bound_to(&self, node_name: &str) -> Result<Vec<Service>> {
        let api: Api<Service> = Api::all(self.client.clone());
        let selector = format!("{SERVICE_NODE_KEY}={node_name}");
        list_all_paginated(&api, ListParams::default().labels(&selector)).await
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => match Error::from_kube(e, KIND_NODE, name) {
                Error::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }
}
