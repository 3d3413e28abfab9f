// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Durable service → node bindings recorded on cluster objects.
//!
//! A binding is written in three places:
//!
//! - annotation [`SERVICE_NODE_KEY`] on the Service (authoritative, value = node name)
//! - label [`SERVICE_NODE_KEY`] on the Service (for label-selector lookups by node)
//! - one per-service label on the Node, managed through [`NodeServiceLabels`]
//!
//! A bind writes the Service side first; an unbind releases the node side first.
//! An interrupted bind leaves at most a Service pointing at a node without the
//! node-side label, which [`ensure_node_label`] repairs. An interrupted unbind
//! leaves the Service annotation on the old node, so the next run retries the
//! release before labelling another node.

use crate::cluster::ClusterApi;
use crate::constants::{KIND_NODE, LABEL_NAME_MAX_LEN};
use crate::errors::{Error, Result};
use crate::labels::{NODE_SERVICE_LABEL_PREFIX, NODE_SERVICE_LABEL_VALUE, SERVICE_NODE_KEY};
use crate::metrics;
use k8s_openapi::api::core::v1::{LoadBalancerStatus, Node, Service};
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

/// Hex characters of the digest appended to shortened label names
const LABEL_HASH_LEN: usize = 10;

/// Identity of a Service: namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    /// Service namespace
    pub namespace: String,
    /// Service name
    pub name: String,
}

impl ServiceKey {
    /// Create a key from its parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a Service object.
    #[must_use]
    pub fn of(service: &Service) -> Self {
        Self::new(service.namespace().unwrap_or_default(), service.name_any())
    }

    /// Name segment of this service's node label.
    ///
    /// `namespace.name` when it fits the 63 character label limit, otherwise a
    /// truncated form suffixed with a digest of the full identity.
    #[must_use]
    pub fn label_name(&self) -> String {
        let full = format!("{}.{}", self.namespace, self.name);
        if full.len() <= LABEL_NAME_MAX_LEN {
            return full;
        }

        let digest = Sha256::digest(format!("{}/{}", self.namespace, self.name).as_bytes());
        let hash: String = digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>()
            .chars()
            .take(LABEL_HASH_LEN)
            .collect();

        let keep = LABEL_NAME_MAX_LEN - LABEL_HASH_LEN - 1;
        let head = full[..keep].trim_end_matches(['-', '.']);
        format!("{head}-{hash}")
    }

    /// Full key of this service's node label.
    #[must_use]
    pub fn node_label_key(&self) -> String {
        format!("{NODE_SERVICE_LABEL_PREFIX}{}", self.label_name())
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The set of services a node backs, as recorded in its labels.
///
/// Only labels under [`NODE_SERVICE_LABEL_PREFIX`] with a non-empty value count;
/// all other node labels are left untouched by [`NodeServiceLabels::write_to`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeServiceLabels {
    services: BTreeSet<String>,
}

impl NodeServiceLabels {
    /// Read the per-service labels of a node.
    #[must_use]
    pub fn of(node: &Node) -> Self {
        let services = node
            .labels()
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .filter_map(|(key, _)| key.strip_prefix(NODE_SERVICE_LABEL_PREFIX))
            .map(ToString::to_string)
            .collect();
        Self { services }
    }

    /// True if the node backs the service.
    #[must_use]
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.services.contains(&key.label_name())
    }

    /// Record the service; returns false if it was already present.
    pub fn insert(&mut self, key: &ServiceKey) -> bool {
        self.services.insert(key.label_name())
    }

    /// Forget the service; returns false if it was not present.
    pub fn remove(&mut self, key: &ServiceKey) -> bool {
        self.services.remove(&key.label_name())
    }

    /// Number of services backed by the node.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True if the node backs no service.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Replace the node's per-service labels with this set.
    pub fn write_to(&self, node: &mut Node) {
        let labels = node.labels_mut();
        labels.retain(|key, _| !key.starts_with(NODE_SERVICE_LABEL_PREFIX));
        for service in &self.services {
            labels.insert(
                format!("{NODE_SERVICE_LABEL_PREFIX}{service}"),
                NODE_SERVICE_LABEL_VALUE.to_string(),
            );
        }
    }
}

/// Name of the node a Service is bound to, if any.
#[must_use]
pub fn bound_node(service: &Service) -> Option<&str> {
    service
        .annotations()
        .get(SERVICE_NODE_KEY)
        .or_else(|| service.labels().get(SERVICE_NODE_KEY))
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// Record that `service` is served by `node_name`.
///
/// Returns the patched Service.
///
/// # Errors
///
/// Returns an error if either patch fails, including [`Error::Conflict`] when
/// `service` is stale and [`Error::NotFound`] when the node vanished.
pub async fn bind(cluster: &dyn ClusterApi, service: &Service, node_name: &str) -> Result<Service> {
    let key = ServiceKey::of(service);

    let mut desired = service.clone();
    desired
        .annotations_mut()
        .insert(SERVICE_NODE_KEY.to_string(), node_name.to_string());
    desired
        .labels_mut()
        .insert(SERVICE_NODE_KEY.to_string(), node_name.to_string());
    let updated = cluster.patch_service(service, &desired).await?;

    let node = cluster
        .get_node(node_name)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: KIND_NODE,
            name: node_name.to_string(),
        })?;
    add_node_label(cluster, &key, &node).await?;

    metrics::record_binding_created();
    info!(service = %key, node = %node_name, "Bound service to node");
    Ok(updated)
}

/// Make sure `node` carries the per-service label of `key`.
///
/// `node` may be slightly stale; it is only used to skip the write when the
/// label is already present. Any write is made against a fresh read.
///
/// # Errors
///
/// Returns an error if the node cannot be read or patched.
pub async fn ensure_node_label(cluster: &dyn ClusterApi, key: &ServiceKey, node: &Node) -> Result<()> {
    if NodeServiceLabels::of(node).contains(key) {
        return Ok(());
    }
    let node_name = node.name_any();
    let Some(latest) = cluster.get_node(&node_name).await? else {
        return Err(Error::NotFound {
            kind: KIND_NODE,
            name: node_name,
        });
    };
    add_node_label(cluster, key, &latest).await
}

async fn add_node_label(cluster: &dyn ClusterApi, key: &ServiceKey, node: &Node) -> Result<()> {
    let mut labels = NodeServiceLabels::of(node);
    if !labels.insert(key) {
        return Ok(());
    }
    let mut desired = node.clone();
    labels.write_to(&mut desired);
    cluster.patch_node(node, &desired).await?;
    info!(
        label = %key.node_label_key(),
        node = %node.name_any(),
        "Added service label to node"
    );
    Ok(())
}

/// Release the binding of `service`.
///
/// Removes the per-service label from the node named by the annotation, then
/// the Service annotation and label (and, with `clear_status`, the recorded
/// ingress). A node that no longer exists counts as already unbound.
///
/// Returns the patched Service.
///
/// # Errors
///
/// Returns an error if the node cannot be patched for a reason other than being
/// gone, leaving the Service untouched, or if the Service patch fails.
pub async fn unbind(cluster: &dyn ClusterApi, service: &Service, clear_status: bool) -> Result<Service> {
    let key = ServiceKey::of(service);
    let node_name = bound_node(service).map(ToString::to_string);

    if let Some(node_name) = node_name.as_deref() {
        remove_node_label(cluster, &key, node_name).await?;
    }

    let mut desired = service.clone();
    desired.annotations_mut().remove(SERVICE_NODE_KEY);
    desired.labels_mut().remove(SERVICE_NODE_KEY);
    if clear_status {
        if let Some(status) = desired.status.as_mut() {
            status.load_balancer = Some(LoadBalancerStatus::default());
        }
    }
    let updated = cluster.patch_service(service, &desired).await?;

    if let Some(node_name) = node_name {
        metrics::record_binding_released();
        info!(service = %key, node = %node_name, "Released service binding");
    }
    Ok(updated)
}

async fn remove_node_label(cluster: &dyn ClusterApi, key: &ServiceKey, node_name: &str) -> Result<()> {
    let Some(node) = cluster.get_node(node_name).await? else {
        debug!(service = %key, node = %node_name, "Node gone, binding already released");
        return Ok(());
    };
    let mut labels = NodeServiceLabels::of(&node);
    if !labels.remove(key) {
        return Ok(());
    }
    let mut desired = node.clone();
    labels.write_to(&mut desired);
    match cluster.patch_node(&node, &desired).await {
        Ok(_) => {
            info!(
                label = %key.node_label_key(),
                node = %node_name,
                "Removed service label from node"
            );
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(service = %key, node = %node_name, "Node deleted during unbind");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "binding_tests.rs"]
mod binding_tests;
