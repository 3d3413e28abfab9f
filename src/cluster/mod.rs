// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Access to the Kubernetes objects the engine reads and annotates.
//!
//! The engine never writes whole objects. Every mutation is expressed as an
//! observed object plus a modified copy; the implementation sends only the
//! difference as a merge patch, guarded by the observed `resourceVersion`. A
//! patch built from a stale observation fails with [`Error::Conflict`] and is
//! left to the caller to retry.
//!
//! [`Error::Conflict`]: crate::errors::Error::Conflict

pub mod client;
pub mod patch;

pub use client::KubeCluster;

use crate::errors::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Service};

/// Cluster API operations used by the reconcilers and controllers.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a node by name; `None` if it does not exist.
    async fn get_node(&self, name: &str) -> Result<Option<Node>>;

    /// Fetch a service; `None` if it does not exist.
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    /// Patch a node from `observed` to `desired` (metadata, spec and status).
    async fn patch_node(&self, observed: &Node, desired: &Node) -> Result<Node>;

    /// Patch a service from `observed` to `desired` (metadata, spec and status).
    async fn patch_service(&self, observed: &Service, desired: &Service) -> Result<Service>;

    /// All services whose binding label names `node_name`.
    async fn services_bound_to(&self, node_name: &str) -> Result<Vec<Service>>;

    /// Delete a node object; deleting a missing node succeeds.
    async fn delete_node(&self, name: &str) -> Result<()>;
}
