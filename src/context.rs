// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the Service and Node controllers.
//!
//! Both controllers receive an `Arc<Context>` holding:
//! - the cloud provider (cluster access, instances and load balancer)
//! - a reflector store of Nodes, so the Service controller sees the current node
//!   set without listing Nodes on every reconciliation
//! - the requeue intervals

use crate::cloud::FailoverCloud;
use crate::constants::{DEFAULT_NODE_MONITOR_SECS, DEFAULT_SERVICE_RESYNC_SECS};
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::Store;
use std::time::Duration;

/// Requeue intervals of the controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    /// Requeue after a successful Service reconciliation
    pub service_resync: Duration,
    /// Requeue after a successful Node reconciliation
    pub node_monitor: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            service_resync: Duration::from_secs(DEFAULT_SERVICE_RESYNC_SECS),
            node_monitor: Duration::from_secs(DEFAULT_NODE_MONITOR_SECS),
        }
    }
}

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Cloud provider
    pub cloud: FailoverCloud,

    /// Reflector store of all Nodes
    pub nodes: Store<Node>,

    /// Requeue intervals
    pub intervals: Intervals,
}

impl Context {
    /// Snapshot of all Nodes currently in the store.
    #[must_use]
    pub fn node_snapshot(&self) -> Vec<Node> {
        self.nodes
            .state()
            .iter()
            .map(|node| node.as_ref().clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
