// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node existence, shutdown and address discovery from the SCP directory.

use crate::binding;
use crate::cluster::ClusterApi;
use crate::constants::{NODE_ADDRESS_EXTERNAL_IP, NODE_ADDRESS_INTERNAL_IP, PROVIDER_NAME, SERVER_STATE_OFFLINE};
use crate::errors::{Error, Result};
use crate::failover::FailoverPrefixes;
use crate::labels::PROVIDED_NODE_IP_ANNOTATION;
use crate::scp::{parse_reported_ip, ServerDirectory};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, NodeAddress};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity and addresses the controller reports for a node.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMetadata {
    /// `nc://<server name>`
    pub provider_id: String,
    /// Node addresses, external first, without failover IPs
    pub node_addresses: Vec<NodeAddress>,
}

/// Instance lookups for cluster nodes.
#[async_trait]
pub trait Instances: Send + Sync {
    /// True iff the directory lists a server named like the node.
    async fn instance_exists(&self, node: &Node) -> Result<bool>;

    /// True iff the node's server is offline.
    ///
    /// A shutdown node loses every service binding it holds.
    async fn instance_shutdown(&self, node: &Node) -> Result<bool>;

    /// Provider ID and addresses of the node.
    async fn instance_metadata(&self, node: &Node) -> Result<InstanceMetadata>;
}

/// [`Instances`] backed by the SCP directory.
#[derive(Clone)]
pub struct FailoverInstances {
    cluster: Arc<dyn ClusterApi>,
    directory: Arc<dyn ServerDirectory>,
    prefixes: Arc<FailoverPrefixes>,
}

impl FailoverInstances {
    /// Create an observer over the given collaborators.
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        directory: Arc<dyn ServerDirectory>,
        prefixes: Arc<FailoverPrefixes>,
    ) -> Self {
        Self {
            cluster,
            directory,
            prefixes,
        }
    }

    /// Release every service bound to a node that went offline.
    async fn release_bindings(&self, node_name: &str) -> Result<()> {
        let services = self.cluster.services_bound_to(node_name).await?;
        if services.is_empty() {
            return Ok(());
        }
        info!(
            node = %node_name,
            count = services.len(),
            "Releasing service bindings of shutdown node"
        );
        for service in &services {
            binding::unbind(self.cluster.as_ref(), service, true).await?;
        }
        Ok(())
    }

    fn is_failover_address(&self, address: &str) -> bool {
        parse_reported_ip(address).is_some_and(|ip| self.prefixes.is_failover_ip(ip))
    }
}

fn push_unique(addresses: &mut Vec<NodeAddress>, address_type: &str, address: String) -> bool {
    let entry = NodeAddress {
        type_: address_type.to_string(),
        address,
    };
    if addresses.contains(&entry) {
        return false;
    }
    addresses.push(entry);
    true
}

#[async_trait]
impl Instances for FailoverInstances {
    async fn instance_exists(&self, node: &Node) -> Result<bool> {
        let name = node.name_any();
        let servers = self.directory.list_servers().await?;
        let exists = servers.iter().any(|server| *server == name);
        if exists {
            debug!(node = %name, "Server found");
        } else {
            warn!(node = %name, "Server NOT found");
        }
        Ok(exists)
    }

    async fn instance_shutdown(&self, node: &Node) -> Result<bool> {
        let name = node.name_any();
        let state = self.directory.server_state(&name).await?;
        debug!(node = %name, state = %state, "Queried server state");
        if state != SERVER_STATE_OFFLINE {
            return Ok(false);
        }
        self.release_bindings(&name).await?;
        Ok(true)
    }

    async fn instance_metadata(&self, node: &Node) -> Result<InstanceMetadata> {
        let name = node.name_any();
        let info = self.directory.server_info(&name).await?;

        let mut addresses: Vec<NodeAddress> = node
            .status
            .as_ref()
            .and_then(|status| status.addresses.clone())
            .unwrap_or_default();
        addresses.retain(|entry| {
            let keep = !self.is_failover_address(&entry.address);
            if !keep {
                info!(node = %name, address = %entry.address, "Dropping failover IP from node addresses");
            }
            keep
        });

        for reported in &info.ips {
            let ip = parse_reported_ip(reported).ok_or_else(|| Error::InvalidAddress {
                server: info.name.clone(),
                address: reported.clone(),
            })?;
            if self.prefixes.is_failover_ip(ip) {
                debug!(node = %name, address = %ip, "Skipping failover IP");
                continue;
            }
            if push_unique(&mut addresses, NODE_ADDRESS_EXTERNAL_IP, ip.to_string()) {
                debug!(node = %name, address = %ip, "Adding external IP");
            }
        }

        if let Some(provided) = node.annotations().get(PROVIDED_NODE_IP_ANNOTATION) {
            for ip in provided.split(',').map(str::trim).filter(|ip| !ip.is_empty()) {
                if self.is_failover_address(ip) {
                    warn!(node = %name, address = %ip, "Ignoring provided node IP inside a failover prefix");
                    continue;
                }
                if push_unique(&mut addresses, NODE_ADDRESS_INTERNAL_IP, ip.to_string()) {
                    debug!(node = %name, address = %ip, "Adding internal IP");
                }
            }
        }

        Ok(InstanceMetadata {
            provider_id: format!("{PROVIDER_NAME}://{}", info.name),
            node_addresses: addresses,
        })
    }
}

#[cfg(test)]
#[path = "instances_tests.rs"]
mod instances_tests;
