// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Failover-IP load balancer reconciliation.
//!
//! Each call to [`LoadBalancer::ensure_load_balancer`] re-derives the desired
//! state from the Service, the ready nodes and the SCP directory. Nothing is
//! kept in memory between calls; the binding record on the cluster objects is
//! the only persisted state.
//!
//! A reconciliation walks three stages and stops at the first that yields an
//! ingress set:
//!
//! 1. **Reuse** - the recorded binding points at a ready node that still holds
//!    every recorded ingress IP and those cover every needed family.
//! 2. **Adopt** - some ready node already holds failover IPs covering every
//!    needed family (for example after a routing change whose binding write
//!    failed). The binding is moved to that node.
//! 3. **Allocate** - the first online ready node with a dual-stack interface gets
//!    the configured prefixes routed to it, one per needed family. Allocation
//!    is skipped when the prefixes lack a needed family, and ends at the first
//!    node that accepted any route, committed only if every family is covered.
//!
//! Ready nodes are visited in lexicographic order of their names. Only stage 3
//! changes routing; stages 2 and 3 rewrite the binding.

pub mod plan;

use crate::binding::{self, bound_node, ServiceKey};
use crate::cluster::ClusterApi;
use crate::constants::SERVER_STATE_OFFLINE;
use crate::errors::Result;
use crate::failover::{FailoverPrefixes, IpFamily};
use crate::metrics;
use crate::scp::{IpRoute, ServerDirectory, ServerInfo};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LoadBalancerStatus, Node, Service};
use plan::{
    binding_is_valid, claim_assigned, covers, prefixes_cover, public_interfaces, ready_nodes,
    recorded_ingress, status_for, FamilyNeeds,
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Load-balancer lifecycle for Services of `type: LoadBalancer`.
#[async_trait]
pub trait LoadBalancer: Send + Sync {
    /// Status of the recorded binding if it is still valid.
    async fn get_load_balancer(&self, service: &Service) -> Result<Option<LoadBalancerStatus>>;

    /// Name of the node the Service is bound to.
    fn load_balancer_name(&self, service: &Service) -> Option<String>;

    /// Make sure the Service has failover IPs routed to one of `nodes`.
    ///
    /// Returns the ingress to publish, or `None` when no node could serve the
    /// Service right now.
    async fn ensure_load_balancer(
        &self,
        service: &Service,
        nodes: &[Node],
    ) -> Result<Option<LoadBalancerStatus>>;

    /// Same as [`LoadBalancer::ensure_load_balancer`], discarding the status.
    async fn update_load_balancer(&self, service: &Service, nodes: &[Node]) -> Result<()> {
        self.ensure_load_balancer(service, nodes).await.map(|_| ())
    }

    /// Release the Service's binding. Routing is left untouched.
    async fn ensure_load_balancer_deleted(&self, service: &Service) -> Result<()>;
}

/// [`LoadBalancer`] routing failover IPs through the SCP directory.
#[derive(Clone)]
pub struct FailoverLoadBalancer {
    cluster: Arc<dyn ClusterApi>,
    directory: Arc<dyn ServerDirectory>,
    prefixes: Arc<FailoverPrefixes>,
}

impl FailoverLoadBalancer {
    /// Create a reconciler over the given collaborators.
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

    /// Check the recorded binding against the IPs `node_name` currently holds.
    async fn validate(
        &self,
        service: &Service,
        node_name: &str,
        needs: FamilyNeeds,
    ) -> Result<Option<LoadBalancerStatus>> {
        let assigned = self.directory.server_ips(node_name).await?;
        let ingress = recorded_ingress(service);
        if binding_is_valid(&ingress, &assigned, needs) {
            debug!(
                service = %ServiceKey::of(service),
                node = %node_name,
                ingress = ?ingress,
                "Recorded failover IPs still routed to node"
            );
            return Ok(service
                .status
                .as_ref()
                .and_then(|status| status.load_balancer.clone()));
        }
        Ok(None)
    }

    /// Route one prefix per needed family to the server's public interfaces.
    ///
    /// Returns the addresses SCP accepted, in routing order.
    async fn allocate(&self, info: &ServerInfo, needs: FamilyNeeds) -> Result<Vec<IpAddr>> {
        let mut needs = needs;
        let mut routed = Vec::new();

        for iface in public_interfaces(&info.interfaces) {
            for prefix in self.prefixes.iter() {
                let family = IpFamily::of(prefix.addr());
                if !needs.wants(family) {
                    continue;
                }
                let route = IpRoute {
                    address: prefix.addr(),
                    prefix_len: prefix.prefix_len(),
                    server: info.name.clone(),
                    interface_mac: iface.mac.clone(),
                };
                let accepted = self.directory.route_ip(&route).await?;
                metrics::record_route_change(&family.to_string(), accepted);
                if accepted {
                    info!(
                        prefix = %prefix,
                        server = %info.name,
                        mac = %iface.mac,
                        "Routed failover IP"
                    );
                    needs.satisfy(family);
                    routed.push(prefix.addr());
                } else {
                    warn!(
                        prefix = %prefix,
                        server = %info.name,
                        mac = %iface.mac,
                        "Routing change rejected"
                    );
                }
                if needs.is_satisfied() {
                    return Ok(routed);
                }
            }
        }
        Ok(routed)
    }

    /// Move the binding to `node_name` and build the status for `ips`.
    async fn commit(
        &self,
        service: &Service,
        node_name: &str,
        ips: &[IpAddr],
    ) -> Result<LoadBalancerStatus> {
        let mut current = service.clone();
        if let Some(previous) = bound_node(service) {
            if previous != node_name {
                info!(
                    service = %ServiceKey::of(service),
                    from = %previous,
                    to = %node_name,
                    "Moving binding"
                );
                current = binding::unbind(self.cluster.as_ref(), service, false).await?;
            }
        }
        binding::bind(self.cluster.as_ref(), &current, node_name).await?;
        Ok(status_for(ips))
    }
}

#[async_trait]
impl LoadBalancer for FailoverLoadBalancer {
    async fn get_load_balancer(&self, service: &Service) -> Result<Option<LoadBalancerStatus>> {
        let Some(node_name) = bound_node(service) else {
            return Ok(None);
        };
        self.validate(service, node_name, FamilyNeeds::of(service))
            .await
    }

    fn load_balancer_name(&self, service: &Service) -> Option<String> {
        bound_node(service).map(ToString::to_string)
    }

    async fn ensure_load_balancer(
        &self,
        service: &Service,
        nodes: &[Node],
    ) -> Result<Option<LoadBalancerStatus>> {
        let key = ServiceKey::of(service);
        let needs = FamilyNeeds::of(service);
        let ready = ready_nodes(nodes);

        if let Some(node_name) = bound_node(service) {
            match ready.get(node_name) {
                Some(node) => {
                    if let Some(status) = self.validate(service, node_name, needs).await? {
                        binding::ensure_node_label(self.cluster.as_ref(), &key, node).await?;
                        return Ok(Some(status));
                    }
                    info!(service = %key, node = %node_name, "Recorded binding no longer valid");
                }
                None => info!(service = %key, node = %node_name, "Bound node is not ready"),
            }
        }

        debug!(service = %key, candidates = ready.len(), "Searching nodes holding failover IPs");
        for name in ready.keys() {
            let assigned = self.directory.server_ips(name).await?;
            if let Some(ips) = claim_assigned(name, &assigned, &self.prefixes, needs)? {
                info!(service = %key, node = %name, ips = ?ips, "Adopting failover IPs already on node");
                return self.commit(service, name, &ips).await.map(Some);
            }
        }

        if !prefixes_cover(&self.prefixes, needs) {
            warn!(
                service = %key,
                needs = ?needs,
                "Configured failover prefixes cannot cover every needed address family"
            );
            return Ok(None);
        }

        debug!(service = %key, "Allocating failover IPs");
        for name in ready.keys() {
            let info = self.directory.server_info(name).await?;
            if info.status == SERVER_STATE_OFFLINE {
                debug!(node = %name, "Skipping offline server");
                continue;
            }
            let ips = self.allocate(&info, needs).await?;
            if ips.is_empty() {
                continue;
            }
            if !covers(&ips, needs) {
                // Routing already moved here; no other node is tried.
                warn!(
                    service = %key,
                    node = %name,
                    ips = ?ips,
                    "Node could not take every needed address family"
                );
                return Ok(None);
            }
            info!(service = %key, node = %name, ips = ?ips, "Routed failover IPs to node");
            return self.commit(service, name, &ips).await.map(Some);
        }

        warn!(service = %key, "No ready node can serve failover IPs");
        Ok(None)
    }

    async fn ensure_load_balancer_deleted(&self, service: &Service) -> Result<()> {
        if bound_node(service).is_none() {
            return Ok(());
        }
        binding::unbind(self.cluster.as_ref(), service, true).await?;
        info!(service = %ServiceKey::of(service), "Released load balancer");
        Ok(())
    }
}
