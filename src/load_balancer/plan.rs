// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pure decisions of the load-balancer reconciler.
//!
//! Everything here works on already-fetched cluster and directory state, so the
//! outcome of a reconciliation step can be tested without any I/O.

use crate::constants::{CONDITION_STATUS_TRUE, NODE_CONDITION_READY};
use crate::errors::{Error, Result};
use crate::failover::{FailoverPrefixes, IpFamily};
use crate::scp::{parse_reported_ip, ServerInterface};
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Node, Service};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Address families a Service still needs an ingress address for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FamilyNeeds {
    /// An IPv4 address is still needed
    pub ipv4: bool,
    /// An IPv6 address is still needed
    pub ipv6: bool,
}

impl FamilyNeeds {
    /// Families declared in `spec.ipFamilies`.
    ///
    /// A Service declaring no recognised family needs IPv4 only, matching the
    /// API server's single-stack default.
    #[must_use]
    pub fn of(service: &Service) -> Self {
        let mut needs = Self::default();
        let families = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ip_families.as_deref())
            .unwrap_or_default();
        for family in families.iter().filter_map(|f| IpFamily::from_k8s(f)) {
            match family {
                IpFamily::V4 => needs.ipv4 = true,
                IpFamily::V6 => needs.ipv6 = true,
            }
        }
        if needs.is_satisfied() {
            needs.ipv4 = true;
        }
        needs
    }

    /// True if an address of `family` is still needed.
    #[must_use]
    pub fn wants(&self, family: IpFamily) -> bool {
        match family {
            IpFamily::V4 => self.ipv4,
            IpFamily::V6 => self.ipv6,
        }
    }

    /// Mark `family` as satisfied; returns true if it was still needed.
    pub fn satisfy(&mut self, family: IpFamily) -> bool {
        let slot = match family {
            IpFamily::V4 => &mut self.ipv4,
            IpFamily::V6 => &mut self.ipv6,
        };
        std::mem::replace(slot, false)
    }

    /// True once no family is needed any more.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        !self.ipv4 && !self.ipv6
    }
}

/// True if the node reports `Ready=True`.
#[must_use]
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions.iter().any(|condition| {
                condition.type_ == NODE_CONDITION_READY && condition.status == CONDITION_STATUS_TRUE
            })
        })
}

/// Ready nodes keyed by name, iterated in lexicographic order.
#[must_use]
pub fn ready_nodes(nodes: &[Node]) -> BTreeMap<String, &Node> {
    nodes
        .iter()
        .filter(|node| is_node_ready(node))
        .map(|node| (node.name_any(), node))
        .collect()
}

/// Ingress IPs currently recorded in the Service status.
#[must_use]
pub fn recorded_ingress(service: &Service) -> Vec<String> {
    service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| ingress.iter().filter_map(|entry| entry.ip.clone()).collect())
        .unwrap_or_default()
}

/// Decide whether a recorded binding still holds.
///
/// Every recorded ingress IP must still be assigned to the node, and the
/// recorded IPs together must cover every needed family. An ingress IP of a
/// family that is no longer needed does not invalidate the binding.
#[must_use]
pub fn binding_is_valid(ingress: &[String], assigned: &[String], mut needs: FamilyNeeds) -> bool {
    let assigned: Vec<IpAddr> = assigned
        .iter()
        .filter_map(|ip| parse_reported_ip(ip))
        .collect();

    for recorded in ingress {
        let Some(ip) = parse_reported_ip(recorded) else {
            return false;
        };
        if !assigned.contains(&ip) {
            return false;
        }
        needs.satisfy(IpFamily::of(ip));
    }
    needs.is_satisfied()
}

/// Pick one failover IP per needed family from the addresses a server holds.
///
/// Returns the picked IPs if every needed family is covered.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if the server reports an address that does
/// not parse.
pub fn claim_assigned(
    server: &str,
    assigned: &[String],
    prefixes: &FailoverPrefixes,
    mut needs: FamilyNeeds,
) -> Result<Option<Vec<IpAddr>>> {
    let mut claimed = Vec::new();
    for reported in assigned {
        let ip = parse_reported_ip(reported).ok_or_else(|| Error::InvalidAddress {
            server: server.to_string(),
            address: reported.clone(),
        })?;
        if prefixes.is_failover_ip(ip) && needs.satisfy(IpFamily::of(ip)) {
            claimed.push(ip);
        }
    }
    Ok(needs.is_satisfied().then_some(claimed))
}

/// Interfaces failover IPs can be routed to, in reported order.
pub fn public_interfaces(interfaces: &[ServerInterface]) -> impl Iterator<Item = &ServerInterface> {
    interfaces.iter().filter(|iface| iface.is_public())
}

/// True if `ips` covers every family in `needs`.
#[must_use]
pub fn covers(ips: &[IpAddr], mut needs: FamilyNeeds) -> bool {
    for ip in ips {
        needs.satisfy(IpFamily::of(*ip));
    }
    needs.is_satisfied()
}

/// True if the configured prefixes offer an address of every family in `needs`.
#[must_use]
pub fn prefixes_cover(prefixes: &FailoverPrefixes, needs: FamilyNeeds) -> bool {
    let addrs: Vec<IpAddr> = prefixes.iter().map(|prefix| prefix.addr()).collect();
    covers(&addrs, needs)
}

/// Load-balancer status advertising `ips`.
#[must_use]
pub fn status_for(ips: &[IpAddr]) -> LoadBalancerStatus {
    LoadBalancerStatus {
        ingress: Some(
            ips.iter()
                .map(|ip| LoadBalancerIngress {
                    ip: Some(ip.to_string()),
                    ..LoadBalancerIngress::default()
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
