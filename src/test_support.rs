// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fakes of the SCP directory and the cluster API, plus object builders.
//!
//! The fakes keep just enough state to exercise the engine end to end:
//! routing moves an address between servers, and cluster patches are merge
//! patches guarded by `resourceVersion` like the real API server.

use crate::binding::{NodeServiceLabels, ServiceKey};
use crate::cluster::patch::object_patch;
use crate::cluster::ClusterApi;
use crate::constants::{
    CONDITION_STATUS_TRUE, KIND_NODE, KIND_SERVICE, NODE_CONDITION_READY, SERVER_STATE_OFFLINE,
    SERVICE_TYPE_LOAD_BALANCER,
};
use crate::errors::{Error, Result, ScpError};
use crate::failover::FailoverPrefixes;
use crate::labels::SERVICE_NODE_KEY;
use crate::scp::{parse_reported_ip, IpRoute, ServerDirectory, ServerInfo, ServerInterface};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Node, NodeCondition, NodeSpec, NodeStatus, Service,
    ServiceSpec, ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const PUBLIC_IPV4: &str = "198.51.100.10";
pub const PUBLIC_IPV6: &str = "2001:db8:1::/64";
pub const PRIVATE_IPV4: &str = "10.1.0.10";

// ---------------------------------------------------------------------------
// Remote directory
// ---------------------------------------------------------------------------

/// A server known to [`FakeDirectory`].
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    pub status: String,
    pub interfaces: Vec<ServerInterface>,
    pub ips: Vec<String>,
}

impl FakeServer {
    pub fn online() -> Self {
        Self {
            status: "online".to_string(),
            ..Self::default()
        }
    }

    pub fn offline() -> Self {
        Self {
            status: SERVER_STATE_OFFLINE.to_string(),
            ..Self::default()
        }
    }

    /// Add a dual-stack interface.
    pub fn with_public_interface(mut self, mac: &str) -> Self {
        self.interfaces.push(ServerInterface {
            mac: mac.to_string(),
            ipv4: vec![PUBLIC_IPV4.to_string()],
            ipv6: vec![PUBLIC_IPV6.to_string()],
        });
        self
    }

    /// Add an IPv4-only interface.
    pub fn with_private_interface(mut self, mac: &str) -> Self {
        self.interfaces.push(ServerInterface {
            mac: mac.to_string(),
            ipv4: vec![PRIVATE_IPV4.to_string()],
            ipv6: Vec::new(),
        });
        self
    }

    /// Report `ip` as routed to / assigned to this server.
    pub fn holding(mut self, ip: &str) -> Self {
        self.ips.push(ip.to_string());
        self
    }
}

/// In-memory [`ServerDirectory`].
#[derive(Default)]
pub struct FakeDirectory {
    servers: Mutex<Vec<(String, FakeServer)>>,
    routes: Mutex<Vec<IpRoute>>,
    failing: Mutex<HashSet<String>>,
    reject_routes: AtomicBool,
    rejected_addresses: Mutex<HashSet<IpAddr>>,
    ip_queries: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(self, name: &str, server: FakeServer) -> Self {
        self.servers
            .lock()
            .unwrap()
            .push((name.to_string(), server));
        self
    }

    /// Every routing call received so far.
    pub fn routes(&self) -> Vec<IpRoute> {
        self.routes.lock().unwrap().clone()
    }

    /// Number of `server_ips` calls received so far.
    pub fn ip_queries(&self) -> usize {
        self.ip_queries.load(Ordering::SeqCst)
    }

    /// Make routing calls return `false` without moving anything.
    pub fn reject_routes(&self) {
        self.reject_routes.store(true, Ordering::SeqCst);
    }

    /// Make routing calls for `address` return `false`.
    pub fn reject_address(&self, address: &str) {
        self.rejected_addresses
            .lock()
            .unwrap()
            .insert(address.parse().unwrap());
    }

    /// Make every call naming `server` fail with a SOAP fault.
    pub fn fail_server(&self, server: &str) {
        self.failing.lock().unwrap().insert(server.to_string());
    }

    pub fn set_status(&self, server: &str, status: &str) {
        for (name, entry) in self.servers.lock().unwrap().iter_mut() {
            if name == server {
                entry.status = status.to_string();
            }
        }
    }

    /// Addresses currently held by `server`.
    pub fn ips_of(&self, server: &str) -> Vec<String> {
        self.servers
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == server)
            .map(|(_, entry)| entry.ips.clone())
            .unwrap_or_default()
    }

    fn lookup(&self, server: &str) -> std::result::Result<FakeServer, ScpError> {
        if self.failing.lock().unwrap().contains(server) {
            return Err(fault("injected failure"));
        }
        self.servers
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == server)
            .map(|(_, entry)| entry.clone())
            .ok_or_else(|| fault("validation error: unknown vserver"))
    }
}

fn fault(message: &str) -> ScpError {
    ScpError::Fault {
        code: "soap:Server".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ServerDirectory for FakeDirectory {
    async fn list_servers(&self) -> std::result::Result<Vec<String>, ScpError> {
        Ok(self
            .servers
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn server_state(&self, server: &str) -> std::result::Result<String, ScpError> {
        Ok(self.lookup(server)?.status)
    }

    async fn server_info(&self, server: &str) -> std::result::Result<ServerInfo, ScpError> {
        let entry = self.lookup(server)?;
        let mut ips: Vec<String> = entry
            .interfaces
            .iter()
            .flat_map(|iface| iface.ipv4.iter().chain(iface.ipv6.iter()).cloned())
            .collect();
        ips.extend(entry.ips.iter().cloned());
        Ok(ServerInfo {
            name: server.to_string(),
            status: entry.status,
            ips,
            interfaces: entry.interfaces,
        })
    }

    async fn server_ips(&self, server: &str) -> std::result::Result<Vec<String>, ScpError> {
        self.ip_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(server)?.ips)
    }

    async fn route_ip(&self, route: &IpRoute) -> std::result::Result<bool, ScpError> {
        self.lookup(&route.server)?;
        self.routes.lock().unwrap().push(route.clone());
        if self.reject_routes.load(Ordering::SeqCst)
            || self.rejected_addresses.lock().unwrap().contains(&route.address)
        {
            return Ok(false);
        }
        for (name, entry) in self.servers.lock().unwrap().iter_mut() {
            entry
                .ips
                .retain(|ip| parse_reported_ip(ip) != Some(route.address));
            if *name == route.server {
                entry.ips.push(route.address.to_string());
            }
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Cluster API
// ---------------------------------------------------------------------------

/// Error a [`FakeCluster`] returns for node patches once armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    NotFound,
    Conflict,
}

/// In-memory [`ClusterApi`] with merge-patch and `resourceVersion` semantics.
#[derive(Default)]
pub struct FakeCluster {
    nodes: Mutex<BTreeMap<String, Node>>,
    services: Mutex<BTreeMap<(String, String), Service>>,
    version: AtomicUsize,
    node_patches: AtomicUsize,
    service_patches: AtomicUsize,
    deleted_nodes: Mutex<Vec<String>>,
    node_patch_failure: Mutex<Option<InjectedFailure>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Store a node, assigning a fresh `resourceVersion`; returns the stored copy.
    pub fn add_node(&self, mut node: Node) -> Node {
        node.metadata.resource_version = Some(self.next_version());
        self.nodes
            .lock()
            .unwrap()
            .insert(node.name_any(), node.clone());
        node
    }

    /// Store a service, assigning a fresh `resourceVersion`; returns the stored copy.
    pub fn add_service(&self, mut service: Service) -> Service {
        service.metadata.resource_version = Some(self.next_version());
        let key = (service.namespace().unwrap_or_default(), service.name_any());
        self.services.lock().unwrap().insert(key, service.clone());
        service
    }

    pub fn remove_node(&self, name: &str) {
        self.nodes.lock().unwrap().remove(name);
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(name).cloned()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.services
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of nodes carrying the per-service label of `key`.
    pub fn nodes_labelled_for(&self, key: &ServiceKey) -> Vec<String> {
        self.nodes
            .lock()
            .unwrap()
            .values()
            .filter(|node| NodeServiceLabels::of(node).contains(key))
            .map(ResourceExt::name_any)
            .collect()
    }

    pub fn node_patches(&self) -> usize {
        self.node_patches.load(Ordering::SeqCst)
    }

    pub fn service_patches(&self) -> usize {
        self.service_patches.load(Ordering::SeqCst)
    }

    pub fn deleted_nodes(&self) -> Vec<String> {
        self.deleted_nodes.lock().unwrap().clone()
    }

    pub fn fail_node_patches(&self, failure: InjectedFailure) {
        *self.node_patch_failure.lock().unwrap() = Some(failure);
    }

    pub fn heal_node_patches(&self) {
        *self.node_patch_failure.lock().unwrap() = None;
    }
}

/// Apply an RFC 7386 merge patch in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                apply_merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn patched<K>(stored: &K, observed: &K, desired: &K, kind: &'static str, version: String) -> Result<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned,
{
    let name = stored.name_any();
    if stored.resource_version() != observed.resource_version() {
        return Err(Error::Conflict { kind, name });
    }
    let patch = object_patch(
        &serde_json::to_value(observed)?,
        &serde_json::to_value(desired)?,
    );
    if patch.is_empty() {
        return Ok(stored.clone());
    }
    let mut value = serde_json::to_value(stored)?;
    for part in [patch.main, patch.status].into_iter().flatten() {
        apply_merge_patch(&mut value, &part);
    }
    let mut updated: K = serde_json::from_value(value)?;
    updated.meta_mut().resource_version = Some(version);
    Ok(updated)
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.node(name))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        Ok(self.service(namespace, name))
    }

    async fn patch_node(&self, observed: &Node, desired: &Node) -> Result<Node> {
        let name = observed.name_any();
        match *self.node_patch_failure.lock().unwrap() {
            Some(InjectedFailure::NotFound) => {
                return Err(Error::NotFound { kind: KIND_NODE, name })
            }
            Some(InjectedFailure::Conflict) => {
                return Err(Error::Conflict { kind: KIND_NODE, name })
            }
            None => {}
        }
        let version = self.next_version();
        let mut nodes = self.nodes.lock().unwrap();
        let stored = nodes.get(&name).ok_or_else(|| Error::NotFound {
            kind: KIND_NODE,
            name: name.clone(),
        })?;
        let updated = patched(stored, observed, desired, KIND_NODE, version)?;
        nodes.insert(name, updated.clone());
        self.node_patches.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn patch_service(&self, observed: &Service, desired: &Service) -> Result<Service> {
        let key = (observed.namespace().unwrap_or_default(), observed.name_any());
        let version = self.next_version();
        let mut services = self.services.lock().unwrap();
        let stored = services.get(&key).ok_or_else(|| Error::NotFound {
            kind: KIND_SERVICE,
            name: key.1.clone(),
        })?;
        let updated = patched(stored, observed, desired, KIND_SERVICE, version)?;
        services.insert(key, updated.clone());
        self.service_patches.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn services_bound_to(&self, node_name: &str) -> Result<Vec<Service>> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .values()
            .filter(|service| {
                service.labels().get(SERVICE_NODE_KEY).map(String::as_str) == Some(node_name)
            })
            .cloned()
            .collect())
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        self.nodes.lock().unwrap().remove(name);
        self.deleted_nodes.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn node_with_readiness(name: &str, ready: bool) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(NodeSpec::default()),
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: NODE_CONDITION_READY.to_string(),
                status: if ready {
                    CONDITION_STATUS_TRUE.to_string()
                } else {
                    "False".to_string()
                },
                ..NodeCondition::default()
            }]),
            ..NodeStatus::default()
        }),
    }
}

pub fn ready_node(name: &str) -> Node {
    node_with_readiness(name, true)
}

pub fn not_ready_node(name: &str) -> Node {
    node_with_readiness(name, false)
}

/// A `type: LoadBalancer` Service declaring the given IP families.
pub fn lb_service(namespace: &str, name: &str, families: &[&str]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(SERVICE_TYPE_LOAD_BALANCER.to_string()),
            ip_families: if families.is_empty() {
                None
            } else {
                Some(families.iter().map(ToString::to_string).collect())
            },
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

/// Replace the recorded ingress of a Service.
pub fn with_ingress(mut service: Service, ips: &[&str]) -> Service {
    service.status = Some(ServiceStatus {
        load_balancer: Some(LoadBalancerStatus {
            ingress: Some(
                ips.iter()
                    .map(|ip| LoadBalancerIngress {
                        ip: Some(ip.to_string()),
                        ..LoadBalancerIngress::default()
                    })
                    .collect(),
            ),
        }),
        ..ServiceStatus::default()
    });
    service
}

/// Record a binding to `node` on the Service side only.
pub fn bound_to(mut service: Service, node: &str) -> Service {
    service
        .annotations_mut()
        .insert(SERVICE_NODE_KEY.to_string(), node.to_string());
    service
        .labels_mut()
        .insert(SERVICE_NODE_KEY.to_string(), node.to_string());
    service
}

/// Add the per-service label of `service` to `node`.
pub fn labelled_for(mut node: Node, service: &Service) -> Node {
    let mut labels = NodeServiceLabels::of(&node);
    labels.insert(&ServiceKey::of(service));
    labels.write_to(&mut node);
    node
}

pub fn prefixes(entries: &[&str]) -> Arc<FailoverPrefixes> {
    Arc::new(FailoverPrefixes::parse(entries.iter().copied()).expect("valid test prefixes"))
}

/// Ingress IPs recorded on a Service.
pub fn ingress_of(service: &Service) -> Vec<String> {
    service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| ingress.iter().filter_map(|entry| entry.ip.clone()).collect())
        .unwrap_or_default()
}
