// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the failover controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Provider Constants
// ============================================================================

/// Provider name, used as the scheme of every node `providerID`
pub const PROVIDER_NAME: &str = "nc";

/// Provider implementation version, reported in the Kubernetes client user agent
pub const PROVIDER_VERSION: &str = "0.1";

// ============================================================================
// Server Control Panel (SCP) Web Service Constants
// ============================================================================

/// Default endpoint of the SCP end-user SOAP web service
pub const SCP_ENDPOINT: &str = "https://www.servercontrolpanel.de/WSEndUser";

/// XML namespace of the SCP end-user operations
pub const SCP_XML_NAMESPACE: &str = "http://enduser.service.web.vcp.netcup.de/";

/// SOAP 1.1 envelope namespace
pub const SOAP_ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Server state reported by SCP for a powered-off server
pub const SERVER_STATE_OFFLINE: &str = "offline";

/// Default timeout for a single SCP request (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Namespace used for `name@namespace` references that omit the namespace
pub const DEFAULT_CONFIG_NAMESPACE: &str = "kube-system";

/// Environment variable holding the cloud-config file path
pub const CLOUD_CONFIG_ENV: &str = "NC_CLOUD_CONFIG";

// ============================================================================
// Kubernetes Object Constants
// ============================================================================

/// Kubernetes `Service.spec.type` handled by this controller
pub const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";

/// IP family name for IPv4 in `Service.spec.ipFamilies`
pub const IP_FAMILY_IPV4: &str = "IPv4";

/// IP family name for IPv6 in `Service.spec.ipFamilies`
pub const IP_FAMILY_IPV6: &str = "IPv6";

/// Node condition type reporting kubelet readiness
pub const NODE_CONDITION_READY: &str = "Ready";

/// Condition status value for a positive condition
pub const CONDITION_STATUS_TRUE: &str = "True";

/// Node address type for externally reachable addresses
pub const NODE_ADDRESS_EXTERNAL_IP: &str = "ExternalIP";

/// Node address type for cluster-internal addresses
pub const NODE_ADDRESS_INTERNAL_IP: &str = "InternalIP";

/// Kind name used in errors and logs for Nodes
pub const KIND_NODE: &str = "Node";

/// Kind name used in errors and logs for Services
pub const KIND_SERVICE: &str = "Service";

/// Maximum length of the name segment of a label key
pub const LABEL_NAME_MAX_LEN: usize = 63;

/// Number of items per page when listing Services
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

// ============================================================================
// Controller Timing Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Default resync interval for managed Services (5 minutes)
pub const DEFAULT_SERVICE_RESYNC_SECS: u64 = 300;

/// Default interval between instance checks of a Node (1 minute)
pub const DEFAULT_NODE_MONITOR_SECS: u64 = 60;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
