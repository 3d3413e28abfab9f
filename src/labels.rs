// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label, annotation, taint and finalizer keys.
//!
//! These keys are part of the on-cluster contract: a binding written by one
//! controller release must be readable by the next, so none of them may change.

// ============================================================================
// Binding Keys
// ============================================================================

/// Annotation and label on a `Service` naming the node that holds its failover IPs
pub const SERVICE_NODE_KEY: &str = "k8s.mback2k.net/nc-failover-node";

/// Prefix of the per-service label set on a `Node` that backs a Service
pub const NODE_SERVICE_LABEL_PREFIX: &str = "nc-failover-service.k8s.mback2k.net/";

/// Value of a per-service node label
pub const NODE_SERVICE_LABEL_VALUE: &str = "true";

// ============================================================================
// Well-Known Kubernetes Keys
// ============================================================================

/// Node annotation carrying operator-declared internal IPs (comma separated)
pub const PROVIDED_NODE_IP_ANNOTATION: &str = "alpha.kubernetes.io/provided-node-ip";

/// Finalizer guarding release of a Service's binding before deletion
pub const LOAD_BALANCER_CLEANUP_FINALIZER: &str = "service.kubernetes.io/load-balancer-cleanup";

/// Taint placed by kubelet on nodes waiting for cloud initialization
pub const TAINT_UNINITIALIZED: &str = "node.cloudprovider.kubernetes.io/uninitialized";

/// Taint marking a node whose server is powered off
pub const TAINT_SHUTDOWN: &str = "node.cloudprovider.kubernetes.io/shutdown";

/// Effect used for the shutdown taint
pub const TAINT_EFFECT_NO_SCHEDULE: &str = "NoSchedule";
