// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controllers driving the cloud provider from cluster events.
//!
//! - [`service`] - assigns failover IPs to `LoadBalancer` Services
//! - [`node`] - keeps Nodes in line with their servers
//!
//! Both requeue on error after a fixed delay and periodically after success,
//! so state drifting on the SCP side is picked up without a watch event.

pub mod node;
pub mod service;
