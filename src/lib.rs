// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # nc-failover - failover IP controller for Kubernetes on netcup servers
//!
//! Routes the failover IPs of a netcup account to cluster nodes and publishes
//! them as the ingress of `type: LoadBalancer` Services. Node identity,
//! addresses and shutdown state come from the Server Control Panel (SCP).
//!
//! ## Modules
//!
//! - [`scp`] - SOAP client for the SCP web service
//! - [`failover`] - configured failover prefixes and address families
//! - [`binding`] - the Service to Node binding record
//! - [`load_balancer`] - failover-IP assignment and reconciliation
//! - [`instances`] - node existence, shutdown and addresses
//! - [`cluster`] - guarded reads and writes of Nodes and Services
//! - [`config`] - cloud configuration file and its references
//! - [`controllers`] - Service and Node controllers
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use nc_failover::failover::FailoverPrefixes;
//!
//! let prefixes = FailoverPrefixes::parse(["203.0.113.5/32", "2001:db8:f::/64"]).unwrap();
//! assert!(prefixes.is_failover_ip("203.0.113.5".parse().unwrap()));
//! ```

pub mod binding;
pub mod cloud;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod context;
pub mod controllers;
pub mod errors;
pub mod failover;
pub mod instances;
pub mod labels;
pub mod load_balancer;
pub mod metrics;
pub mod scp;

#[cfg(test)]
pub mod test_support;
