// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Server Control Panel (SCP) directory client.
//!
//! The SCP end-user web service is the remote source of truth for which servers
//! exist, whether they are running, which addresses they hold and where each
//! failover IP is routed. This module exposes it through the [`ServerDirectory`]
//! trait so the reconcilers can run against the real SOAP client or an in-memory
//! fake.
//!
//! # Architecture
//!
//! - [`soap`] - envelope construction and namespace-agnostic response parsing
//! - [`client`] - [`ScpClient`], the `reqwest` implementation of the trait
//!
//! Every call carries the login credentials; the web service holds no session.
//!
//! # Example
//!
//! ```rust,no_run
//! use nc_failover::scp::{Credentials, ScpClient, ServerDirectory};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ScpClient::new(
//!     "https://www.servercontrolpanel.de/WSEndUser".parse()?,
//!     Credentials::new("12345", "secret"),
//!     Duration::from_secs(30),
//! )?;
//! for server in client.list_servers().await? {
//!     println!("{server}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod soap;

pub use client::ScpClient;

use crate::errors::ScpError;
use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

/// Login name and password for the SCP web service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// SCP customer login name
    pub login: String,
    /// SCP web service password
    pub password: String,
}

impl Credentials {
    /// Create a credential pair.
    #[must_use]
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A network interface of a server as reported by SCP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInterface {
    /// MAC address, used as routing destination
    pub mac: String,
    /// IPv4 addresses on the interface
    pub ipv4: Vec<String>,
    /// IPv6 addresses or networks on the interface
    pub ipv6: Vec<String>,
}

impl ServerInterface {
    /// True if the interface carries both an IPv4 and an IPv6 address.
    ///
    /// Only the public interface of a server is dual-stacked, so this identifies
    /// the interface failover IPs must be routed to.
    #[must_use]
    pub fn is_public(&self) -> bool {
        !self.ipv4.is_empty() && !self.ipv6.is_empty()
    }
}

/// Server details returned by `getVServerInformation`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Canonical server name
    pub name: String,
    /// Power state (`online`, `offline`, ...)
    pub status: String,
    /// Addresses assigned to the server, optionally in CIDR notation
    pub ips: Vec<String>,
    /// Network interfaces
    pub interfaces: Vec<ServerInterface>,
}

/// A routing change moving a failover prefix to a server interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRoute {
    /// Address of the routed prefix
    pub address: IpAddr,
    /// Prefix length of the routed prefix
    pub prefix_len: u8,
    /// Destination server name
    pub server: String,
    /// Destination interface MAC
    pub interface_mac: String,
}

/// Remote directory of servers and failover routing.
///
/// All methods are read-only except [`ServerDirectory::route_ip`], which is an
/// idempotent overwrite: routing a prefix to the server that already holds it
/// succeeds without effect.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Names of all servers of the account, in the order SCP returns them.
    async fn list_servers(&self) -> Result<Vec<String>, ScpError>;

    /// Power state of a server.
    async fn server_state(&self, server: &str) -> Result<String, ScpError>;

    /// Status, canonical name and interfaces of a server.
    async fn server_info(&self, server: &str) -> Result<ServerInfo, ScpError>;

    /// Addresses currently routed to a server.
    async fn server_ips(&self, server: &str) -> Result<Vec<String>, ScpError>;

    /// Route a failover prefix to a server interface; returns the SCP verdict.
    async fn route_ip(&self, route: &IpRoute) -> Result<bool, ScpError>;
}

/// Parse an SCP address, stripping an optional CIDR suffix.
///
/// Returns `None` if what remains is not an IP address.
#[must_use]
pub fn parse_reported_ip(value: &str) -> Option<IpAddr> {
    let value = value.trim();
    let address = value.split_once('/').map_or(value, |(address, _)| address);
    address.parse().ok()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
