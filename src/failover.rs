// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The set of failover prefixes this controller may reroute.
//!
//! The set is parsed once at startup and shared read-only by every
//! reconciliation, so it is safe to use from concurrent controllers.

use crate::constants::{IP_FAMILY_IPV4, IP_FAMILY_IPV6};
use crate::errors::ConfigError;
use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;

/// Address family of an IP address or requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpFamily {
    /// IPv4
    V4,
    /// IPv6
    V6,
}

impl IpFamily {
    /// Family of the given address.
    #[must_use]
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// Parse a `Service.spec.ipFamilies` entry (`IPv4` / `IPv6`).
    #[must_use]
    pub fn from_k8s(value: &str) -> Option<Self> {
        match value {
            IP_FAMILY_IPV4 => Some(Self::V4),
            IP_FAMILY_IPV6 => Some(Self::V6),
            _ => None,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str(IP_FAMILY_IPV4),
            Self::V6 => f.write_str(IP_FAMILY_IPV6),
        }
    }
}

/// Validated, ordered, non-empty set of failover prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverPrefixes {
    prefixes: Vec<IpNet>,
}

impl FailoverPrefixes {
    /// Parse a list of CIDR strings, keeping the configured order.
    ///
    /// Entries are trimmed; blank entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPrefix`] for an entry that is not a CIDR
    /// prefix and [`ConfigError::MissingFailover`] when no entry remains.
    pub fn parse<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let prefix = entry
                .parse::<IpNet>()
                .map_err(|source| ConfigError::InvalidPrefix {
                    entry: entry.to_string(),
                    source,
                })?;
            prefixes.push(prefix);
        }
        if prefixes.is_empty() {
            return Err(ConfigError::MissingFailover);
        }
        Ok(Self { prefixes })
    }

    /// True iff `addr` falls within any configured prefix.
    #[must_use]
    pub fn is_failover_ip(&self, addr: IpAddr) -> bool {
        self.prefixes.iter().any(|prefix| prefix.contains(&addr))
    }

    /// Prefixes in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &IpNet> {
        self.prefixes.iter()
    }

    /// Number of configured prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// True if no prefix is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[cfg(test)]
#[path = "failover_tests.rs"]
mod failover_tests;
