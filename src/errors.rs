// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the failover controller.
//!
//! This module provides specialized error types for:
//! - Configuration loading and validation (fatal at startup)
//! - Server Control Panel (SCP) web service calls
//! - Kubernetes API reads and patches
//!
//! Remote and cluster errors abort the current reconciliation and are returned to
//! the caller. Nothing in this crate retries internally; the controllers requeue.

use thiserror::Error;

/// Errors raised while loading or validating the cloud configuration.
///
/// All of these are fatal: they are reported before any controller starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No SCP login name in the file, ConfigMap or Secret
    #[error("missing cloud username")]
    MissingUsername,

    /// No SCP password in the file or Secret
    #[error("missing cloud password")]
    MissingPassword,

    /// The failover prefix list is empty
    #[error("missing cloud failover")]
    MissingFailover,

    /// A failover entry is not a valid CIDR prefix
    #[error("invalid failover prefix '{entry}': {source}")]
    InvalidPrefix {
        /// The offending configuration entry
        entry: String,
        /// Parser error
        source: ipnet::AddrParseError,
    },

    /// The SCP endpoint is not a valid URL
    #[error("invalid SCP endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        /// The configured endpoint
        endpoint: String,
        /// Parser error
        source: url::ParseError,
    },

    /// A `name@namespace` object reference could not be parsed
    #[error("invalid object reference '{0}', expected name@namespace")]
    InvalidReference(String),

    /// The configuration file could not be read
    #[error("failed to read cloud config '{path}': {source}")]
    Read {
        /// Path of the configuration file
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML or has unknown fields
    #[error("failed to parse cloud config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A referenced ConfigMap or Secret could not be fetched
    #[error("failed to load {kind} '{name}': {source}")]
    Reference {
        /// Kind of the referenced object
        kind: &'static str,
        /// `namespace/name` of the referenced object
        name: String,
        /// Kubernetes API error
        source: kube::Error,
    },
}

/// Errors returned by the SCP web service client.
#[derive(Error, Debug)]
pub enum ScpError {
    /// The HTTP request could not be sent or the body could not be read
    #[error("SCP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The web service answered with a non-success status and no SOAP fault
    #[error("SCP returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// The web service answered with a SOAP fault
    #[error("SCP fault {code}: {message}")]
    Fault {
        /// `faultcode` element
        code: String,
        /// `faultstring` element
        message: String,
    },

    /// The response body could not be interpreted
    #[error("malformed SCP response: {0}")]
    MalformedResponse(String),
}

/// Composite error type returned by the reconciliation engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error surfaced through the engine
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Remote directory query or routing change failed
    #[error(transparent)]
    Remote(#[from] ScpError),

    /// Kubernetes API call failed
    #[error("cluster API error: {0}")]
    Cluster(#[from] kube::Error),

    /// A patch was rejected because the observed object is stale (HTTP 409)
    #[error("{kind} '{name}' was modified concurrently")]
    Conflict {
        /// Kind of the patched object
        kind: &'static str,
        /// Name of the patched object
        name: String,
    },

    /// A referenced object does not exist (HTTP 404)
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing object
        kind: &'static str,
        /// Name of the missing object
        name: String,
    },

    /// The remote directory reported an address that does not parse
    #[error("server '{server}' reported invalid address '{address}'")]
    InvalidAddress {
        /// Server the address belongs to
        server: String,
        /// The unparsable address
        address: String,
    },

    /// An object could not be converted for patching
    #[error("failed to serialize patch: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Map a Kubernetes API error for a specific object.
    ///
    /// HTTP 404 becomes [`Error::NotFound`] and HTTP 409 becomes [`Error::Conflict`];
    /// anything else is kept as [`Error::Cluster`].
    #[must_use]
    pub fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound {
                kind,
                name: name.to_string(),
            },
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict {
                kind,
                name: name.to_string(),
            },
            other => Self::Cluster(other),
        }
    }

    /// Returns true if the referenced object no longer exists.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short category label for metrics.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Remote(_) | Self::InvalidAddress { .. } => "remote_api",
            Self::Cluster(_) | Self::Serialization(_) => "cluster_api",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
