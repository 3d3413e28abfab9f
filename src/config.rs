// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloud configuration: the YAML file, its ConfigMap/Secret overlays and validation.
//!
//! ```yaml
//! config: nc-failover@kube-system    # optional ConfigMap: username, failover
//! secret: nc-failover@kube-system    # optional Secret: username, password
//! username: "12345"
//! password: "..."
//! failover:
//!   - 203.0.113.5/32
//!   - 2001:db8:f::/64
//! endpoint: https://www.servercontrolpanel.de/WSEndUser   # optional
//! requestTimeoutSeconds: 30                               # optional
//! ```
//!
//! Values from the referenced ConfigMap override the file, and values from the
//! referenced Secret override both. Validation happens once, before any
//! controller starts; every failure is fatal.

use crate::constants::{DEFAULT_CONFIG_NAMESPACE, DEFAULT_REQUEST_TIMEOUT_SECS, SCP_ENDPOINT};
use crate::errors::ConfigError;
use crate::failover::FailoverPrefixes;
use crate::scp::Credentials;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::{Api, Client};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const KEY_USERNAME: &str = "username";
const KEY_PASSWORD: &str = "password";
const KEY_FAILOVER: &str = "failover";

/// Raw cloud configuration as read from the file.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CloudConfig {
    /// `name@namespace` of a ConfigMap overlay
    #[serde(default)]
    pub config: Option<String>,
    /// `name@namespace` of a Secret overlay
    #[serde(default)]
    pub secret: Option<String>,
    /// SCP login name
    #[serde(default)]
    pub username: String,
    /// SCP web service password
    #[serde(default)]
    pub password: String,
    /// Failover prefixes in CIDR notation
    #[serde(default)]
    pub failover: Vec<String>,
    /// SCP web service URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-request timeout for SCP calls
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("config", &self.config)
            .field("secret", &self.secret)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("failover", &self.failover)
            .field("endpoint", &self.endpoint)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Configuration ready to build the SCP client and reconcilers from.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    /// SCP login
    pub credentials: Credentials,
    /// Failover prefixes under this controller's control
    pub prefixes: FailoverPrefixes,
    /// SCP web service URL
    pub endpoint: Url,
    /// Per-request timeout for SCP calls
    pub request_timeout: Duration,
}

/// Split a `name@namespace` reference; the namespace defaults to `kube-system`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidReference`] if the name part is empty.
pub fn parse_reference(reference: &str) -> Result<(String, String), ConfigError> {
    let reference = reference.trim();
    let (name, namespace) = reference.split_once('@').unwrap_or((reference, ""));
    if name.is_empty() || name.contains('@') || namespace.contains('@') {
        return Err(ConfigError::InvalidReference(reference.to_string()));
    }
    let namespace = if namespace.is_empty() {
        DEFAULT_CONFIG_NAMESPACE
    } else {
        namespace
    };
    Ok((name.to_string(), namespace.to_string()))
}

impl CloudConfig {
    /// Parse a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid YAML or unknown keys.
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`CloudConfig::from_yaml`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Read cloud config");
        Self::from_yaml(&document)
    }

    /// Overlay keys from a ConfigMap's data.
    pub fn apply_config_map_data(&mut self, data: &BTreeMap<String, String>) {
        if let Some(username) = data.get(KEY_USERNAME) {
            self.username.clone_from(username);
        }
        if let Some(failover) = data.get(KEY_FAILOVER) {
            self.failover = failover.split(',').map(ToString::to_string).collect();
        }
    }

    /// Overlay keys from a Secret's data.
    pub fn apply_secret_data(&mut self, data: &BTreeMap<String, ByteString>) {
        if let Some(username) = data.get(KEY_USERNAME) {
            self.username = String::from_utf8_lossy(&username.0).into_owned();
        }
        if let Some(password) = data.get(KEY_PASSWORD) {
            self.password = String::from_utf8_lossy(&password.0).into_owned();
        }
    }

    /// Fetch the referenced ConfigMap and Secret and apply their overlays.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidReference`] for a malformed reference and
    /// [`ConfigError::Reference`] if an object cannot be fetched.
    pub async fn load_references(&mut self, client: &Client) -> Result<(), ConfigError> {
        if let Some(reference) = self.config.clone() {
            let (name, namespace) = parse_reference(&reference)?;
            let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
            let config_map = api.get(&name).await.map_err(|source| ConfigError::Reference {
                kind: "ConfigMap",
                name: format!("{namespace}/{name}"),
                source,
            })?;
            if let Some(data) = config_map.data.as_ref() {
                self.apply_config_map_data(data);
            }
            info!(namespace = %namespace, name = %name, "Applied cloud config from ConfigMap");
        }

        if let Some(reference) = self.secret.clone() {
            let (name, namespace) = parse_reference(&reference)?;
            let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
            let secret = api.get(&name).await.map_err(|source| ConfigError::Reference {
                kind: "Secret",
                name: format!("{namespace}/{name}"),
                source,
            })?;
            if let Some(data) = secret.data.as_ref() {
                self.apply_secret_data(data);
            }
            info!(namespace = %namespace, name = %name, "Applied cloud config from Secret");
        }
        Ok(())
    }

    /// Check required fields and parse the failover prefixes.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, checking username, password,
    /// failover prefixes and endpoint in that order.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }
        let prefixes = FailoverPrefixes::parse(&self.failover)?;
        for prefix in prefixes.iter() {
            info!("Taking control of failover IP: {prefix}");
        }

        let endpoint = self.endpoint.as_deref().unwrap_or(SCP_ENDPOINT);
        let endpoint = Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let timeout = self
            .request_timeout_seconds
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        Ok(ValidatedConfig {
            credentials: Credentials::new(self.username.trim(), self.password.clone()),
            prefixes,
            endpoint,
            request_timeout: Duration::from_secs(timeout),
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
