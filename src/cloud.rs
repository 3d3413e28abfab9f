// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `nc` cloud provider: shared collaborators wired into both interfaces.

use crate::cluster::{ClusterApi, KubeCluster};
use crate::config::ValidatedConfig;
use crate::constants::{PROVIDER_NAME, PROVIDER_VERSION};
use crate::errors::ScpError;
use crate::failover::FailoverPrefixes;
use crate::instances::{FailoverInstances, Instances};
use crate::load_balancer::{FailoverLoadBalancer, LoadBalancer};
use crate::scp::{ScpClient, ServerDirectory};
use kube::Client;
use std::sync::Arc;
use tracing::info;

/// Instances and load balancer sharing one directory, cluster and prefix set.
#[derive(Clone)]
pub struct FailoverCloud {
    cluster: Arc<dyn ClusterApi>,
    instances: Arc<FailoverInstances>,
    load_balancer: Arc<FailoverLoadBalancer>,
}

impl FailoverCloud {
    /// Wire the given collaborators.
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        directory: Arc<dyn ServerDirectory>,
        prefixes: FailoverPrefixes,
    ) -> Self {
        let prefixes = Arc::new(prefixes);
        Self {
            instances: Arc::new(FailoverInstances::new(
                cluster.clone(),
                directory.clone(),
                prefixes.clone(),
            )),
            load_balancer: Arc::new(FailoverLoadBalancer::new(
                cluster.clone(),
                directory,
                prefixes,
            )),
            cluster,
        }
    }

    /// Build the provider from validated configuration and a Kubernetes client.
    ///
    /// # Errors
    ///
    /// Returns an error if the SCP HTTP client cannot be constructed.
    pub fn from_config(client: Client, config: ValidatedConfig) -> Result<Self, ScpError> {
        let directory = ScpClient::new(config.endpoint, config.credentials, config.request_timeout)?;
        info!(
            provider = PROVIDER_NAME,
            version = PROVIDER_VERSION,
            endpoint = %directory.endpoint(),
            prefixes = config.prefixes.len(),
            "Initialized cloud provider"
        );
        Ok(Self::new(
            Arc::new(KubeCluster::new(client)),
            Arc::new(directory),
            config.prefixes,
        ))
    }

    /// Cluster access shared by both interfaces.
    #[must_use]
    pub fn cluster(&self) -> Arc<dyn ClusterApi> {
        self.cluster.clone()
    }

    /// Instance lookups.
    #[must_use]
    pub fn instances(&self) -> Arc<dyn Instances> {
        self.instances.clone()
    }

    /// Load-balancer lifecycle.
    #[must_use]
    pub fn load_balancer(&self) -> Arc<dyn LoadBalancer> {
        self.load_balancer.clone()
    }
}
