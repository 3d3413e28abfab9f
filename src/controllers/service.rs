// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service controller: keeps failover IPs and ingress status of `LoadBalancer` Services.

use crate::binding::{bound_node, ServiceKey};
use crate::cluster::ClusterApi;
use crate::constants::{ERROR_REQUEUE_DURATION_SECS, KIND_SERVICE, SERVICE_TYPE_LOAD_BALANCER};
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::labels::LOAD_BALANCER_CLEANUP_FINALIZER;
use crate::metrics;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{LoadBalancerStatus, Service, ServiceStatus};
use kube::runtime::{controller::Action, watcher, Controller};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// True for `type: LoadBalancer` Services without a `loadBalancerClass`.
#[must_use]
pub fn is_managed(service: &Service) -> bool {
    service.spec.as_ref().is_some_and(|spec| {
        spec.type_.as_deref() == Some(SERVICE_TYPE_LOAD_BALANCER)
            && spec.load_balancer_class.is_none()
    })
}

/// True if the Service carries the load-balancer cleanup finalizer.
#[must_use]
pub fn has_finalizer(service: &Service) -> bool {
    service
        .finalizers()
        .iter()
        .any(|finalizer| finalizer == LOAD_BALANCER_CLEANUP_FINALIZER)
}

/// Copy of `service` with the cleanup finalizer added.
#[must_use]
pub fn with_finalizer(service: &Service) -> Service {
    let mut desired = service.clone();
    if !has_finalizer(service) {
        desired
            .finalizers_mut()
            .push(LOAD_BALANCER_CLEANUP_FINALIZER.to_string());
    }
    desired
}

/// Copy of `service` without the cleanup finalizer.
#[must_use]
pub fn without_finalizer(service: &Service) -> Service {
    let mut desired = service.clone();
    desired
        .finalizers_mut()
        .retain(|finalizer| finalizer != LOAD_BALANCER_CLEANUP_FINALIZER);
    desired
}

/// Copy of `service` publishing `status` as its load-balancer ingress.
#[must_use]
pub fn with_status(service: &Service, status: &LoadBalancerStatus) -> Service {
    let mut desired = service.clone();
    desired
        .status
        .get_or_insert_with(ServiceStatus::default)
        .load_balancer = Some(status.clone());
    desired
}

async fn release_finalizer(cluster: &dyn ClusterApi, key: &ServiceKey) -> Result<()> {
    let Some(latest) = cluster.get_service(&key.namespace, &key.name).await? else {
        return Ok(());
    };
    if has_finalizer(&latest) {
        cluster
            .patch_service(&latest, &without_finalizer(&latest))
            .await?;
        debug!(service = %key, "Removed cleanup finalizer");
    }
    Ok(())
}

async fn publish_status(
    cluster: &dyn ClusterApi,
    key: &ServiceKey,
    status: &LoadBalancerStatus,
) -> Result<()> {
    let Some(latest) = cluster.get_service(&key.namespace, &key.name).await? else {
        return Ok(());
    };
    let published = latest
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref());
    if published == Some(status) {
        return Ok(());
    }
    cluster
        .patch_service(&latest, &with_status(&latest, status))
        .await?;
    info!(service = %key, "Published load balancer ingress");
    Ok(())
}

async fn reconcile(service: &Service, ctx: &Context) -> Result<Action> {
    let key = ServiceKey::of(service);
    let cluster = ctx.cloud.cluster();
    let load_balancer = ctx.cloud.load_balancer();

    if service.metadata.deletion_timestamp.is_some() || !is_managed(service) {
        if has_finalizer(service) || bound_node(service).is_some() {
            info!(service = %key, "Releasing load balancer");
            load_balancer.ensure_load_balancer_deleted(service).await?;
            release_finalizer(cluster.as_ref(), &key).await?;
        }
        return Ok(Action::await_change());
    }

    let current = if has_finalizer(service) {
        service.clone()
    } else {
        cluster
            .patch_service(service, &with_finalizer(service))
            .await?
    };

    let nodes = ctx.node_snapshot();
    match load_balancer.ensure_load_balancer(&current, &nodes).await? {
        Some(status) => {
            publish_status(cluster.as_ref(), &key, &status).await?;
            Ok(Action::requeue(ctx.intervals.service_resync))
        }
        None => {
            metrics::record_reconciliation_requeue(KIND_SERVICE, "no_eligible_node");
            Ok(Action::requeue(Duration::from_secs(
                ERROR_REQUEUE_DURATION_SECS,
            )))
        }
    }
}

/// Reconcile one Service.
///
/// # Errors
///
/// Returns the first remote or cluster error; the controller requeues.
pub async fn reconcile_service(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let result = reconcile(&service, &ctx).await;
    match &result {
        Ok(_) => metrics::record_reconciliation_success(KIND_SERVICE, start.elapsed()),
        Err(e) => {
            metrics::record_reconciliation_error(KIND_SERVICE, start.elapsed());
            metrics::record_error(KIND_SERVICE, e.category());
        }
    }
    result
}

/// Requeue a failed Service reconciliation.
pub fn error_policy(service: Arc<Service>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        service = %ServiceKey::of(&service),
        error = %error,
        "Service reconciliation failed"
    );
    metrics::record_reconciliation_requeue(KIND_SERVICE, "error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Run the Service controller until its watch stream ends.
pub async fn run(client: Client, ctx: Arc<Context>) {
    info!("Starting Service controller");
    let api = Api::<Service>::all(client);
    Controller::new(api, watcher::Config::default())
        .run(reconcile_service, error_policy, ctx)
        .for_each(|result| {
            if let Err(e) = result {
                debug!(error = %e, "Service controller event");
            }
            futures::future::ready(())
        })
        .await;
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
