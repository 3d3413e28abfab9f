// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node controller: provider ID, addresses, shutdown taint and removal of
//! nodes whose server is gone.

use crate::constants::{ERROR_REQUEUE_DURATION_SECS, KIND_NODE};
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::instances::InstanceMetadata;
use crate::labels::{TAINT_EFFECT_NO_SCHEDULE, TAINT_SHUTDOWN, TAINT_UNINITIALIZED};
use crate::load_balancer::plan::is_node_ready;
use crate::metrics;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, NodeSpec, NodeStatus, Taint};
use kube::runtime::{controller::Action, watcher, Controller};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Node as the controller wants it given the server's state.
///
/// Sets `spec.providerID` if unset, replaces `status.addresses` when any are
/// known, toggles the shutdown taint and drops the uninitialized taint.
#[must_use]
pub fn desired_node(node: &Node, shutdown: bool, metadata: &InstanceMetadata) -> Node {
    let mut desired = node.clone();

    let spec = desired.spec.get_or_insert_with(NodeSpec::default);
    if spec.provider_id.as_deref().is_none_or(str::is_empty) {
        spec.provider_id = Some(metadata.provider_id.clone());
    }

    let had_taints = spec.taints.is_some();
    let mut taints = spec.taints.take().unwrap_or_default();
    taints.retain(|taint| taint.key != TAINT_UNINITIALIZED);
    if shutdown {
        if !taints.iter().any(|taint| taint.key == TAINT_SHUTDOWN) {
            taints.push(Taint {
                key: TAINT_SHUTDOWN.to_string(),
                effect: TAINT_EFFECT_NO_SCHEDULE.to_string(),
                ..Taint::default()
            });
        }
    } else {
        taints.retain(|taint| taint.key != TAINT_SHUTDOWN);
    }
    spec.taints = (had_taints || !taints.is_empty()).then_some(taints);

    if !metadata.node_addresses.is_empty() {
        desired
            .status
            .get_or_insert_with(NodeStatus::default)
            .addresses = Some(metadata.node_addresses.clone());
    }
    desired
}

async fn reconcile(node: &Node, ctx: &Context) -> Result<Action> {
    if node.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }
    let name = node.name_any();
    let cluster = ctx.cloud.cluster();
    let instances = ctx.cloud.instances();

    if !instances.instance_exists(node).await? {
        if is_node_ready(node) {
            warn!(node = %name, "Server missing but node still ready, keeping it");
            return Ok(Action::requeue(ctx.intervals.node_monitor));
        }
        info!(node = %name, "Deleting node without server");
        cluster.delete_node(&name).await?;
        return Ok(Action::await_change());
    }

    let shutdown = instances.instance_shutdown(node).await?;
    let metadata = instances.instance_metadata(node).await?;

    // Releasing bindings on shutdown rewrites node labels.
    let Some(latest) = cluster.get_node(&name).await? else {
        return Ok(Action::await_change());
    };
    let desired = desired_node(&latest, shutdown, &metadata);
    if desired != latest {
        cluster.patch_node(&latest, &desired).await?;
        info!(node = %name, shutdown = shutdown, "Updated node from server state");
    }
    Ok(Action::requeue(ctx.intervals.node_monitor))
}

/// Reconcile one Node.
///
/// # Errors
///
/// Returns the first remote or cluster error; the controller requeues.
pub async fn reconcile_node(node: Arc<Node>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let result = reconcile(&node, &ctx).await;
    match &result {
        Ok(_) => metrics::record_reconciliation_success(KIND_NODE, start.elapsed()),
        Err(e) => {
            metrics::record_reconciliation_error(KIND_NODE, start.elapsed());
            metrics::record_error(KIND_NODE, e.category());
        }
    }
    result
}

/// Requeue a failed Node reconciliation.
pub fn error_policy(node: Arc<Node>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(node = %node.name_any(), error = %error, "Node reconciliation failed");
    metrics::record_reconciliation_requeue(KIND_NODE, "error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Run the Node controller until its watch stream ends.
pub async fn run(client: Client, ctx: Arc<Context>) {
    info!("Starting Node controller");
    let api = Api::<Node>::all(client);
    Controller::new(api, watcher::Config::default())
        .run(reconcile_node, error_policy, ctx)
        .for_each(|result| {
            if let Err(e) = result {
                debug!(error = %e, "Node controller event");
            }
            futures::future::ready(())
        })
        .await;
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod node_tests;
