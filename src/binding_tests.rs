// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the binding record.

#[cfg(test)]
mod tests {
    use crate::binding::{bind, bound_node, ensure_node_label, unbind, NodeServiceLabels, ServiceKey};
    use crate::constants::LABEL_NAME_MAX_LEN;
    use crate::labels::{NODE_SERVICE_LABEL_PREFIX, SERVICE_NODE_KEY};
    use crate::test_support::{
        bound_to, ingress_of, labelled_for, lb_service, ready_node, with_ingress, FakeCluster,
        InjectedFailure,
    };
    use kube::ResourceExt;

    #[test]
    fn test_label_name_short() {
        let key = ServiceKey::new("default", "web");
        assert_eq!(key.label_name(), "default.web");
        assert_eq!(
            key.node_label_key(),
            format!("{NODE_SERVICE_LABEL_PREFIX}default.web")
        );
        assert_eq!(key.to_string(), "default/web");
    }

    #[test]
    fn test_label_name_long_is_truncated_and_unique() {
        let namespace = "a".repeat(40);
        let first = ServiceKey::new(&namespace, "b".repeat(40)).label_name();
        let second = ServiceKey::new(&namespace, "c".repeat(40)).label_name();

        assert_eq!(first.len(), LABEL_NAME_MAX_LEN);
        assert!(first.starts_with(&namespace));
        assert_ne!(first, second);
        assert!(first.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_label_name_truncation_drops_trailing_separator() {
        // Cut point lands right after the '.' between namespace and name
        let namespace = "n".repeat(51);
        let name = ServiceKey::new(&namespace, "x".repeat(30)).label_name();
        assert!(!name.contains(".-"));
        assert!(name.len() <= LABEL_NAME_MAX_LEN);
    }

    #[test]
    fn test_node_service_labels_roundtrip_keeps_other_labels() {
        let mut node = ready_node("node-a");
        node.labels_mut()
            .insert("kubernetes.io/hostname".to_string(), "node-a".to_string());
        node.labels_mut()
            .insert(format!("{NODE_SERVICE_LABEL_PREFIX}legacy"), String::new());

        let web = ServiceKey::new("default", "web");
        let api = ServiceKey::new("prod", "api");

        let mut labels = NodeServiceLabels::of(&node);
        assert!(labels.is_empty(), "empty-valued labels do not count");
        assert!(labels.insert(&web));
        assert!(labels.insert(&api));
        assert!(!labels.insert(&web));
        labels.write_to(&mut node);

        let reread = NodeServiceLabels::of(&node);
        assert_eq!(reread.len(), 2);
        assert!(reread.contains(&web));
        assert!(reread.contains(&api));
        assert_eq!(
            node.labels().get("kubernetes.io/hostname").map(String::as_str),
            Some("node-a")
        );
        assert!(!node
            .labels()
            .contains_key(&format!("{NODE_SERVICE_LABEL_PREFIX}legacy")));

        let mut labels = reread;
        assert!(labels.remove(&web));
        assert!(!labels.remove(&web));
        labels.write_to(&mut node);
        assert!(!NodeServiceLabels::of(&node).contains(&web));
        assert!(NodeServiceLabels::of(&node).contains(&api));
    }

    #[test]
    fn test_bound_node_prefers_annotation() {
        let service = lb_service("default", "web", &[]);
        assert_eq!(bound_node(&service), None);

        let mut service = bound_to(service, "node-a");
        assert_eq!(bound_node(&service), Some("node-a"));

        service.annotations_mut().remove(SERVICE_NODE_KEY);
        assert_eq!(bound_node(&service), Some("node-a"), "label is the fallback");

        service
            .annotations_mut()
            .insert(SERVICE_NODE_KEY.to_string(), "node-b".to_string());
        assert_eq!(bound_node(&service), Some("node-b"));
    }

    #[tokio::test]
    async fn test_bind_writes_service_and_node() {
        let cluster = FakeCluster::new();
        cluster.add_node(ready_node("node-a"));
        let service = cluster.add_service(lb_service("default", "web", &["IPv4"]));

        let updated = bind(&cluster, &service, "node-a").await.unwrap();

        assert_eq!(bound_node(&updated), Some("node-a"));
        assert_eq!(
            updated.labels().get(SERVICE_NODE_KEY).map(String::as_str),
            Some("node-a")
        );
        assert_eq!(
            cluster.nodes_labelled_for(&ServiceKey::of(&service)),
            vec!["node-a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_bind_missing_node_is_not_found() {
        let cluster = FakeCluster::new();
        let service = cluster.add_service(lb_service("default", "web", &["IPv4"]));

        let err = bind(&cluster, &service, "node-x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_bind_with_stale_service_conflicts() {
        let cluster = FakeCluster::new();
        cluster.add_node(ready_node("node-a"));
        let stale = cluster.add_service(lb_service("default", "web", &["IPv4"]));
        bind(&cluster, &stale, "node-a").await.unwrap();

        let err = bind(&cluster, &stale, "node-a").await.unwrap_err();
        assert_eq!(err.category(), "conflict");
    }

    #[tokio::test]
    async fn test_unbind_clears_both_sides() {
        let cluster = FakeCluster::new();
        let service = with_ingress(lb_service("default", "web", &["IPv4"]), &["203.0.113.5"]);
        let service = cluster.add_service(bound_to(service, "node-a"));
        cluster.add_node(labelled_for(ready_node("node-a"), &service));

        let updated = unbind(&cluster, &service, true).await.unwrap();

        assert_eq!(bound_node(&updated), None);
        assert!(!updated.labels().contains_key(SERVICE_NODE_KEY));
        assert!(ingress_of(&updated).is_empty());
        assert!(cluster
            .nodes_labelled_for(&ServiceKey::of(&service))
            .is_empty());
    }

    #[tokio::test]
    async fn test_unbind_can_keep_status() {
        let cluster = FakeCluster::new();
        let service = with_ingress(lb_service("default", "web", &["IPv4"]), &["203.0.113.5"]);
        let service = cluster.add_service(bound_to(service, "node-a"));
        cluster.add_node(labelled_for(ready_node("node-a"), &service));

        let updated = unbind(&cluster, &service, false).await.unwrap();
        assert_eq!(ingress_of(&updated), vec!["203.0.113.5".to_string()]);
    }

    #[tokio::test]
    async fn test_unbind_with_missing_node_succeeds() {
        let cluster = FakeCluster::new();
        let service = cluster.add_service(bound_to(lb_service("default", "web", &[]), "gone"));

        let updated = unbind(&cluster, &service, true).await.unwrap();
        assert_eq!(bound_node(&updated), None);
    }

    #[tokio::test]
    async fn test_unbind_tolerates_node_deleted_mid_flight() {
        let cluster = FakeCluster::new();
        let service = cluster.add_service(bound_to(lb_service("default", "web", &[]), "node-a"));
        cluster.add_node(labelled_for(ready_node("node-a"), &service));
        cluster.fail_node_patches(InjectedFailure::NotFound);

        assert!(unbind(&cluster, &service, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_unbind_propagates_node_conflict() {
        let cluster = FakeCluster::new();
        let service = cluster.add_service(bound_to(lb_service("default", "web", &[]), "node-a"));
        cluster.add_node(labelled_for(ready_node("node-a"), &service));
        cluster.fail_node_patches(InjectedFailure::Conflict);

        let err = unbind(&cluster, &service, true).await.unwrap_err();
        assert_eq!(err.category(), "conflict");

        let stored = cluster.service("default", "web").unwrap();
        assert_eq!(bound_node(&stored), Some("node-a"), "service keeps its binding");
        assert_eq!(cluster.service_patches(), 0);
    }

    #[tokio::test]
    async fn test_ensure_node_label_repairs_missing_label() {
        let cluster = FakeCluster::new();
        let node = cluster.add_node(ready_node("node-a"));
        let key = ServiceKey::new("default", "web");

        ensure_node_label(&cluster, &key, &node).await.unwrap();
        assert_eq!(cluster.nodes_labelled_for(&key), vec!["node-a".to_string()]);
        assert_eq!(cluster.node_patches(), 1);

        let labelled = cluster.node("node-a").unwrap();
        ensure_node_label(&cluster, &key, &labelled).await.unwrap();
        assert_eq!(cluster.node_patches(), 1, "present label is not rewritten");
    }
}
