// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `reconciler.rs`

#[cfg(test)]
mod tests {
    use crate::dns_errors::ReconcileError;
    use crate::dns_manager::DnsManager;
    use crate::reconciler::Reconciler;
    use crate::status::{status_channel, StatusReceiver};
    use crate::test_support::{ingress, DnsCall, RecordingDnsManager, ScriptedAccessor};
    use crate::accessor::Event;
    use crate::watcher::{WatchHandler, Watcher};
    use k8s_openapi::api::networking::v1::Ingress;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const IDENTITY: &str = "default/web";

    fn setup_with(
        accessor: ScriptedAccessor,
        dns: RecordingDnsManager,
    ) -> (
        Reconciler<ScriptedAccessor>,
        Arc<RecordingDnsManager>,
        StatusReceiver,
    ) {
        let dns = Arc::new(dns);
        let (tx, rx) = status_channel(256);
        let manager: Arc<dyn DnsManager> = dns.clone();
        (Reconciler::new(Arc::new(accessor), manager, tx), dns, rx)
    }

    fn setup() -> (
        Reconciler<ScriptedAccessor>,
        Arc<RecordingDnsManager>,
        StatusReceiver,
    ) {
        setup_with(ScriptedAccessor::default(), RecordingDnsManager::default())
    }

    fn add(host: &str, ip: &str) -> DnsCall {
        DnsCall::AddHost(host.to_string(), ip.to_string())
    }

    fn remove(host: &str) -> DnsCall {
        DnsCall::RemoveHost(host.to_string())
    }

    fn web(hosts: &[&str], ips: &[&str]) -> Ingress {
        ingress("web", Some("1"), hosts, ips)
    }

    #[tokio::test]
    async fn test_added_registers_every_host_and_target() {
        let (mut reconciler, dns, _rx) = setup();

        reconciler
            .added_event(&web(&["a.example.com", "b.example.com"], &["10.0.0.1", "10.0.0.2"]))
            .await
            .unwrap();

        assert_eq!(
            dns.calls(),
            vec![
                add("a.example.com", "10.0.0.1"),
                add("a.example.com", "10.0.0.2"),
                add("b.example.com", "10.0.0.1"),
                add("b.example.com", "10.0.0.2"),
            ]
        );
        assert!(reconciler.entry(IDENTITY).is_some());
    }

    #[tokio::test]
    async fn test_added_hostname_target_registers_alias() {
        let (mut reconciler, dns, _rx) = setup();
        let object: Ingress = serde_json::from_value(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": { "name": "web", "namespace": "default" },
            "spec": { "rules": [{ "host": "a.example.com" }] },
            "status": { "loadBalancer": { "ingress": [{ "hostname": "lb.cloud.example" }] } }
        }))
        .unwrap();

        reconciler.added_event(&object).await.unwrap();

        assert_eq!(
            dns.calls(),
            vec![DnsCall::AddAlias(
                "a.example.com".to_string(),
                "lb.cloud.example".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_added_without_targets_keeps_baseline_and_reports() {
        let (mut reconciler, dns, _rx) = setup();

        let result = reconciler.added_event(&web(&["a.example.com"], &[])).await;

        assert!(matches!(result, Err(ReconcileError::NoTargets { ref identity }) if identity == IDENTITY));
        assert!(dns.calls().is_empty());
        assert!(reconciler.entry(IDENTITY).is_some());
    }

    #[tokio::test]
    async fn test_update_adding_host_issues_single_add() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler
            .added_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();
        dns.clear();

        reconciler
            .updated_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();

        assert_eq!(dns.calls(), vec![add("b", "1.1.1.1")]);
    }

    #[tokio::test]
    async fn test_update_target_change_removes_then_adds() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler
            .added_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();
        dns.clear();

        reconciler
            .updated_event(&web(&["a"], &["2.2.2.2"]))
            .await
            .unwrap();

        assert_eq!(dns.calls(), vec![remove("a"), add("a", "2.2.2.2")]);
        assert_eq!(
            reconciler.entry(IDENTITY).unwrap().target_ips,
            vec!["2.2.2.2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_update_losing_targets_removes_every_host() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler
            .added_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();
        dns.clear();

        reconciler.updated_event(&web(&["a", "b"], &[])).await.unwrap();

        assert_eq!(dns.calls(), vec![remove("a"), remove("b")]);
        assert!(!reconciler.entry(IDENTITY).unwrap().has_targets());
    }

    #[tokio::test]
    async fn test_targets_returning_after_loss_are_registered() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler
            .added_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();
        reconciler.updated_event(&web(&["a"], &[])).await.unwrap();
        dns.clear();

        reconciler
            .updated_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();

        assert_eq!(dns.calls(), vec![remove("a"), add("a", "1.1.1.1")]);
    }

    #[tokio::test]
    async fn test_update_dropping_host_only_removes_it() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler
            .added_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();
        dns.clear();

        reconciler
            .updated_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();

        assert_eq!(dns.calls(), vec![remove("b")]);
    }

    #[tokio::test]
    async fn test_reordered_targets_are_not_a_change() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler
            .added_event(&web(&["a"], &["1.1.1.1", "2.2.2.2"]))
            .await
            .unwrap();
        dns.clear();

        reconciler
            .updated_event(&web(&["a"], &["2.2.2.2", "1.1.1.1"]))
            .await
            .unwrap();

        assert!(dns.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_without_baseline_acts_as_add() {
        let (mut reconciler, dns, _rx) = setup();

        reconciler
            .updated_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();

        assert_eq!(dns.calls(), vec![add("a", "1.1.1.1")]);
        assert!(reconciler.entry(IDENTITY).is_some());
    }

    #[tokio::test]
    async fn test_replayed_add_does_not_duplicate_records() {
        let (mut reconciler, dns, _rx) = setup();
        let object = web(&["a"], &["1.1.1.1"]);
        reconciler.added_event(&object).await.unwrap();
        dns.clear();

        reconciler.added_event(&object).await.unwrap();

        assert!(dns.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_removes_hosts_and_baseline() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler
            .added_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();
        dns.clear();

        reconciler
            .deleted_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();

        assert_eq!(dns.calls(), vec![remove("a"), remove("b")]);
        assert!(reconciler.entry(IDENTITY).is_none());
        assert_eq!(reconciler.entries().count(), 0);
    }

    #[tokio::test]
    async fn test_deleted_uses_baseline_hosts_when_payload_is_stale() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler
            .added_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();
        dns.clear();

        reconciler.deleted_event(&web(&["a"], &[])).await.unwrap();

        assert_eq!(dns.calls(), vec![remove("a"), remove("b")]);
    }

    #[tokio::test]
    async fn test_objects_failing_preconditions_are_ignored() {
        let accessor = ScriptedAccessor {
            reject_all: AtomicBool::new(true),
            ..ScriptedAccessor::default()
        };
        let (mut reconciler, dns, _rx) = setup_with(accessor, RecordingDnsManager::default());

        reconciler
            .added_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();
        reconciler
            .updated_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();
        reconciler
            .deleted_event(&web(&["a"], &["1.1.1.1"]))
            .await
            .unwrap();

        assert!(dns.calls().is_empty());
        assert_eq!(reconciler.entries().count(), 0);
    }

    #[tokio::test]
    async fn test_tracked_object_that_stops_qualifying_gives_up_hosts() {
        let accessor = Arc::new(ScriptedAccessor::default());
        let dns = Arc::new(RecordingDnsManager::default());
        let manager: Arc<dyn DnsManager> = dns.clone();
        let (tx, _rx) = status_channel(16);
        let mut reconciler = Reconciler::new(Arc::clone(&accessor), manager, tx);
        reconciler
            .added_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();
        dns.clear();

        accessor.reject_all.store(true, Ordering::SeqCst);
        reconciler
            .updated_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();

        assert_eq!(dns.calls(), vec![remove("a"), remove("b")]);
        assert!(reconciler.entry(IDENTITY).is_none());

        dns.clear();
        reconciler
            .updated_event(&web(&["a", "b"], &["1.1.1.1"]))
            .await
            .unwrap();
        assert!(dns.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replayed_add_of_disqualified_object_gives_up_hosts() {
        let accessor = Arc::new(ScriptedAccessor::default());
        let dns = Arc::new(RecordingDnsManager::default());
        let manager: Arc<dyn DnsManager> = dns.clone();
        let (tx, _rx) = status_channel(16);
        let mut reconciler = Reconciler::new(Arc::clone(&accessor), manager, tx);
        reconciler.added_event(&web(&["a"], &["1.1.1.1"])).await.unwrap();
        dns.clear();

        accessor.reject_all.store(true, Ordering::SeqCst);
        reconciler.added_event(&web(&["a"], &["1.1.1.1"])).await.unwrap();

        assert_eq!(dns.calls(), vec![remove("a")]);
        assert_eq!(reconciler.entries().count(), 0);
    }

    #[tokio::test]
    async fn test_resync_removes_objects_missing_from_list() {
        let (mut reconciler, dns, _rx) = setup();
        reconciler.added_event(&web(&["a"], &["1.1.1.1"])).await.unwrap();
        reconciler
            .added_event(&ingress("gone", Some("2"), &["g"], &["2.2.2.2"]))
            .await
            .unwrap();
        dns.clear();

        reconciler
            .resync(&[
                web(&["a"], &["1.1.1.1"]),
                ingress("new", Some("3"), &["n"], &["3.3.3.3"]),
            ])
            .await;

        assert_eq!(dns.calls(), vec![add("n", "3.3.3.3"), remove("g")]);
        assert!(reconciler.entry(IDENTITY).is_some());
        assert!(reconciler.entry("default/new").is_some());
        assert!(reconciler.entry("default/gone").is_none());
    }

    #[tokio::test]
    async fn test_expired_cursor_drops_objects_deleted_while_unwatched() {
        let accessor = Arc::new(ScriptedAccessor {
            listed: vec![ingress("web", Some("20"), &["web.example.com"], &["10.0.0.1"])],
            list_cursor: "20".to_string(),
            ..ScriptedAccessor::with_scripts(vec![vec![Event::Error {
                code: 410,
                message: "too old resource version".to_string(),
            }]])
        });
        let dns = Arc::new(RecordingDnsManager::default());
        let manager: Arc<dyn DnsManager> = dns.clone();
        let (tx, _rx) = status_channel(64);
        let mut reconciler = Reconciler::new(Arc::clone(&accessor), manager, tx);
        reconciler
            .added_event(&ingress("web", Some("5"), &["web.example.com"], &["10.0.0.1"]))
            .await
            .unwrap();
        reconciler
            .added_event(&ingress("gone", Some("6"), &["gone.example.com"], &["10.0.0.2"]))
            .await
            .unwrap();
        dns.clear();

        let watcher = Watcher::spawn(Arc::clone(&accessor), reconciler, "6".to_string(), Duration::ZERO);
        for _ in 0..200 {
            if accessor.opened_with().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let reconciler = watcher.stop().await.expect("reconciler returned");

        assert_eq!(accessor.opened_with(), vec!["6", "20"]);
        assert_eq!(dns.calls(), vec![remove("gone.example.com")]);
        assert!(reconciler.entry(IDENTITY).is_some());
        assert!(reconciler.entry("default/gone").is_none());
    }

    #[tokio::test]
    async fn test_failures_are_aggregated_without_short_circuit() {
        let dns = RecordingDnsManager {
            failing_hosts: vec!["a".to_string()],
            ..RecordingDnsManager::default()
        };
        let (mut reconciler, dns, _rx) = setup_with(ScriptedAccessor::default(), dns);

        let result = reconciler
            .added_event(&web(&["a", "b"], &["1.1.1.1", "2.2.2.2"]))
            .await;

        match result {
            Err(ReconcileError::Apply { identity, failures }) => {
                assert_eq!(identity, IDENTITY);
                assert_eq!(failures.len(), 2);
            }
            other => panic!("expected aggregated failure, got {other:?}"),
        }
        assert_eq!(dns.calls(), vec![add("b", "1.1.1.1"), add("b", "2.2.2.2")]);
        assert!(reconciler.entry(IDENTITY).is_some());
    }

    #[tokio::test]
    async fn test_post_event_publishes_table() {
        let (mut reconciler, _dns, mut rx) = setup();
        reconciler
            .added_event(&web(&["shop.example.com"], &["192.168.49.2"]))
            .await
            .unwrap();

        reconciler.post_event().await;

        let message = rx.recv().await.expect("status published");
        assert_eq!(message.box_name, "Ingress Hosts");
        assert!(message.text.contains("shop.example.com"));
        assert!(message.text.contains("192.168.49.2"));
    }

    #[tokio::test]
    async fn test_pre_fetch_applies_listing_and_returns_cursor() {
        let accessor = ScriptedAccessor {
            listed: vec![
                ingress("web", Some("4"), &["a"], &["1.1.1.1"]),
                ingress("pending", Some("5"), &["p"], &[]),
            ],
            list_cursor: "42".to_string(),
            ..ScriptedAccessor::default()
        };
        let (mut reconciler, dns, mut rx) = setup_with(accessor, RecordingDnsManager::default());

        let cursor = reconciler.pre_fetch().await.unwrap();

        assert_eq!(cursor, "42");
        assert_eq!(dns.calls(), vec![add("a", "1.1.1.1")]);
        assert_eq!(reconciler.entries().count(), 2);
        assert!(rx.recv().await.is_some());
    }
}
