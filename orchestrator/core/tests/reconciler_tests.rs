// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use aegis_monitor_core::application::reconciler::{ReconcilerError, StateReconciler};
use aegis_monitor_core::domain::baseline::Severity;
use aegis_monitor_core::domain::events::{IssueEvidence, IssueType, ReconciliationEvent};
use aegis_monitor_core::domain::monitor_config::ReconcilerConfig;
use aegis_monitor_core::domain::reconciliation::{
    DomainId, DriftKind, ReconciliationDomain, Snapshot, SnapshotProvider, SourceError,
    StateSource, SNAPSHOT_ERROR_KEY,
};
use aegis_monitor_core::infrastructure::event_bus::{EventBus, MonitorEvent};
use aegis_monitor_core::infrastructure::sources::StaticSnapshotProvider;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

struct FailingProvider;

#[async_trait]
impl SnapshotProvider for FailingProvider {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError> {
        Err(SourceError::FetchFailed("connection refused".to_string()))
    }
}

struct CountingProvider {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SnapshotProvider for CountingProvider {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Snapshot::new())
    }
}

fn static_source(id: &str, priority: i32, snapshot: Value) -> StateSource {
    StateSource::new(
        id,
        id.to_uppercase(),
        "test",
        priority,
        Arc::new(StaticSnapshotProvider::from_value(snapshot)),
    )
}

fn domain(id: &str, fields: &[&str], sources: Vec<StateSource>) -> ReconciliationDomain {
    ReconciliationDomain {
        id: DomainId::new(id),
        name: format!("{} domain", id),
        sources,
        fields: fields.iter().map(|f| f.to_string()).collect(),
        interval: Duration::from_secs(60),
        enabled: true,
    }
}

fn reconciler(config: ReconcilerConfig) -> (Arc<StateReconciler>, EventBus) {
    let event_bus = EventBus::new(256);
    (
        Arc::new(StateReconciler::new(config, event_bus.clone())),
        event_bus,
    )
}

#[tokio::test]
async fn test_comparison_count_is_fields_times_source_pairs() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    let snapshot = json!({"a": 1, "b": "x", "c": [1, 2]});
    let sources = (0..4)
        .map(|i| static_source(&format!("s{}", i), i, snapshot.clone()))
        .collect();
    reconciler.register_domain(domain("grid", &["a", "b", "c"], sources)).unwrap();

    let result = reconciler
        .reconcile_domain(&DomainId::new("grid"))
        .await
        .unwrap();

    // 3 fields × C(4, 2)
    assert_eq!(result.comparisons.len(), 18);
    assert!(result.consistent);
    assert_eq!(result.drift_count, 0);
    assert!(result.suggested_action.is_none());
}

#[tokio::test]
async fn test_value_mismatch_points_at_highest_priority_source() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    reconciler.register_domain(domain(
        "tasks",
        &["status"],
        vec![
            static_source("a", 1, json!({"status": "done"})),
            static_source("b", 2, json!({"status": "pending"})),
        ],
    )).unwrap();

    let result = reconciler
        .reconcile_domain(&DomainId::new("tasks"))
        .await
        .unwrap();

    assert_eq!(result.comparisons.len(), 1);
    assert_eq!(result.comparisons[0].drift, DriftKind::ValueMismatch);
    assert!(!result.consistent);
    assert_eq!(result.drift_count, 1);
    let action = result.suggested_action.unwrap();
    assert!(action.contains("'B' (b)"), "unexpected suggestion: {}", action);
}

#[tokio::test]
async fn test_single_changed_field_drifts_on_every_pair_with_that_source() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    let shared = json!({"status": "running", "replicas": 3, "spec": {"image": "v1"}});
    let mut changed = shared.clone();
    changed["spec"]["image"] = json!("v2");

    reconciler.register_domain(domain(
        "deploy",
        &["status", "replicas", "spec.image"],
        vec![
            static_source("a", 3, shared.clone()),
            static_source("b", 2, shared),
            static_source("c", 1, changed),
        ],
    )).unwrap();

    let result = reconciler
        .reconcile_domain(&DomainId::new("deploy"))
        .await
        .unwrap();

    let drifted: Vec<_> = result
        .comparisons
        .iter()
        .filter(|c| c.drift != DriftKind::None)
        .collect();
    assert_eq!(drifted.len(), 2);
    for comparison in drifted {
        assert_eq!(comparison.field, "spec.image");
        assert!(comparison.source_a.as_str() == "c" || comparison.source_b.as_str() == "c");
    }
    assert_eq!(result.drift_count, 2);
    assert!(result.suggested_action.unwrap().contains("'A' (a)"));
}

#[tokio::test]
async fn test_missing_and_type_mismatch_classification() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    reconciler.register_domain(domain(
        "mixed",
        &["only_b", "count", "absent"],
        vec![
            static_source("a", 1, json!({"count": "3"})),
            static_source("b", 1, json!({"only_b": true, "count": 3})),
        ],
    )).unwrap();

    let result = reconciler
        .reconcile_domain(&DomainId::new("mixed"))
        .await
        .unwrap();

    let drifts: Vec<DriftKind> = result.comparisons.iter().map(|c| c.drift).collect();
    assert_eq!(
        drifts,
        vec![DriftKind::MissingA, DriftKind::TypeMismatch, DriftKind::None]
    );
    // Tie between MissingA and TypeMismatch goes to the first seen
    assert!(result
        .suggested_action
        .unwrap()
        .starts_with("Propagate missing fields"));
}

#[tokio::test]
async fn test_failed_source_becomes_error_marker() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    reconciler.register_domain(domain(
        "flaky",
        &["status", SNAPSHOT_ERROR_KEY],
        vec![
            static_source("ok", 1, json!({"status": "up"})),
            StateSource::new("down", "Down", "test", 0, Arc::new(FailingProvider)),
        ],
    )).unwrap();

    let result = reconciler
        .reconcile_domain(&DomainId::new("flaky"))
        .await
        .unwrap();

    assert!(result.error.is_none());
    assert_eq!(result.comparisons[0].drift, DriftKind::MissingB);
    assert_eq!(result.comparisons[1].drift, DriftKind::MissingA);
    assert_eq!(
        result.comparisons[1].value_b,
        Some(json!("Snapshot fetch failed: connection refused"))
    );
    assert_eq!(result.drift_count, 2);
}

#[tokio::test]
async fn test_invalid_field_path_yields_failed_result() {
    let (reconciler, bus) = reconciler(ReconcilerConfig::default());
    let mut events = bus.subscribe();
    reconciler.register_domain(domain(
        "broken",
        &["spec..image"],
        vec![
            static_source("a", 1, json!({})),
            static_source("b", 2, json!({})),
        ],
    )).unwrap();

    let result = reconciler
        .reconcile_domain(&DomainId::new("broken"))
        .await
        .unwrap();

    assert!(!result.consistent);
    assert_eq!(result.drift_count, 1);
    assert!(result.comparisons.is_empty());
    let error = result.error.clone().unwrap();
    assert!(error.contains("empty segment"), "unexpected error: {}", error);
    assert_eq!(result.suggested_action.as_deref(), Some(error.as_str()));

    match events.recv().await.unwrap() {
        MonitorEvent::Reconciliation(ReconciliationEvent::DriftDetected { result: published }) => {
            assert_eq!(published.id, result.id);
        }
        other => panic!("Wrong event type received: {:?}", other),
    }
    assert_eq!(reconciler.results(None).len(), 1);
}

#[tokio::test]
async fn test_unknown_domain_is_an_error() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    let err = reconciler
        .reconcile_domain(&DomainId::new("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcilerError::DomainNotFound(id) if id.as_str() == "nope"));
    assert!(reconciler.results(None).is_empty());
}

#[tokio::test]
async fn test_history_is_capped_oldest_first() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig {
        max_history: 3,
        ..Default::default()
    });
    reconciler.register_domain(domain(
        "cap",
        &["v"],
        vec![static_source("a", 1, json!({"v": 1})), static_source("b", 1, json!({"v": 1}))],
    )).unwrap();

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(reconciler.reconcile_domain(&DomainId::new("cap")).await.unwrap().id);
    }

    let history: Vec<_> = reconciler.results(None).into_iter().map(|r| r.id).collect();
    assert_eq!(history, ids[2..].to_vec());
}

#[tokio::test]
async fn test_issue_severity_follows_drift_threshold() {
    let (reconciler, bus) = reconciler(ReconcilerConfig {
        drift_threshold: 2,
        ..Default::default()
    });
    let mut issues = bus.subscribe_issues();

    // 1 drift: below threshold, no issue
    reconciler.register_domain(domain(
        "quiet",
        &["a"],
        vec![static_source("x", 1, json!({"a": 1})), static_source("y", 1, json!({"a": 2}))],
    )).unwrap();
    // 2 drifts: medium
    reconciler.register_domain(domain(
        "medium",
        &["a", "b"],
        vec![
            static_source("x", 1, json!({"a": 1, "b": 1})),
            static_source("y", 1, json!({"a": 2, "b": 2})),
        ],
    )).unwrap();
    // 4 drifts: high
    reconciler.register_domain(domain(
        "high",
        &["a", "b", "c", "d"],
        vec![
            static_source("x", 1, json!({"a": 1, "b": 1, "c": 1, "d": 1})),
            static_source("y", 1, json!({"a": 2, "b": 2, "c": 2, "d": 2})),
        ],
    )).unwrap();

    reconciler.reconcile_domain(&DomainId::new("quiet")).await.unwrap();
    reconciler.reconcile_domain(&DomainId::new("medium")).await.unwrap();
    reconciler.reconcile_domain(&DomainId::new("high")).await.unwrap();

    let first = timeout(Duration::from_secs(1), issues.recv()).await.unwrap().unwrap();
    assert_eq!(first.issue_type, IssueType::StateDrift);
    assert_eq!(first.severity, Severity::Medium);
    match &first.evidence {
        IssueEvidence::Reconciliation(result) => assert_eq!(result.domain_id.as_str(), "medium"),
        other => panic!("unexpected evidence: {:?}", other),
    }

    let second = timeout(Duration::from_secs(1), issues.recv()).await.unwrap().unwrap();
    assert_eq!(second.severity, Severity::High);
}

#[tokio::test]
async fn test_reconcile_all_skips_disabled_domains() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    reconciler.register_domain(domain(
        "on",
        &["v"],
        vec![static_source("a", 1, json!({"v": 1})), static_source("b", 1, json!({"v": 1}))],
    )).unwrap();
    let mut off = domain(
        "off",
        &["v"],
        vec![static_source("a", 1, json!({"v": 1})), static_source("b", 1, json!({"v": 2}))],
    );
    off.enabled = false;
    reconciler.register_domain(off).unwrap();

    let results = reconciler.reconcile_all().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].domain_id.as_str(), "on");
    assert_eq!(reconciler.domains().len(), 2);
}

#[tokio::test]
async fn test_latest_results_and_status() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    let left = Arc::new(StaticSnapshotProvider::from_value(json!({"v": 1})));
    reconciler.register_domain(domain(
        "flip",
        &["v"],
        vec![
            StateSource::new("l", "Left", "test", 1, left.clone()),
            static_source("r", 1, json!({"v": 1})),
        ],
    )).unwrap();

    let first = reconciler.reconcile_domain(&DomainId::new("flip")).await.unwrap();
    assert!(first.consistent);

    left.replace(json!({"v": 2}).as_object().cloned().unwrap());
    let second = reconciler.reconcile_domain(&DomainId::new("flip")).await.unwrap();
    assert!(!second.consistent);

    let latest = reconciler.latest_results();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[&DomainId::new("flip")].id, second.id);

    let status = reconciler.status();
    assert!(!status.running);
    assert_eq!(status.domain_count, 1);
    assert_eq!(status.history_size, 2);
    assert_eq!(status.recent_inconsistencies, 1);
}

#[tokio::test]
async fn test_start_polls_until_stopped() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut polled = domain(
        "poll",
        &["v"],
        vec![
            StateSource::new("a", "A", "test", 1, Arc::new(CountingProvider { calls: calls.clone() })),
            static_source("b", 1, json!({})),
        ],
    );
    polled.interval = Duration::from_millis(50);
    reconciler.register_domain(polled).unwrap();

    reconciler.start().await;
    // Initial pass runs before start() returns
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(reconciler.status().running);

    sleep(Duration::from_millis(180)).await;
    reconciler.stop();
    let after_stop = calls.load(Ordering::SeqCst);
    assert!(after_stop >= 3, "expected periodic polling, got {} calls", after_stop);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    assert_eq!(reconciler.results(None).len(), after_stop);
}

#[tokio::test]
async fn test_register_while_running_and_unregister() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    reconciler.start().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let mut late = domain(
        "late",
        &["v"],
        vec![
            StateSource::new("a", "A", "test", 1, Arc::new(CountingProvider { calls: calls.clone() })),
            static_source("b", 1, json!({})),
        ],
    );
    late.interval = Duration::from_millis(40);
    reconciler.register_domain(late).unwrap();

    sleep(Duration::from_millis(130)).await;
    assert!(calls.load(Ordering::SeqCst) >= 2);

    assert!(reconciler.unregister_domain(&DomainId::new("late")));
    assert!(!reconciler.unregister_domain(&DomainId::new("late")));
    let after_unregister = calls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_unregister);

    // History survives unregistering
    assert!(!reconciler.results(Some(&DomainId::new("late"))).is_empty());
    reconciler.stop();
}

#[tokio::test]
async fn test_zero_interval_domain_is_rejected() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    reconciler.start().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let mut busy = domain(
        "busy",
        &["v"],
        vec![
            StateSource::new("a", "A", "test", 1, Arc::new(CountingProvider { calls: calls.clone() })),
            static_source("b", 1, json!({})),
        ],
    );
    busy.interval = Duration::ZERO;

    let err = reconciler.register_domain(busy).unwrap_err();
    assert!(matches!(err, ReconcilerError::InvalidInterval(id) if id.as_str() == "busy"));
    assert!(reconciler.domains().is_empty());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    reconciler.stop();
}

#[tokio::test]
async fn test_dropping_reconciler_ends_its_timers() {
    let (reconciler, _bus) = reconciler(ReconcilerConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut polled = domain(
        "orphan",
        &["v"],
        vec![
            StateSource::new("a", "A", "test", 1, Arc::new(CountingProvider { calls: calls.clone() })),
            static_source("b", 1, json!({})),
        ],
    );
    polled.interval = Duration::from_millis(20);
    reconciler.register_domain(polled).unwrap();

    reconciler.start().await;
    sleep(Duration::from_millis(70)).await;
    assert!(calls.load(Ordering::SeqCst) >= 2);

    // No stop(): dropping the last handle must end polling on its own
    drop(reconciler);
    sleep(Duration::from_millis(40)).await;
    let after_drop = calls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_drop);
}
