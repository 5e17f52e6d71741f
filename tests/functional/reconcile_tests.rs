//! Reconcile pass tests against the in-memory store.

use std::sync::Arc;

use prometheus_replica_operator::OperatorConfig;
use prometheus_replica_operator::controller::{Engine, Error, ObjectKind, PassStage, ReplicaEvent};
use prometheus_replica_operator::crd::{PrometheusReplica, PrometheusReplicaStatus, ReplicaPhase};
use prometheus_replica_operator::health::HealthState;
use prometheus_replica_operator::resources::TopologyRole;
use prometheus_replica_operator::resources::common::INSTANCE_LABEL;

use crate::common::fixtures::{PrometheusReplicaBuilder, demo_replica};
use crate::mock_store::MockStore;

fn engine() -> Engine<MockStore> {
    Engine::new(MockStore::new(), OperatorConfig::default())
}

fn upsert(replica: &PrometheusReplica) -> ReplicaEvent {
    ReplicaEvent::Upsert(Arc::new(replica.clone()))
}

/// The replica as the next watch event would deliver it, carrying `status`.
fn with_status(
    replica: &PrometheusReplica,
    status: PrometheusReplicaStatus,
) -> PrometheusReplica {
    let mut next = replica.clone();
    next.status = Some(status);
    next
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_first_pass_creates_topology_and_persists_status() {
    let engine = engine();
    let outcome = engine.handle(upsert(&demo_replica())).await.unwrap();

    assert_eq!(
        outcome.stages,
        vec![
            PassStage::Start,
            PassStage::GenerateTopology,
            PassStage::Materialize,
            PassStage::Observe,
            PassStage::ComposeStatus,
            PassStage::Persist,
            PassStage::Done,
        ]
    );
    assert_eq!(outcome.created, 6);
    assert_eq!(outcome.already_existed, 0);
    assert!(outcome.persisted);

    assert_eq!(
        engine.store().object_names(),
        vec![
            "Deployment ns1/demo-thanos-query",
            "Service ns1/demo-thanos-peers",
            "Service ns1/demo-thanos-query",
            "Service ns1/demo-thanos-store",
            "StatefulSet ns1/demo-prometheus",
            "StatefulSet ns1/demo-thanos-store",
        ]
    );

    let status = engine.store().last_status().unwrap();
    assert_eq!(status.phase, ReplicaPhase::Creating);
    assert_eq!(status.local.prometheuses, names(&["demo-prometheus-0"]));
    assert_eq!(status.local.stores, names(&["demo-thanos-store-0"]));
    assert_eq!(status.local.queries, names(&["demo-thanos-query-0"]));
    assert_eq!(status.output.query, "demo-thanos-query.ns1.svc.cluster.local");
    assert_eq!(status.output.grafana, "");
    assert_eq!(outcome.status, Some(status));
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let engine = engine();
    let replica = demo_replica();

    let first = engine.handle(upsert(&replica)).await.unwrap();
    let objects_after_first = engine.store().object_names();
    let stored = engine.store().last_status().unwrap();

    let second = engine
        .handle(upsert(&with_status(&replica, stored.clone())))
        .await
        .unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(second.already_existed, 6);
    assert_eq!(engine.store().object_names(), objects_after_first);
    assert_eq!(second.status, first.status);
    assert!(!second.persisted);
    assert!(!second.stages.contains(&PassStage::Persist));
    assert_eq!(engine.store().status_writes().len(), 1);
}

#[tokio::test]
async fn test_persist_happens_at_most_once_for_unchanged_state() {
    let engine = engine();
    let mut replica = demo_replica();

    for _ in 0..4 {
        engine.handle(upsert(&replica)).await.unwrap();
        if let Some(status) = engine.store().last_status() {
            replica = with_status(&replica, status);
        }
    }

    assert_eq!(engine.store().status_writes().len(), 1);
}

#[tokio::test]
async fn test_equal_stored_status_is_not_rewritten() {
    // Compute the converged status with one engine, then hand a fresh value
    // equal to it to another engine over the same live state.
    let seed = engine();
    seed.handle(upsert(&demo_replica())).await.unwrap();
    let converged = seed.store().last_status().unwrap();

    let engine = engine();
    engine.handle(upsert(&demo_replica())).await.unwrap();
    let replica = with_status(&demo_replica(), converged);
    let outcome = engine.handle(upsert(&replica)).await.unwrap();

    assert!(!outcome.persisted);
    assert_eq!(engine.store().status_writes().len(), 1);
}

#[tokio::test]
async fn test_output_change_with_equal_local_is_persisted() {
    let engine = engine();
    engine.handle(upsert(&demo_replica())).await.unwrap();

    let mut stale = engine.store().last_status().unwrap();
    stale.output.query = "old-query.ns1.svc.cluster.local".to_string();

    let outcome = engine
        .handle(upsert(&with_status(&demo_replica(), stale)))
        .await
        .unwrap();

    assert!(outcome.persisted);
    assert_eq!(
        engine.store().last_status().unwrap().output.query,
        "demo-thanos-query.ns1.svc.cluster.local"
    );
}

#[tokio::test]
async fn test_out_of_band_service_counts_as_existing() {
    let engine = engine();
    engine.store().add_service(
        "ns1",
        "demo-thanos-query",
        TopologyRole::ThanosQuery.labels("demo"),
    );
    // Mark the name as taken so create reports already-exists
    let descriptor = prometheus_replica_operator::resources::generate(&demo_replica())
        .into_iter()
        .find(|d| d.kind() == "Service" && d.name() == "demo-thanos-query")
        .unwrap();
    engine.store().preload(descriptor);

    let outcome = engine.handle(upsert(&demo_replica())).await.unwrap();

    assert_eq!(outcome.created, 5);
    assert_eq!(outcome.already_existed, 1);
    let status = outcome.status.unwrap();
    assert_eq!(status.output.query, "demo-thanos-query.ns1.svc.cluster.local");

    // Pre-existing objects are never touched
    let svc = engine
        .store()
        .object("Service", "ns1", "demo-thanos-query")
        .unwrap();
    assert!(svc.owner_references().is_empty());
}

#[tokio::test]
async fn test_grafana_service_is_reported() {
    let engine = engine();
    engine
        .store()
        .add_service("ns1", "grafana", TopologyRole::Grafana.labels("demo"));

    let outcome = engine.handle(upsert(&demo_replica())).await.unwrap();

    assert_eq!(
        outcome.status.unwrap().output.grafana,
        "grafana.ns1.svc.cluster.local"
    );
}

#[tokio::test]
async fn test_empty_query_service_observation_aborts() {
    let engine = engine();
    engine.store().hide_created_services(true);

    let err = engine.handle(upsert(&demo_replica())).await.unwrap_err();

    assert!(matches!(
        err,
        Error::EmptyObservation {
            role: TopologyRole::ThanosQuery,
            kind: "Service"
        }
    ));
    assert!(err.is_retryable());
    assert!(engine.store().status_writes().is_empty());
}

#[tokio::test]
async fn test_materialize_failure_aborts_without_rollback() {
    let engine = engine();
    engine.store().fail_create(Some("demo-thanos-store"));

    let err = engine.handle(upsert(&demo_replica())).await.unwrap_err();

    match err {
        Error::Materialize { kind, name, .. } => {
            assert_eq!(kind, "StatefulSet");
            assert_eq!(name, "demo-thanos-store");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Collector and peers were created before the failure and stay
    assert_eq!(
        engine.store().object_names(),
        vec![
            "Service ns1/demo-thanos-peers",
            "StatefulSet ns1/demo-prometheus",
        ]
    );
    assert_eq!(engine.store().list_calls(), 0);
    assert!(engine.store().status_writes().is_empty());

    // The next pass fills in the rest
    engine.store().fail_create(None);
    let outcome = engine.handle(upsert(&demo_replica())).await.unwrap();
    assert_eq!(outcome.created, 4);
    assert_eq!(outcome.already_existed, 2);
    assert!(outcome.persisted);
}

#[tokio::test]
async fn test_observe_failure_aborts() {
    let engine = engine();
    engine.store().fail_list(Some(ObjectKind::Pod));

    let err = engine.handle(upsert(&demo_replica())).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Observe {
            role: TopologyRole::PrometheusPods,
            kind: "Pod",
            ..
        }
    ));
    assert_eq!(engine.store().list_calls(), 1);
    assert!(engine.store().status_writes().is_empty());
}

#[tokio::test]
async fn test_persist_failure_is_returned() {
    let engine = engine();
    engine.store().fail_status(true);

    let err = engine.handle(upsert(&demo_replica())).await.unwrap_err();

    assert!(matches!(err, Error::Persist { ref name, .. } if name == "demo"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_delete_has_no_side_effects() {
    let engine = engine();
    let outcome = engine
        .handle(ReplicaEvent::Delete(Arc::new(demo_replica())))
        .await
        .unwrap();

    assert_eq!(outcome.stages, vec![PassStage::Start, PassStage::Done]);
    assert_eq!(outcome.status, None);
    assert_eq!(engine.store().create_calls(), 0);
    assert_eq!(engine.store().list_calls(), 0);
    assert!(engine.store().status_writes().is_empty());
}

#[tokio::test]
async fn test_missing_namespace_is_rejected() {
    let engine = engine();
    let replica = PrometheusReplicaBuilder::new("demo").build();

    let err = engine.handle(upsert(&replica)).await.unwrap_err();

    assert!(matches!(err, Error::MissingField(_)));
    assert_eq!(engine.store().create_calls(), 0);
}

#[tokio::test]
async fn test_highly_available_topology() {
    let engine = engine();
    let replica = PrometheusReplicaBuilder::new("demo")
        .namespace("ns1")
        .highly_available(true)
        .build();

    let status = engine.handle(upsert(&replica)).await.unwrap().status.unwrap();

    assert_eq!(
        status.local.prometheuses,
        names(&["demo-prometheus-0", "demo-prometheus-1"])
    );
    assert_eq!(status.local.stores, names(&["demo-thanos-store-0"]));
    assert_eq!(
        status.local.queries,
        names(&["demo-thanos-query-0", "demo-thanos-query-1"])
    );
}

#[tokio::test]
async fn test_created_children_are_owned_by_the_replica() {
    let engine = engine();
    engine.handle(upsert(&demo_replica())).await.unwrap();

    for (kind, name) in [
        ("StatefulSet", "demo-prometheus"),
        ("Service", "demo-thanos-peers"),
        ("StatefulSet", "demo-thanos-store"),
        ("Service", "demo-thanos-store"),
        ("Deployment", "demo-thanos-query"),
        ("Service", "demo-thanos-query"),
    ] {
        let object = engine.store().object(kind, "ns1", name).unwrap();
        let owners = object.owner_references();
        assert_eq!(owners.len(), 1, "{object}");
        assert_eq!(owners[0].kind, "PrometheusReplica");
        assert_eq!(owners[0].name, "demo");
        assert_eq!(owners[0].uid, "test-uid-demo");
        assert_eq!(owners[0].controller, Some(true));
    }
}

#[tokio::test]
async fn test_instances_are_isolated() {
    let engine = engine();
    engine.handle(upsert(&demo_replica())).await.unwrap();

    let other = PrometheusReplicaBuilder::new("other").namespace("ns1").build();
    let status = engine.handle(upsert(&other)).await.unwrap().status.unwrap();

    assert_eq!(status.local.prometheuses, names(&["other-prometheus-0"]));
    assert_eq!(status.output.query, "other-thanos-query.ns1.svc.cluster.local");
    for pod in engine.store().pods() {
        let instance = pod.labels.get(INSTANCE_LABEL).unwrap();
        assert!(pod.name.starts_with(instance.as_str()));
    }
}

#[tokio::test]
async fn test_concurrent_passes_for_one_instance() {
    let engine = Arc::new(engine());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.handle(upsert(&demo_replica())).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        created += handle.await.unwrap().unwrap().created;
    }

    assert_eq!(created, 6);
    assert_eq!(engine.store().object_names().len(), 6);
    assert_eq!(
        engine.store().max_in_flight(),
        1,
        "passes for one instance overlapped"
    );
}

#[tokio::test]
async fn test_passes_for_different_instances_overlap() {
    let engine = Arc::new(engine());

    let handles: Vec<_> = ["demo", "other"]
        .into_iter()
        .map(|name| {
            let engine = engine.clone();
            let replica = PrometheusReplicaBuilder::new(name).namespace("ns1").build();
            tokio::spawn(async move { engine.handle(upsert(&replica)).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().created, 6);
    }
    assert!(engine.store().max_in_flight() > 1);
}

#[tokio::test]
async fn test_delete_waits_for_in_flight_pass() {
    let engine = Arc::new(engine());
    let replica = demo_replica();

    let pass = {
        let engine = engine.clone();
        let replica = replica.clone();
        tokio::spawn(async move { engine.handle(upsert(&replica)).await })
    };
    // Let the pass start and suspend inside the store
    tokio::task::yield_now().await;

    let deleted = engine
        .handle(ReplicaEvent::Delete(Arc::new(replica.clone())))
        .await
        .unwrap();
    assert_eq!(deleted.stages, vec![PassStage::Start, PassStage::Done]);
    // The pass finished before the delete was handled
    assert!(pass.is_finished());
    assert_eq!(pass.await.unwrap().unwrap().created, 6);

    // A fresh pass after the delete still runs alone
    engine.handle(upsert(&replica)).await.unwrap();
    assert_eq!(engine.store().max_in_flight(), 1);
}

#[tokio::test]
async fn test_pass_records_metrics() {
    let health = Arc::new(HealthState::new());
    let engine = Engine::new(MockStore::new(), OperatorConfig::default())
        .with_health_state(Some(health.clone()));

    engine.handle(upsert(&demo_replica())).await.unwrap();

    let encoded = health.metrics.encode();
    assert!(encoded.contains("prometheusreplica_objects_created_total{kind=\"StatefulSet\"} 2"));
    assert!(encoded.contains("prometheusreplica_status_writes_total"));
    assert!(encoded.contains("role=\"prometheuses\""));
}

#[tokio::test]
async fn test_delete_drops_instance_metrics() {
    let health = Arc::new(HealthState::new());
    let engine = Engine::new(MockStore::new(), OperatorConfig::default())
        .with_health_state(Some(health.clone()));

    engine.handle(upsert(&demo_replica())).await.unwrap();
    assert!(health.metrics.encode().contains("name=\"demo\""));

    engine
        .handle(ReplicaEvent::Delete(Arc::new(demo_replica())))
        .await
        .unwrap();

    let encoded = health.metrics.encode();
    assert!(!encoded.contains("name=\"demo\""));
    assert!(encoded.contains("prometheusreplica_objects_created_total{kind=\"Service\"} 3"));
}
