// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for prometheus-replica-operator.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/mod.rs"]
mod common;

use proptest::prelude::*;

use prometheus_replica_operator::controller::observe::{
    ObservedState, POD_ROLES, RoleQuery, SERVICE_ROLES,
};
use prometheus_replica_operator::controller::status::compose;
use prometheus_replica_operator::resources::common::{INSTANCE_LABEL, selector_from_labels};
use prometheus_replica_operator::resources::{TopologyRole, generate, link};

use common::fixtures::PrometheusReplicaBuilder;

/// Strategy for DNS-1123 style object names.
fn object_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,20}[a-z0-9]"
}

/// Strategy for free-form spec fields, including empty strings.
fn spec_field() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{0,12}"
}

proptest! {
    /// Collector and query run two replicas exactly when highly available;
    /// the store always runs one.
    #[test]
    fn replica_count_law(name in object_name(), namespace in object_name(), ha in any::<bool>()) {
        let replica = PrometheusReplicaBuilder::new(name.clone())
            .namespace(namespace)
            .highly_available(ha)
            .build();
        let expected = if ha { 2 } else { 1 };

        for descriptor in generate(&replica) {
            let replicas = descriptor.replicas();
            let scales_with_ha = descriptor.name() == format!("{name}-prometheus")
                || descriptor.kind() == "Deployment";
            if scales_with_ha {
                prop_assert_eq!(replicas, Some(expected));
            } else if descriptor.kind() == "StatefulSet" {
                prop_assert_eq!(replicas, Some(1));
            } else {
                prop_assert_eq!(replicas, None);
            }
        }
    }

    /// Generated pods carry exactly the labels the observer selects on.
    #[test]
    fn label_consistency(name in object_name(), namespace in object_name(), ha in any::<bool>()) {
        let replica = PrometheusReplicaBuilder::new(name.clone())
            .namespace(namespace.clone())
            .highly_available(ha)
            .build();
        let descriptors = generate(&replica);

        for role in POD_ROLES {
            let query = RoleQuery::new(role, &name);
            let stamped: Vec<_> = descriptors
                .iter()
                .filter_map(|d| d.pod_labels())
                .filter(|labels| selector_from_labels(labels) == query.selector)
                .collect();
            prop_assert_eq!(stamped.len(), 1, "role {} matched {} workloads", role, stamped.len());
        }

        for role in SERVICE_ROLES.into_iter().filter(|r| *r != TopologyRole::Grafana) {
            let query = RoleQuery::new(role, &name);
            let exposed = descriptors.iter().any(|d| {
                d.kind() == "Service" && selector_from_labels(&d.labels()) == query.selector
            });
            prop_assert!(exposed, "no Service for role {}", role);
        }

        for descriptor in &descriptors {
            let labels = descriptor.labels();
            prop_assert_eq!(descriptor.namespace(), namespace.as_str());
            prop_assert_eq!(labels.get(INSTANCE_LABEL), Some(&name));
        }
    }

    /// Spec fields are passed through verbatim and never make generation fail.
    #[test]
    fn generation_is_total(
        name in object_name(),
        retention in spec_field(),
        block in spec_field(),
        config_map in spec_field(),
        secret in spec_field(),
    ) {
        let replica = PrometheusReplicaBuilder::new(name)
            .namespace("ns1")
            .retention(retention.clone())
            .block_duration(block)
            .config_map(config_map)
            .bucket_secret(secret)
            .build();

        let descriptors = generate(&replica);
        prop_assert_eq!(descriptors.len(), 6);
        prop_assert_eq!(&descriptors, &generate(&replica));

        let debug = format!("{:?}", descriptors[0]);
        let expected = format!("--storage.tsdb.retention={retention}");
        prop_assert!(debug.contains(&expected));
    }

    /// Linking always leaves exactly one owner reference.
    #[test]
    fn link_sets_one_owner(name in object_name(), uid in "[a-f0-9]{8}", relink in 1usize..4) {
        let replica = PrometheusReplicaBuilder::new(name.clone())
            .namespace("ns1")
            .uid(uid.clone())
            .build();

        for mut descriptor in generate(&replica) {
            for _ in 0..relink {
                descriptor = link(descriptor, &replica);
            }
            let owners = descriptor.owner_references();
            prop_assert_eq!(owners.len(), 1);
            prop_assert_eq!(&owners[0].name, &name);
            prop_assert_eq!(&owners[0].uid, &uid);
        }
    }

    /// Composition is a pure function of the observation.
    #[test]
    fn compose_is_deterministic(
        pods in proptest::collection::vec(object_name(), 0..5),
        query_services in proptest::collection::vec(object_name(), 0..3),
        namespace in object_name(),
    ) {
        let mut observed = ObservedState::default();
        observed.pods.insert(TopologyRole::PrometheusPods, pods.clone());
        observed.services.insert(TopologyRole::ThanosQuery, query_services.clone());

        let first = compose(&observed, &namespace);
        let second = compose(&observed, &namespace);

        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(&a, &b);
                prop_assert_eq!(&a.local.prometheuses, &pods);
                prop_assert_eq!(
                    a.output.query,
                    format!("{}.{}.svc.cluster.local", query_services[0], namespace)
                );
            }
            (Err(_), Err(_)) => prop_assert!(query_services.is_empty()),
            _ => prop_assert!(false, "compose disagreed with itself"),
        }
    }
}
