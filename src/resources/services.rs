//! Service generation for the Thanos mesh.
//!
//! Creates three services:
//! - **Peers Service**: Headless, resolves every gossip member of the instance
//! - **Store Service**: Fronts the store tier
//! - **Query Service**: The aggregation endpoint reported in status

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::PrometheusReplica;
use crate::resources::common::{PROMETHEUS_PORT, THANOS_CLUSTER_PORT, TopologyRole};

/// Generate the headless peers Service used for gossip discovery.
pub fn generate_peers_service(resource: &PrometheusReplica) -> Service {
    generate_role_service(
        resource,
        TopologyRole::ThanosPeers,
        Some("None".to_string()),
        ServicePort {
            name: Some("cluster".to_string()),
            port: THANOS_CLUSTER_PORT,
            target_port: Some(IntOrString::String("cluster".to_string())),
            ..Default::default()
        },
    )
}

/// Generate the Service in front of the store tier.
pub fn generate_store_service(resource: &PrometheusReplica) -> Service {
    generate_role_service(
        resource,
        TopologyRole::ThanosStore,
        None,
        ServicePort {
            name: Some("http-store".to_string()),
            port: PROMETHEUS_PORT,
            target_port: Some(IntOrString::String("http".to_string())),
            ..Default::default()
        },
    )
}

/// Generate the Service in front of the query tier.
pub fn generate_query_service(resource: &PrometheusReplica) -> Service {
    generate_role_service(
        resource,
        TopologyRole::ThanosQuery,
        None,
        ServicePort {
            name: Some("http-query".to_string()),
            port: PROMETHEUS_PORT,
            target_port: Some(IntOrString::String("http".to_string())),
            ..Default::default()
        },
    )
}

/// A ClusterIP Service labelled with, and selecting, one role's label set.
fn generate_role_service(
    resource: &PrometheusReplica,
    role: TopologyRole,
    cluster_ip: Option<String>,
    port: ServicePort,
) -> Service {
    let labels = role.labels(&resource.name_any());

    Service {
        metadata: ObjectMeta {
            name: Some(role.object_name(&resource.name_any())),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            cluster_ip,
            session_affinity: Some("None".to_string()),
            selector: Some(labels),
            ports: Some(vec![port]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::crd::PrometheusReplicaSpec;

    fn test_resource(name: &str) -> PrometheusReplica {
        PrometheusReplica {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns1".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: PrometheusReplicaSpec::default(),
            status: None,
        }
    }

    #[test]
    fn test_generate_peers_service() {
        let resource = test_resource("demo");
        let svc = generate_peers_service(&resource);

        assert_eq!(svc.metadata.name, Some("demo-thanos-peers".to_string()));
        assert_eq!(svc.metadata.namespace, Some("ns1".to_string()));

        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        assert_eq!(spec.selector, Some(TopologyRole::ThanosPeers.labels("demo")));

        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports.first().unwrap().port, THANOS_CLUSTER_PORT);
    }

    #[test]
    fn test_generate_query_service() {
        let resource = test_resource("demo");
        let svc = generate_query_service(&resource);

        assert_eq!(svc.metadata.name, Some("demo-thanos-query".to_string()));
        assert_eq!(
            svc.metadata.labels,
            Some(TopologyRole::ThanosQuery.labels("demo"))
        );

        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_, Some("ClusterIP".to_string()));
        assert!(spec.cluster_ip.is_none());
        assert_eq!(
            spec.ports.unwrap().first().unwrap().name,
            Some("http-query".to_string())
        );
    }

    #[test]
    fn test_generate_store_service() {
        let resource = test_resource("demo");
        let svc = generate_store_service(&resource);

        assert_eq!(svc.metadata.name, Some("demo-thanos-store".to_string()));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.selector, Some(TopologyRole::ThanosStore.labels("demo")));
    }
}
