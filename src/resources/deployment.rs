//! Deployment generation for the Thanos query tier.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use tracing::debug;

use crate::crd::PrometheusReplica;
use crate::resources::common::{
    THANOS_IMAGE, TopologyRole, cluster_peers_address, scrape_annotations,
    thanos_container_ports,
};

/// Query replica count: two when highly available, otherwise one.
pub fn query_replicas(resource: &PrometheusReplica) -> i32 {
    if resource.spec.highly_available { 2 } else { 1 }
}

/// Generate the Thanos query Deployment.
///
/// Query nodes discover sidecars and stores through the peers Service; the
/// Service is not guaranteed to exist before the Deployment, and Thanos
/// retries the gossip join until it resolves.
pub fn generate_query_deployment(resource: &PrometheusReplica) -> Deployment {
    let role = TopologyRole::ThanosQuery;
    let name = role.object_name(&resource.name_any());
    let labels = role.labels(&resource.name_any());
    let replicas = query_replicas(resource);

    debug!(name = %name, replicas, "Generating query Deployment");

    Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(scrape_annotations()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "thanos-query".to_string(),
                        image: Some(THANOS_IMAGE.to_string()),
                        args: Some(vec![
                            "query".to_string(),
                            "--log.level=debug".to_string(),
                            format!("--cluster.peers={}", cluster_peers_address(resource)),
                            "--query.replica-label=replica".to_string(),
                        ]),
                        ports: Some(thanos_container_ports()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
