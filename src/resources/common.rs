//! Common resource generation utilities.
//!
//! Label sets, object names and owner references shared by every generator.
//! The label sets here are also the selectors the controller uses to find
//! live objects, so a change to one side changes both.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ContainerPort, EnvVar, EnvVarSource, SecretKeySelector};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::PrometheusReplica;
use crate::resources::descriptor::ResourceDescriptor;

/// Label key carrying the owning PrometheusReplica's name.
pub const INSTANCE_LABEL: &str = "replicaCr";
/// Label key marking members of the Thanos gossip mesh.
pub const PEER_LABEL: &str = "thanos-peer";
/// Label key naming the application of a pod.
pub const APP_LABEL: &str = "app";

/// Thanos HTTP port (metrics and UI).
pub const THANOS_HTTP_PORT: i32 = 10902;
/// Thanos gRPC store API port.
pub const THANOS_GRPC_PORT: i32 = 10901;
/// Thanos gossip cluster port.
pub const THANOS_CLUSTER_PORT: i32 = 10900;
/// Prometheus web port.
pub const PROMETHEUS_PORT: i32 = 9090;

/// Thanos image used by the sidecar, store and query containers.
pub const THANOS_IMAGE: &str = "improbable/thanos:master";
/// Prometheus image used by the collectors.
pub const PROMETHEUS_IMAGE: &str = "quay.io/prometheus/prometheus:v2.0.0";

/// A named function within the monitoring mesh.
///
/// Each role owns a canonical label set. Objects are associated with a role
/// and with their parent instance purely through these labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopologyRole {
    /// Prometheus collector pods (with Thanos sidecar).
    PrometheusPods,
    /// Every gossip mesh member of an instance.
    ThanosPeers,
    /// Thanos store nodes.
    ThanosStore,
    /// Thanos query nodes.
    ThanosQuery,
    /// Grafana dashboard. Not scoped to an instance yet.
    Grafana,
}

impl TopologyRole {
    /// Canonical label set for this role under the instance `name`.
    pub fn labels(&self, name: &str) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        match self {
            TopologyRole::PrometheusPods => {
                labels.insert(APP_LABEL.to_string(), "prometheus".to_string());
                labels.insert(INSTANCE_LABEL.to_string(), name.to_string());
                labels.insert(PEER_LABEL.to_string(), "true".to_string());
            }
            TopologyRole::ThanosPeers => {
                labels.insert(INSTANCE_LABEL.to_string(), name.to_string());
                labels.insert(PEER_LABEL.to_string(), "true".to_string());
            }
            TopologyRole::ThanosStore => {
                labels.insert(APP_LABEL.to_string(), "thanos-store".to_string());
                labels.insert(INSTANCE_LABEL.to_string(), name.to_string());
                labels.insert(PEER_LABEL.to_string(), "true".to_string());
            }
            TopologyRole::ThanosQuery => {
                labels.insert(APP_LABEL.to_string(), "thanos-query".to_string());
                labels.insert(INSTANCE_LABEL.to_string(), name.to_string());
                labels.insert(PEER_LABEL.to_string(), "true".to_string());
            }
            TopologyRole::Grafana => {
                // TODO: add INSTANCE_LABEL once Grafana is deployed per instance
                labels.insert(APP_LABEL.to_string(), "grafana".to_string());
            }
        }
        labels
    }

    /// Label selector string matching exactly this role's label set.
    pub fn selector(&self, name: &str) -> String {
        selector_from_labels(&self.labels(name))
    }

    /// Suffix appended to the instance name for objects of this role.
    pub fn suffix(&self) -> &'static str {
        match self {
            TopologyRole::PrometheusPods => "prometheus",
            TopologyRole::ThanosPeers => "thanos-peers",
            TopologyRole::ThanosStore => "thanos-store",
            TopologyRole::ThanosQuery => "thanos-query",
            TopologyRole::Grafana => "grafana",
        }
    }

    /// Stable object name `<instance>-<suffix>`.
    pub fn object_name(&self, name: &str) -> String {
        format!("{}-{}", name, self.suffix())
    }
}

impl std::fmt::Display for TopologyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyRole::PrometheusPods => write!(f, "prometheuses"),
            TopologyRole::ThanosPeers => write!(f, "peers"),
            TopologyRole::ThanosStore => write!(f, "stores"),
            TopologyRole::ThanosQuery => write!(f, "queries"),
            TopologyRole::Grafana => write!(f, "grafana"),
        }
    }
}

/// Render a label set as an equality-based selector (`k1=v1,k2=v2`).
///
/// Keys come out in sorted order because the map is ordered.
pub fn selector_from_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// In-cluster DNS name of a service.
pub fn service_dns_name(service: &str, namespace: &str) -> String {
    format!("{}.{}.svc.cluster.local", service, namespace)
}

/// Gossip bootstrap address every Thanos component joins.
pub fn cluster_peers_address(resource: &PrometheusReplica) -> String {
    let namespace = resource
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    format!(
        "{}:{}",
        service_dns_name(
            &TopologyRole::ThanosPeers.object_name(&resource.name_any()),
            &namespace
        ),
        THANOS_CLUSTER_PORT
    )
}

/// Pod annotations asking Prometheus to scrape the Thanos HTTP port.
pub fn scrape_annotations() -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert("prometheus.io/scrape".to_string(), "true".to_string());
    annotations.insert(
        "prometheus.io/port".to_string(),
        THANOS_HTTP_PORT.to_string(),
    );
    annotations
}

/// The http/grpc/cluster port triple exposed by every Thanos container.
pub fn thanos_container_ports() -> Vec<ContainerPort> {
    [
        ("http", THANOS_HTTP_PORT),
        ("grpc", THANOS_GRPC_PORT),
        ("cluster", THANOS_CLUSTER_PORT),
    ]
    .into_iter()
    .map(|(name, port)| ContainerPort {
        container_port: port,
        name: Some(name.to_string()),
        ..Default::default()
    })
    .collect()
}

/// S3 environment bound to keys of the bucket secret.
///
/// The secret name is passed through as given, even when empty.
pub fn bucket_env(secret_name: &str) -> Vec<EnvVar> {
    [
        ("S3_BUCKET", "s3_bucket"),
        ("S3_ENDPOINT", "s3_endpoint"),
        ("S3_ACCESS_KEY", "s3_access_key"),
        ("S3_SECRET_KEY", "s3_secret_key"),
    ]
    .into_iter()
    .map(|(env, key)| EnvVar {
        name: env.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret_name.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
    .collect()
}

/// Create owner reference for a PrometheusReplica
pub fn owner_reference(resource: &PrometheusReplica) -> OwnerReference {
    OwnerReference {
        api_version: PrometheusReplica::api_version(&()).into_owned(),
        kind: PrometheusReplica::kind(&()).into_owned(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Stamp a descriptor with the owner reference of `owner`.
///
/// The result carries exactly one owner reference, so the cluster garbage
/// collector removes the child together with its parent.
pub fn link(mut descriptor: ResourceDescriptor, owner: &PrometheusReplica) -> ResourceDescriptor {
    descriptor.metadata_mut().owner_references = Some(vec![owner_reference(owner)]);
    descriptor
}
