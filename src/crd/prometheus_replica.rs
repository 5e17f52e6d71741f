//! PrometheusReplica Custom Resource Definition.
//!
//! Describes a horizontally replicated Prometheus topology backed by Thanos:
//! collectors with a sidecar, a store tier reading from an object-store
//! bucket and a query tier federating both over a gossip mesh.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PrometheusReplica is a custom resource for deploying a Thanos-backed
/// Prometheus topology.
///
/// Example:
/// ```yaml
/// apiVersion: prometheus.robszumski.com/v1alpha1
/// kind: PrometheusReplica
/// metadata:
///   name: demo
/// spec:
///   highlyAvailable: true
///   metrics:
///     retention: 15d
///     blockDuration: 2h
///   configMap: prometheus-config
///   bucketSecret: thanos-bucket
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "prometheus.robszumski.com",
    version = "v1alpha1",
    kind = "PrometheusReplica",
    plural = "prometheusreplicas",
    shortname = "pr",
    status = "PrometheusReplicaStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"HA", "type":"boolean", "jsonPath":".spec.highlyAvailable"}"#,
    printcolumn = r#"{"name":"Query", "type":"string", "jsonPath":".status.output.query"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusReplicaSpec {
    /// Run two collectors and two query nodes instead of one.
    /// The store tier is never scaled by this flag.
    #[serde(default)]
    pub highly_available: bool,

    /// TSDB retention and block settings for the collectors.
    #[serde(default)]
    pub metrics: MetricsSpec,

    /// Name of the ConfigMap holding the Prometheus configuration template.
    #[serde(default)]
    pub config_map: String,

    /// Name of the Secret holding the object-store bucket parameters.
    #[serde(default)]
    pub bucket_secret: String,
}

/// Metrics storage settings, passed verbatim to Prometheus.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSpec {
    /// Local retention window (e.g. "15d").
    #[serde(default)]
    pub retention: String,

    /// Duration of a TSDB block before it is shipped to the bucket (e.g. "2h").
    #[serde(default)]
    pub block_duration: String,
}

/// Status of a PrometheusReplica.
///
/// Everything here is derived from the live objects found by label queries,
/// so two passes over unchanged cluster state produce equal values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusReplicaStatus {
    /// Current phase of the topology.
    #[serde(default)]
    pub phase: ReplicaPhase,

    /// Pods discovered for each in-cluster role.
    #[serde(default)]
    pub local: LocalStatus,

    /// Endpoints exposed to consumers.
    #[serde(default)]
    pub output: OutputStatus,
}

/// Pod names per role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalStatus {
    /// Prometheus collector pods.
    #[serde(default)]
    pub prometheuses: Vec<String>,
    /// Thanos store pods.
    #[serde(default)]
    pub stores: Vec<String>,
    /// Thanos query pods.
    #[serde(default)]
    pub queries: Vec<String>,
}

/// Consumer-facing endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatus {
    /// DNS name of the Grafana service, empty until one is discovered.
    #[serde(default)]
    pub grafana: String,
    /// DNS name of the Thanos query service.
    #[serde(default)]
    pub query: String,
}

/// ReplicaPhase represents the lifecycle phase of a PrometheusReplica.
///
/// Only `Creating` is derived today; readiness is not read from pod status.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ReplicaPhase {
    /// Child resources exist or are being created.
    #[default]
    Creating,
    /// All roles are serving.
    Ready,
    /// Some role lost pods.
    Degraded,
}

impl std::fmt::Display for ReplicaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicaPhase::Creating => write!(f, "Creating"),
            ReplicaPhase::Ready => write!(f, "Ready"),
            ReplicaPhase::Degraded => write!(f, "Degraded"),
        }
    }
}
