//! StatefulSet generation for the collector and store tiers.
//!
//! - **Collector**: Prometheus with a Thanos sidecar that ships blocks to the
//!   bucket and joins the gossip mesh
//! - **Store**: Thanos store node serving historical blocks from the bucket

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource,
    PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use kube::ResourceExt;
use tracing::debug;

use crate::crd::PrometheusReplica;
use crate::resources::common::{
    APP_LABEL, PROMETHEUS_IMAGE, PROMETHEUS_PORT, THANOS_IMAGE, TopologyRole, bucket_env,
    cluster_peers_address, scrape_annotations, thanos_container_ports,
};

/// Shared config directory written by the sidecar's reloader
const SHARED_CONFIG_DIR: &str = "/etc/prometheus-shared";
/// Directory holding the config template from the ConfigMap
const CONFIG_TEMPLATE_DIR: &str = "/etc/prometheus";
/// Prometheus TSDB path, shared with the sidecar
const TSDB_PATH: &str = "/var/prometheus";
/// Thanos store local cache path
const STORE_PATH: &str = "/var/thanos/store";

/// Collector replica count: two when highly available, otherwise one.
pub fn collector_replicas(resource: &PrometheusReplica) -> i32 {
    if resource.spec.highly_available { 2 } else { 1 }
}

/// Store replica count. The store tier does not scale with HA.
pub fn store_replicas(_resource: &PrometheusReplica) -> i32 {
    1
}

/// Generate the Prometheus collector StatefulSet.
pub fn generate_collector_statefulset(resource: &PrometheusReplica) -> StatefulSet {
    let role = TopologyRole::PrometheusPods;
    let name = role.object_name(&resource.name_any());
    let labels = role.labels(&resource.name_any());
    let replicas = collector_replicas(resource);

    debug!(
        name = %name,
        replicas,
        retention = %resource.spec.metrics.retention,
        block_duration = %resource.spec.metrics.block_duration,
        config_map = %resource.spec.config_map,
        bucket_secret = %resource.spec.bucket_secret,
        "Generating collector StatefulSet"
    );

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: Some(name),
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
                    affinity: Some(collector_anti_affinity()),
                    containers: vec![
                        prometheus_container(resource),
                        sidecar_container(resource),
                    ],
                    volumes: Some(collector_volumes(resource)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Keep two collectors off the same node.
fn collector_anti_affinity() -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key: APP_LABEL.to_string(),
                        operator: "In".to_string(),
                        values: Some(vec!["prometheus".to_string()]),
                    }]),
                    ..Default::default()
                }),
                topology_key: "kubernetes.io/hostname".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the Prometheus command line.
fn prometheus_args(resource: &PrometheusReplica) -> Vec<String> {
    let metrics = &resource.spec.metrics;
    vec![
        format!("--storage.tsdb.retention={}", metrics.retention),
        format!("--config.file={}/prometheus.yml", SHARED_CONFIG_DIR),
        format!("--storage.tsdb.path={}", TSDB_PATH),
        format!("--storage.tsdb.min-block-duration={}", metrics.block_duration),
        format!("--storage.tsdb.max-block-duration={}", metrics.block_duration),
        "--web.enable-lifecycle".to_string(),
    ]
}

fn prometheus_container(resource: &PrometheusReplica) -> Container {
    Container {
        name: "prometheus".to_string(),
        image: Some(PROMETHEUS_IMAGE.to_string()),
        args: Some(prometheus_args(resource)),
        ports: Some(vec![ContainerPort {
            container_port: PROMETHEUS_PORT,
            name: Some("http".to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            volume_mount("config-shared", SHARED_CONFIG_DIR),
            volume_mount("data", TSDB_PATH),
        ]),
        ..Default::default()
    }
}

fn sidecar_container(resource: &PrometheusReplica) -> Container {
    Container {
        name: "thanos-sidecar".to_string(),
        image: Some(THANOS_IMAGE.to_string()),
        args: Some(vec![
            "sidecar".to_string(),
            "--log.level=debug".to_string(),
            format!("--tsdb.path={}", TSDB_PATH),
            format!("--prometheus.url=http://127.0.0.1:{}", PROMETHEUS_PORT),
            format!("--cluster.peers={}", cluster_peers_address(resource)),
            format!(
                "--reloader.config-file={}/prometheus.yml.tmpl",
                CONFIG_TEMPLATE_DIR
            ),
            format!(
                "--reloader.config-envsubst-file={}/prometheus.yml",
                SHARED_CONFIG_DIR
            ),
            "--s3.signature-version2".to_string(),
        ]),
        env: Some(bucket_env(&resource.spec.bucket_secret)),
        ports: Some(thanos_container_ports()),
        volume_mounts: Some(vec![
            volume_mount("config", CONFIG_TEMPLATE_DIR),
            volume_mount("config-shared", SHARED_CONFIG_DIR),
            volume_mount("data", TSDB_PATH),
        ]),
        ..Default::default()
    }
}

fn collector_volumes(resource: &PrometheusReplica) -> Vec<Volume> {
    vec![
        empty_dir_volume("config-shared"),
        empty_dir_volume("data"),
        Volume {
            name: "config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: resource.spec.config_map.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

/// Generate the Thanos store StatefulSet.
pub fn generate_store_statefulset(resource: &PrometheusReplica) -> StatefulSet {
    let role = TopologyRole::ThanosStore;
    let name = role.object_name(&resource.name_any());
    let labels = role.labels(&resource.name_any());

    debug!(
        name = %name,
        bucket_secret = %resource.spec.bucket_secret,
        "Generating store StatefulSet"
    );

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: Some(name),
            replicas: Some(store_replicas(resource)),
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
                        name: "thanos-store".to_string(),
                        image: Some(THANOS_IMAGE.to_string()),
                        args: Some(vec![
                            "store".to_string(),
                            "--log.level=debug".to_string(),
                            format!("--tsdb.path={}", STORE_PATH),
                            format!("--cluster.peers={}", cluster_peers_address(resource)),
                        ]),
                        env: Some(bucket_env(&resource.spec.bucket_secret)),
                        ports: Some(thanos_container_ports()),
                        volume_mounts: Some(vec![volume_mount("data", STORE_PATH)]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![empty_dir_volume("data")]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn volume_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}
