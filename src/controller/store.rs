//! Object store capability used by the reconcile engine.
//!
//! The engine never talks to `kube::Api` directly. It goes through
//! [`ObjectStore`], which [`KubeStore`] implements against the cluster and the
//! functional tests implement in memory.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use thiserror::Error;
use tracing::debug;

use crate::controller::error::{is_kube_not_found, is_kube_retryable};
use crate::crd::{PrometheusReplica, PrometheusReplicaStatus};
use crate::resources::ResourceDescriptor;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "prometheus-replica-operator";

/// Errors reported by an [`ObjectStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object to create is already present.
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// Any other API failure.
    #[error(transparent)]
    Kube(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Kube(e) if is_kube_not_found(e))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::AlreadyExists { .. } => false,
            StoreError::Kube(e) => is_kube_retryable(e),
        }
    }
}

/// Object shapes the engine lists by label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Pod,
    Service,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Pod => "Pod",
            ObjectKind::Service => "Service",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrow create/list/update capability over the cluster object store.
pub trait ObjectStore: Send + Sync {
    /// Create the object. Must report [`StoreError::AlreadyExists`] when an
    /// object with the same kind, namespace and name is present, and must not
    /// touch that object.
    fn create(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Names of the objects of `kind` in `namespace` matching the
    /// equality-based `selector`, in the order the store returns them.
    fn list_names(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Replace the status of `replica`.
    ///
    /// The write is conditional on `replica`'s resource version when it has one.
    fn update_status(
        &self,
        replica: &PrometheusReplica,
        status: &PrometheusReplicaStatus,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// [`ObjectStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map an API conflict on create to [`StoreError::AlreadyExists`].
fn classify_create_error(e: kube::Error, kind: &'static str, name: &str) -> StoreError {
    match e {
        kube::Error::Api(ref resp) if resp.code == 409 || resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind,
                name: name.to_string(),
            }
        }
        other => StoreError::Kube(other),
    }
}

impl ObjectStore for KubeStore {
    async fn create(&self, descriptor: &ResourceDescriptor) -> Result<(), StoreError> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let namespace = descriptor.namespace();
        let result = match descriptor {
            ResourceDescriptor::StatefulWorkload(sts) => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
                api.create(&params, sts).await.map(|_| ())
            }
            ResourceDescriptor::StatelessWorkload(deploy) => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                api.create(&params, deploy).await.map(|_| ())
            }
            ResourceDescriptor::NetworkService(svc) => {
                let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
                api.create(&params, svc).await.map(|_| ())
            }
        };
        result.map_err(|e| classify_create_error(e, descriptor.kind(), descriptor.name()))
    }

    async fn list_names(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, StoreError> {
        let params = ListParams::default().labels(selector);
        let names: Vec<String> = match kind {
            ObjectKind::Pod => {
                let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
                api.list(&params)
                    .await?
                    .items
                    .iter()
                    .map(|p| p.name_any())
                    .collect()
            }
            ObjectKind::Service => {
                let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
                api.list(&params)
                    .await?
                    .items
                    .iter()
                    .map(|s| s.name_any())
                    .collect()
            }
        };
        debug!(kind = %kind, selector = %selector, count = names.len(), "Listed objects");
        Ok(names)
    }

    async fn update_status(
        &self,
        replica: &PrometheusReplica,
        status: &PrometheusReplicaStatus,
    ) -> Result<(), StoreError> {
        let namespace = replica.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<PrometheusReplica> = Api::namespaced(self.client.clone(), &namespace);

        let mut patch = serde_json::json!({ "status": status });
        if let Some(rv) = replica.resource_version() {
            patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
        }

        api.patch_status(
            &replica.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}
