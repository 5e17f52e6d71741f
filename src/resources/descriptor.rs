//! Typed wrapper over the child objects of a PrometheusReplica.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// One desired child object.
///
/// Descriptors are plain values: generating one has no side effects, and they
/// carry no owner reference until [`crate::resources::common::link`] stamps one.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceDescriptor {
    /// A workload with stable pod identity.
    StatefulWorkload(StatefulSet),
    /// A replicated workload without stable identity.
    StatelessWorkload(Deployment),
    /// A Service binding pods into the mesh or exposing them.
    NetworkService(Service),
}

impl ResourceDescriptor {
    /// Kubernetes kind of the wrapped object.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceDescriptor::StatefulWorkload(_) => "StatefulSet",
            ResourceDescriptor::StatelessWorkload(_) => "Deployment",
            ResourceDescriptor::NetworkService(_) => "Service",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ResourceDescriptor::StatefulWorkload(o) => &o.metadata,
            ResourceDescriptor::StatelessWorkload(o) => &o.metadata,
            ResourceDescriptor::NetworkService(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ResourceDescriptor::StatefulWorkload(o) => &mut o.metadata,
            ResourceDescriptor::StatelessWorkload(o) => &mut o.metadata,
            ResourceDescriptor::NetworkService(o) => &mut o.metadata,
        }
    }

    /// Object name, empty if unset.
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Object namespace, empty if unset.
    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    /// Labels stamped on the object itself.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata().labels.clone().unwrap_or_default()
    }

    /// Labels stamped on the pods a workload creates. `None` for services.
    pub fn pod_labels(&self) -> Option<BTreeMap<String, String>> {
        let template = match self {
            ResourceDescriptor::StatefulWorkload(o) => &o.spec.as_ref()?.template,
            ResourceDescriptor::StatelessWorkload(o) => &o.spec.as_ref()?.template,
            ResourceDescriptor::NetworkService(_) => return None,
        };
        template.metadata.as_ref()?.labels.clone()
    }

    /// Desired replica count. Services have no replica concept.
    pub fn replicas(&self) -> Option<i32> {
        match self {
            ResourceDescriptor::StatefulWorkload(o) => o.spec.as_ref()?.replicas,
            ResourceDescriptor::StatelessWorkload(o) => o.spec.as_ref()?.replicas,
            ResourceDescriptor::NetworkService(_) => None,
        }
    }

    pub fn owner_references(&self) -> &[OwnerReference] {
        self.metadata().owner_references.as_deref().unwrap_or_default()
    }
}

impl std::fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind(), self.namespace(), self.name())
    }
}
