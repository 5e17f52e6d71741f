//! The desired child topology of a PrometheusReplica.

use kube::ResourceExt;
use tracing::debug;

use crate::crd::PrometheusReplica;
use crate::resources::deployment::generate_query_deployment;
use crate::resources::descriptor::ResourceDescriptor;
use crate::resources::services::{
    generate_peers_service, generate_query_service, generate_store_service,
};
use crate::resources::statefulset::{
    generate_collector_statefulset, generate_store_statefulset,
};

/// Generate every child object of `resource`, in creation order.
///
/// Pure and total: spec fields are passed through without validation. The
/// order only affects logging, since each descriptor is materialized
/// independently.
pub fn generate(resource: &PrometheusReplica) -> Vec<ResourceDescriptor> {
    let descriptors = vec![
        ResourceDescriptor::StatefulWorkload(generate_collector_statefulset(resource)),
        ResourceDescriptor::NetworkService(generate_peers_service(resource)),
        ResourceDescriptor::StatefulWorkload(generate_store_statefulset(resource)),
        ResourceDescriptor::NetworkService(generate_store_service(resource)),
        ResourceDescriptor::StatelessWorkload(generate_query_deployment(resource)),
        ResourceDescriptor::NetworkService(generate_query_service(resource)),
    ];

    debug!(
        name = %resource.name_any(),
        count = descriptors.len(),
        "Generated topology"
    );

    descriptors
}
