//! Status composition.
//!
//! Folds an [`ObservedState`] into the summary stored on the parent.

use crate::controller::error::{Error, Result};
use crate::controller::observe::ObservedState;
use crate::crd::{LocalStatus, OutputStatus, PrometheusReplicaStatus, ReplicaPhase};
use crate::resources::TopologyRole;
use crate::resources::common::service_dns_name;

/// Build the status summary for an instance living in `namespace`.
///
/// Pure: the same observation always yields the same summary. Fails with
/// [`Error::EmptyObservation`] when no query Service was found, since the
/// aggregation endpoint cannot be named without one.
pub fn compose(observed: &ObservedState, namespace: &str) -> Result<PrometheusReplicaStatus> {
    let query_service = observed
        .services_of(TopologyRole::ThanosQuery)
        .first()
        .ok_or(Error::EmptyObservation {
            role: TopologyRole::ThanosQuery,
            kind: "Service",
        })?;

    let grafana = observed
        .services_of(TopologyRole::Grafana)
        .first()
        .map(|svc| service_dns_name(svc, namespace))
        .unwrap_or_default();

    Ok(PrometheusReplicaStatus {
        phase: ReplicaPhase::Creating,
        local: LocalStatus {
            prometheuses: observed.pods_of(TopologyRole::PrometheusPods).to_vec(),
            stores: observed.pods_of(TopologyRole::ThanosStore).to_vec(),
            queries: observed.pods_of(TopologyRole::ThanosQuery).to_vec(),
        },
        output: OutputStatus {
            grafana,
            query: service_dns_name(query_service, namespace),
        },
    })
}

/// Whether `composed` must be written over `stored`.
///
/// Compares whole summaries by value.
pub fn needs_persist(
    stored: Option<&PrometheusReplicaStatus>,
    composed: &PrometheusReplicaStatus,
) -> bool {
    stored != Some(composed)
}
