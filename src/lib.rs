//! prometheus-replica-operator library crate
//!
//! This module exports the controller, CRD definitions, and resource generators.

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod leader;
pub mod resources;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, PredicateConfig, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::{context::Context, reconciler::reconcile};
use crd::PrometheusReplica;

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Create a filtered stream for a resource type.
///
/// The stream is reflector-backed, retries with backoff and drops
/// status-only updates via the generation predicate, so the operator's own
/// status writes do not trigger another pass.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation, PredicateConfig::default());
    (reader, stream)
}

/// Run the operator controller.
///
/// Watches PrometheusReplica resources in `config.watch_namespace` (or
/// cluster wide when unset) and reconciles them. Child StatefulSets,
/// Deployments and Services trigger a pass on their owner when they change.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    info!(
        scope = namespace.unwrap_or("cluster-wide"),
        resync_secs = config.resync_period.as_secs(),
        "Starting controller for PrometheusReplica resources"
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), config, health_state.clone()));

    let replicas: Api<PrometheusReplica> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);

    let watcher_config = default_watcher_config();
    let (reader, replica_stream) = create_filtered_stream(replicas, watcher_config.clone());

    // Owned objects are never read, only their changes matter
    Controller::for_stream(replica_stream, reader)
        .owns_stream(metadata_watcher(statefulsets, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(deployments, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(services, watcher_config).touched_objects())
        .run(reconcile, controller::reconciler::error_policy, ctx)
        .for_each(|result| {
            let health_state = health_state.clone();
            async move {
                match result {
                    Ok((obj, _action)) => debug!("Reconciled: {}", obj.name),
                    Err(e) => log_controller_error(&e, health_state.as_deref()),
                }
            }
        })
        .await;

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
}

fn log_controller_error(
    e: &kube::runtime::controller::Error<controller::Error, kube::runtime::watcher::Error>,
    health_state: Option<&HealthState>,
) {
    // Owned-object events can still arrive for a parent that is already gone
    let is_not_found = match e {
        kube::runtime::controller::Error::ObjectNotFound(obj_ref) => {
            // The parent vanished without a pass seeing its deletion
            if let (Some(state), Some(ns)) = (health_state, obj_ref.namespace.as_deref()) {
                state.metrics.forget_instance(ns, &obj_ref.name);
            }
            true
        }
        kube::runtime::controller::Error::ReconcilerFailed(err, _) => err.is_not_found(),
        _ => false,
    };
    if is_not_found {
        debug!("Object no longer exists (likely deleted): {:?}", e);
    } else {
        error!("Reconciliation error: {:?}", e);
    }
}
