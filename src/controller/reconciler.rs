//! Reconciliation loop for PrometheusReplica.
//!
//! [`Engine`] runs one pass per event:
//! generate topology, link owners, materialize, observe, compose status and
//! persist it when it changed. [`reconcile`] adapts the engine to the
//! kube-runtime controller.

use std::sync::Arc;
use std::time::Instant;

use kube::{ResourceExt, runtime::controller::Action};
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::instance_lock::InstanceLocks;
use crate::controller::materialize::{MaterializeOutcome, materialize};
use crate::controller::observe::{POD_ROLES, observe_instance};
use crate::controller::status::{compose, needs_persist};
use crate::controller::store::ObjectStore;
use crate::crd::{PrometheusReplica, PrometheusReplicaStatus};
use crate::health::HealthState;
use crate::resources::{generate, link};

/// An event for one PrometheusReplica.
#[derive(Clone, Debug)]
pub enum ReplicaEvent {
    /// The resource was created or changed.
    Upsert(Arc<PrometheusReplica>),
    /// The resource is being deleted.
    Delete(Arc<PrometheusReplica>),
}

/// Stages of a reconcile pass, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassStage {
    Start,
    GenerateTopology,
    Materialize,
    Observe,
    ComposeStatus,
    Persist,
    Done,
}

/// What a completed pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Stages entered, `Start` through `Done`.
    pub stages: Vec<PassStage>,
    /// Child objects created by this pass.
    pub created: usize,
    /// Child objects that were already present.
    pub already_existed: usize,
    /// The composed summary. `None` for deletions.
    pub status: Option<PrometheusReplicaStatus>,
    /// Whether the summary was written back.
    pub persisted: bool,
}

impl PassOutcome {
    fn deleted() -> Self {
        Self {
            stages: vec![PassStage::Start, PassStage::Done],
            ..Default::default()
        }
    }

    fn enter(&mut self, stage: PassStage) {
        self.stages.push(stage);
    }
}

/// Reconcile engine over an [`ObjectStore`].
///
/// Holds no state between passes. Per-instance tokens exist only while a
/// pass for that instance runs or waits.
pub struct Engine<S: ObjectStore> {
    store: S,
    config: OperatorConfig,
    locks: InstanceLocks,
    health_state: Option<Arc<HealthState>>,
}

impl<S: ObjectStore> Engine<S> {
    pub fn new(store: S, config: OperatorConfig) -> Self {
        Self {
            store,
            config,
            locks: InstanceLocks::new(),
            health_state: None,
        }
    }

    /// Record metrics for every pass into `state`.
    pub fn with_health_state(mut self, state: Option<Arc<HealthState>>) -> Self {
        self.health_state = state;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Handle one event. Passes for the same instance never overlap.
    pub async fn handle(&self, event: ReplicaEvent) -> Result<PassOutcome> {
        match event {
            ReplicaEvent::Delete(replica) => {
                let name = replica.name_any();
                let namespace = replica.namespace().unwrap_or_default();
                // Wait out an in-flight pass; the token is pruned on release
                let _guard = self.locks.acquire(&namespace, &name).await;
                info!(
                    name = %name,
                    namespace = %namespace,
                    "Deletion observed, children are collected through owner references"
                );
                if let Some(ref health_state) = self.health_state {
                    health_state.metrics.forget_instance(&namespace, &name);
                }
                Ok(PassOutcome::deleted())
            }
            ReplicaEvent::Upsert(replica) => {
                let namespace = replica
                    .namespace()
                    .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
                let _guard = self.locks.acquire(&namespace, &replica.name_any()).await;
                self.pass(&replica, &namespace).await
            }
        }
    }

    async fn pass(&self, replica: &PrometheusReplica, namespace: &str) -> Result<PassOutcome> {
        let name = replica.name_any();
        let mut outcome = PassOutcome::default();
        outcome.enter(PassStage::Start);

        outcome.enter(PassStage::GenerateTopology);
        let descriptors: Vec<_> = generate(replica)
            .into_iter()
            .map(|descriptor| link(descriptor, replica))
            .collect();

        outcome.enter(PassStage::Materialize);
        for descriptor in &descriptors {
            match materialize(&self.store, descriptor).await? {
                MaterializeOutcome::Created => {
                    outcome.created += 1;
                    if let Some(ref health_state) = self.health_state {
                        health_state.metrics.record_object_created(descriptor.kind());
                    }
                }
                MaterializeOutcome::AlreadyExisted => outcome.already_existed += 1,
            }
        }

        outcome.enter(PassStage::Observe);
        let observed = observe_instance(&self.store, &name, namespace).await?;
        if let Some(ref health_state) = self.health_state {
            for role in POD_ROLES {
                let count = i64::try_from(observed.pods_of(role).len()).unwrap_or(i64::MAX);
                health_state
                    .metrics
                    .set_observed_pods(namespace, &name, &role.to_string(), count);
            }
        }

        outcome.enter(PassStage::ComposeStatus);
        let status = compose(&observed, namespace)?;

        if needs_persist(replica.status.as_ref(), &status) {
            outcome.enter(PassStage::Persist);
            self.store
                .update_status(replica, &status)
                .await
                .map_err(|source| Error::Persist {
                    name: name.clone(),
                    source,
                })?;
            outcome.persisted = true;
            info!(name = %name, phase = %status.phase, "Updated status");
            if let Some(ref health_state) = self.health_state {
                health_state.metrics.record_status_write(namespace, &name);
            }
        } else {
            debug!(name = %name, "Status unchanged, skipping write");
        }

        outcome.status = Some(status);
        outcome.enter(PassStage::Done);
        Ok(outcome)
    }
}

/// Reconcile a PrometheusReplica
///
/// This is the reconciliation function called by the controller. Successful
/// passes requeue after the resync period so partially created topologies
/// converge without further events.
pub async fn reconcile(obj: Arc<PrometheusReplica>, ctx: Arc<Context>) -> Result<Action> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling PrometheusReplica");

    let event = if obj.metadata.deletion_timestamp.is_some() {
        ReplicaEvent::Delete(obj.clone())
    } else {
        ReplicaEvent::Upsert(obj.clone())
    };
    let deleting = matches!(event, ReplicaEvent::Delete(_));

    let outcome = match ctx.engine.handle(event).await {
        Ok(outcome) => outcome,
        Err(e) => {
            ctx.publish_warning_event(
                &obj,
                "ReconcileFailed",
                "Reconciling",
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    if deleting {
        return Ok(Action::await_change());
    }

    if outcome.created > 0 {
        ctx.publish_normal_event(
            &obj,
            "Created",
            "CreateResources",
            Some(format!("Created {} child objects", outcome.created)),
        )
        .await;
    }

    if let Some(ref health_state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
    }

    debug!(
        name = %name,
        created = outcome.created,
        already_existed = outcome.already_existed,
        persisted = outcome.persisted,
        "Reconcile pass complete"
    );

    Ok(Action::requeue(ctx.engine.config().resync_period))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<PrometheusReplica>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    // Record error metric
    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}
