//! Leader election on a `coordination.k8s.io` Lease.
//!
//! Only the holder of the lease runs the controller. The holder renews it
//! periodically; a lease whose renew time is older than its duration can be
//! taken over by another replica. Writes replace the lease at the resource
//! version that was read, so two replicas racing for an expired lease cannot
//! both win.

use std::time::Duration;

use jiff::Timestamp;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::{debug, info};

use crate::controller::store::FIELD_MANAGER;

/// Identity and timing of one election participant.
#[derive(Clone, Debug)]
pub struct LeaseParams {
    pub holder_id: String,
    pub lease_name: String,
    pub lease_ttl: Duration,
}

/// Who holds a lease at a point in time, from our point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseState {
    /// We hold it and it has not expired.
    Held,
    /// Someone else holds it and it has not expired.
    HeldByOther,
    /// Nobody holds it, or the holder stopped renewing.
    Free,
}

fn is_expired(spec: &LeaseSpec, now: Timestamp) -> bool {
    match (&spec.renew_time, spec.lease_duration_seconds) {
        (Some(renew_time), Some(duration)) => {
            now.as_second() - renew_time.0.as_second() > i64::from(duration)
        }
        _ => true,
    }
}

/// Classify `lease` for `holder_id` at `now`.
pub fn lease_state(lease: &Lease, holder_id: &str, now: Timestamp) -> LeaseState {
    let Some(spec) = lease.spec.as_ref() else {
        return LeaseState::Free;
    };
    if is_expired(spec, now) {
        return LeaseState::Free;
    }
    match spec.holder_identity.as_deref() {
        Some(holder) if holder == holder_id => LeaseState::Held,
        Some(_) => LeaseState::HeldByOther,
        None => LeaseState::Free,
    }
}

fn ttl_seconds(ttl: Duration) -> i32 {
    i32::try_from(ttl.as_secs()).unwrap_or(i32::MAX)
}

/// The lease as written by `params.holder_id` at `now`.
///
/// Metadata, including the resource version, is carried over from `current`.
/// Taking over from another holder resets the acquire time and counts a
/// transition.
pub fn claimed(current: Option<Lease>, params: &LeaseParams, now: Timestamp) -> Lease {
    let mut lease = current.unwrap_or_else(|| Lease {
        metadata: ObjectMeta {
            name: Some(params.lease_name.clone()),
            ..Default::default()
        },
        spec: None,
    });
    let mut spec = lease.spec.take().unwrap_or_default();

    let now = MicroTime(now);
    if spec.holder_identity.as_deref() != Some(params.holder_id.as_str()) {
        let transitions = spec.lease_transitions.unwrap_or(0);
        spec.lease_transitions = Some(if spec.holder_identity.is_some() {
            transitions.saturating_add(1)
        } else {
            transitions
        });
        spec.holder_identity = Some(params.holder_id.clone());
        spec.acquire_time = Some(now.clone());
    }
    spec.renew_time = Some(now);
    spec.lease_duration_seconds = Some(ttl_seconds(params.lease_ttl));

    lease.spec = Some(spec);
    lease
}

fn is_conflict(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 409)
}

/// A participant in the election for one lease.
pub struct LeaderLease {
    api: Api<Lease>,
    params: LeaseParams,
}

impl LeaderLease {
    pub fn new(client: Client, namespace: &str, params: LeaseParams) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            params,
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    /// Take the lease if it is free, or renew it if we hold it.
    ///
    /// Returns whether we hold the lease afterwards. Losing a write race is
    /// reported as not holding it, not as an error.
    pub async fn try_acquire_or_renew(&self) -> Result<bool, kube::Error> {
        let now = Timestamp::now();
        let name = &self.params.lease_name;

        let result = match self.api.get_opt(name).await? {
            None => {
                let lease = claimed(None, &self.params, now);
                self.api.create(&Self::post_params(), &lease).await
            }
            Some(current) => match lease_state(&current, &self.params.holder_id, now) {
                LeaseState::HeldByOther => {
                    debug!(lease = %name, "Lease held by another replica");
                    return Ok(false);
                }
                state => {
                    if state == LeaseState::Free {
                        info!(lease = %name, holder = %self.params.holder_id, "Taking over lease");
                    }
                    let lease = claimed(Some(current), &self.params, now);
                    self.api.replace(name, &Self::post_params(), &lease).await
                }
            },
        };

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_conflict(&e) => {
                debug!(lease = %name, "Lost lease write race");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
