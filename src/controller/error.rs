//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

use crate::controller::store::StoreError;
use crate::resources::TopologyRole;

/// Error type for controller operations
///
/// Every variant is fatal to the current reconcile pass. Nothing is retried
/// inside the pass; the controller requeues according to [`Error::requeue_after`].
#[derive(Error, Debug)]
pub enum Error {
    /// Creating a child object failed for a reason other than already-exists
    #[error("Failed to create {kind} {name}: {source}")]
    Materialize {
        kind: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },

    /// A label query for one topology role failed
    #[error("Failed to list {kind}s for role {role}: {source}")]
    Observe {
        role: TopologyRole,
        kind: &'static str,
        #[source]
        source: StoreError,
    },

    /// Writing the status summary back to the parent failed
    #[error("Failed to persist status of {name}: {source}")]
    Persist {
        name: String,
        #[source]
        source: StoreError,
    },

    /// A role that must have at least one live object had none
    #[error("No {kind} observed for role {role}")]
    EmptyObservation {
        role: TopologyRole,
        kind: &'static str,
    },

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Persist { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Materialize { source, .. }
            | Error::Observe { source, .. }
            | Error::Persist { source, .. } => source.is_retryable(),
            // Query pods and services appear shortly after the first pass
            Error::EmptyObservation { .. } => true,
            Error::MissingField(_) => false,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        match self {
            Error::EmptyObservation { .. } => Duration::from_secs(5),
            _ if self.is_retryable() => Duration::from_secs(30),
            _ => Duration::from_secs(300),
        }
    }
}

pub(crate) fn is_kube_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(api_err) if api_err.code == 404)
}

/// Network errors, rate limiting, server errors and optimistic-concurrency
/// conflicts are worth another pass.
pub(crate) fn is_kube_retryable(e: &kube::Error) -> bool {
    matches!(
        e,
        kube::Error::Api(api_err)
            if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
    ) || matches!(e, kube::Error::Service(_))
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
