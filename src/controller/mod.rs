//! Controller module for prometheus-replica-operator.
//!
//! Contains the reconcile engine and the stages it sequences, the object
//! store seam, error handling and the per-instance locks.

pub mod context;
pub mod error;
pub mod instance_lock;
pub mod materialize;
pub mod observe;
pub mod reconciler;
pub mod status;
pub mod store;

pub use error::{Error, Result};
pub use reconciler::{Engine, PassOutcome, PassStage, ReplicaEvent};
pub use store::{KubeStore, ObjectKind, ObjectStore, StoreError};
