//! Idempotent creation of child objects.

use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::controller::store::{ObjectStore, StoreError};
use crate::resources::ResourceDescriptor;

/// What happened to one descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// The object did not exist and now does.
    Created,
    /// The object was already present and was left as is.
    AlreadyExisted,
}

/// Create the object described by `descriptor` if it is absent.
///
/// An already-existing object counts as success and is never diffed or
/// updated. Any other store failure is returned as [`Error::Materialize`].
pub async fn materialize<S: ObjectStore>(
    store: &S,
    descriptor: &ResourceDescriptor,
) -> Result<MaterializeOutcome> {
    match store.create(descriptor).await {
        Ok(()) => {
            info!(object = %descriptor, "Created child object");
            Ok(MaterializeOutcome::Created)
        }
        Err(StoreError::AlreadyExists { .. }) => {
            debug!(object = %descriptor, "Child object already exists");
            Ok(MaterializeOutcome::AlreadyExisted)
        }
        Err(source) => Err(Error::Materialize {
            kind: descriptor.kind(),
            name: descriptor.name().to_string(),
            source,
        }),
    }
}
