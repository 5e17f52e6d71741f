//! Per-instance reconcile tokens.
//!
//! At most one reconcile pass runs for a given PrometheusReplica at a time,
//! so only one writer ever touches its status. Different instances do not
//! block each other.
//!
//! An entry lives only while someone holds or waits for it: the last guard
//! to drop removes it, so the registry does not grow with instance churn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type Token = Arc<AsyncMutex<()>>;

/// Registry of one async mutex per `namespace/name`.
#[derive(Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<String, Token>>,
}

/// Token held for the duration of one pass. Released on drop.
pub struct InstanceGuard<'a> {
    registry: &'a InstanceLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{}/{}", namespace, name)
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Token>> {
        // Poisoning leaves the map consistent
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for and take the token of one instance.
    pub async fn acquire(&self, namespace: &str, name: &str) -> InstanceGuard<'_> {
        let key = Self::key(namespace, name);
        // Cloned under the map lock so a concurrent release sees the waiter
        let lock = self.map().entry(key.clone()).or_default().clone();
        if lock.try_lock().is_err() {
            debug!(instance = %key, "Waiting for in-flight pass");
        }
        let guard = lock.lock_owned().await;
        InstanceGuard {
            registry: self,
            key,
            guard: Some(guard),
        }
    }

    /// Remove the entry for `key` if nobody holds or waits for it.
    fn release(&self, key: &str) {
        let mut locks = self.map();
        let idle = locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(key);
        }
    }

    /// Number of instances with a held or awaited token.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        // Unlock first so our handle no longer counts
        drop(self.guard.take());
        self.registry.release(&self.key);
    }
}
