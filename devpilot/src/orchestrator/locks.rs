//! Per-project-name deploy locks and in-flight port reservations

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::errors::PilotError;
use crate::projects::store::{port_after, ProjectStore};

/// Serializes deploys that target the same project name
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other deploy of `name` is running
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(name.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

type Reserved = Arc<Mutex<BTreeSet<u16>>>;

/// Ports handed to deploys whose project record is not written yet.
///
/// A new port is above every stored port and every reserved one. Allocation
/// and release are serialized, so a deploy that reads the store while another
/// one releases its lease either sees the reservation or the stored record.
#[derive(Debug, Default)]
pub struct PortReservations {
    allocating: AsyncMutex<()>,
    reserved: Reserved,
}

impl PortReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next free port
    pub async fn reserve(&self, store: &dyn ProjectStore) -> Result<PortLease, PilotError> {
        let _allocating = self.allocating.lock().await;
        let stored = store.max_port().await?;

        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        let port = port_after(stored.max(reserved.last().copied()))?;
        reserved.insert(port);
        debug!("Reserved port {}", port);

        Ok(PortLease {
            port,
            reserved: self.reserved.clone(),
        })
    }

    /// Give a port back once its record was written or the deploy gave up
    pub async fn release(&self, lease: PortLease) {
        let _allocating = self.allocating.lock().await;
        drop(lease);
    }

    #[cfg(test)]
    fn reserved(&self) -> Vec<u16> {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

/// A reserved port; returned to the pool on drop
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    reserved: Reserved,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.port);
    }
}
