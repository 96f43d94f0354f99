//! Per-identity nonce sequencing.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::Address;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct NonceState {
    /// Highest nonce this process broadcast successfully.
    high_water: Option<u64>,
}

impl NonceState {
    /// Nonce for the next attempt given the node's pending transaction count.
    ///
    /// Never reuses a nonce this process already got accepted, even if the
    /// node has not caught up with it yet.
    pub fn next_nonce(&self, pending_count: u64) -> u64 {
        match self.high_water {
            Some(hw) => pending_count.max(hw + 1),
            None => pending_count,
        }
    }

    pub fn mark_broadcast(&mut self, nonce: u64) {
        self.high_water = Some(self.high_water.map_or(nonce, |hw| hw.max(nonce)));
    }

    pub fn high_water(&self) -> Option<u64> {
        self.high_water
    }
}

/// Exclusive access to one identity's nonce state. Held for the whole
/// logical submission including its retries.
pub type NonceGuard = OwnedMutexGuard<NonceState>;

/// Serializes submissions per sending identity.
#[derive(Debug, Default)]
pub struct NonceSequencer {
    identities: Mutex<HashMap<Address, Arc<AsyncMutex<NonceState>>>>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive use of `address`.
    pub async fn lock(&self, address: Address) -> NonceGuard {
        let state = self.identities.lock().entry(address).or_default().clone();
        state.lock_owned().await
    }
}
