//! In-memory vault store with one lock per user key
//!
//! The outer map lock is only held long enough to find or create a key's
//! slot; the compare-and-swap itself runs under that slot's mutex, so writers
//! to different keys never wait on each other.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use super::{CasOutcome, VaultStore};
use crate::document::VaultDocument;
use crate::error::Result;

type Slot = Arc<Mutex<Option<VaultDocument>>>;

/// Non-durable [`VaultStore`] for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(user_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Remove `user_id`'s slot if it holds no document and nobody else has it
    fn release_vacant(&self, user_id: &str) {
        let mut slots = self.slots.write();
        let vacant = slots
            .get(user_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1 && slot.lock().is_none());
        if vacant {
            slots.remove(user_id);
        }
    }
}

impl VaultStore for MemoryVaultStore {
    fn get(&self, user_id: &str) -> Result<Option<VaultDocument>> {
        let slot = self.slots.read().get(user_id).cloned();
        Ok(slot.and_then(|slot| slot.lock().clone()))
    }

    fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: i64,
        next: &VaultDocument,
    ) -> Result<CasOutcome> {
        // An absent key can only be written with expected version 0.
        let slot = if expected_version == 0 {
            self.slot(user_id)
        } else {
            match self.slots.read().get(user_id).cloned() {
                Some(slot) => slot,
                None => return Ok(CasOutcome::Conflict { current_version: 0 }),
            }
        };

        let mut current = slot.lock();
        let current_version = current.as_ref().map_or(0, |doc| doc.vault_version);
        if current_version != expected_version {
            let vacant = current.is_none();
            drop(current);
            drop(slot);
            if vacant {
                self.release_vacant(user_id);
            }
            return Ok(CasOutcome::Conflict { current_version });
        }

        *current = Some(next.clone());
        Ok(CasOutcome::Applied)
    }

    fn seed_if_empty(&self, documents: &[(String, VaultDocument)]) -> Result<usize> {
        // Holding the write lock keeps new slots from appearing mid-check.
        let mut slots = self.slots.write();
        if slots.values().any(|slot| slot.lock().is_some()) {
            return Ok(0);
        }

        for (user_id, document) in documents {
            let slot = slots.entry(user_id.clone()).or_default();
            *slot.lock() = Some(document.clone());
        }
        Ok(documents.len())
    }

    fn count(&self) -> Result<u64> {
        let slots = self.slots.read();
        Ok(slots.values().filter(|slot| slot.lock().is_some()).count() as u64)
    }
}
