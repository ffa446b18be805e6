//! Transactional storage for vault documents
//!
//! Every backend implements [`VaultStore`]: a point lookup, a per-key atomic
//! compare-and-swap on `vault_version`, and a one-shot seeding operation used
//! by the legacy importer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    VaultService                     │
//! └──────────────────────────┬──────────────────────────┘
//!                            │ Arc<dyn VaultStore>
//!            ┌───────────────┴───────────────┐
//!   ┌────────▼─────────┐          ┌──────────▼─────────┐
//!   │ SqliteVaultStore │          │  MemoryVaultStore  │
//!   │ (WAL, one-       │          │  (one mutex per    │
//!   │  statement CAS)  │          │   user key)        │
//!   └──────────────────┘          └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vaultsync_core::storage::{SqliteVaultStore, VaultStore};
//!
//! # fn example() -> vaultsync_core::Result<()> {
//! let store = SqliteVaultStore::open("vault-store.db")?;
//! assert!(store.get("nobody")?.is_none());
//! # Ok(())
//! # }
//! ```

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryVaultStore;
pub use sqlite_store::SqliteVaultStore;

use crate::document::VaultDocument;
use crate::error::Result;

/// Result of a [`VaultStore::compare_and_swap`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The row now holds the new document
    Applied,
    /// The stored version did not match; nothing was written
    Conflict {
        /// Version currently stored (0 when the key has no row)
        current_version: i64,
    },
}

/// Durable keyed storage with row-level atomicity
pub trait VaultStore: Send + Sync {
    /// Latest committed document for `user_id`
    fn get(&self, user_id: &str) -> Result<Option<VaultDocument>>;

    /// Atomically replace the document for `user_id` if its current version
    /// equals `expected_version` (an absent row has version 0).
    fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: i64,
        next: &VaultDocument,
    ) -> Result<CasOutcome>;

    /// Insert all `documents` in one atomic unit, but only if the store holds
    /// no rows at all. Returns the number of rows written.
    fn seed_if_empty(&self, documents: &[(String, VaultDocument)]) -> Result<usize>;

    /// Number of stored documents
    fn count(&self) -> Result<u64>;

    /// True when no document is stored
    fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::document::{KeyEnvelope, VaultBlob, VaultDocument, VaultMeta};

    pub(crate) fn document(version: i64, ciphertext: &str) -> VaultDocument {
        let now = Utc::now();
        VaultDocument {
            vault_version: version,
            device_clock: now,
            vault_blob: VaultBlob {
                ciphertext_b64: ciphertext.to_string(),
                nonce_b64: "bm9uY2U=".to_string(),
                ..VaultBlob::default()
            },
            key_envelope: KeyEnvelope::default(),
            meta: VaultMeta {
                created_at: now,
                updated_at: now,
                last_writer_device_id: "device-a".to_string(),
                blob_sha256_b64: String::new(),
            },
        }
    }
}
