//! One-time import of the legacy JSON snapshot
//!
//! Earlier deployments kept every vault in a single JSON file rewritten on
//! each write. On startup, if the transactional store is still empty, that
//! file is read once and its documents are seeded. A store that already holds
//! any row is never touched again, whatever happens to the file later.
//!
//! A snapshot that cannot be read or parsed is logged and ignored: the service
//! starts with an empty store rather than refusing to come up.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::document::{KeyEnvelope, VaultBlob, VaultDocument, VaultMeta};
use crate::error::Result;
use crate::storage::VaultStore;

/// What the importer did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportReport {
    /// The store already had documents; the snapshot was not read
    StoreNotEmpty,
    /// No snapshot file at the given path
    NoSnapshot,
    /// The snapshot exists but could not be read or parsed
    Unreadable { reason: String },
    /// Snapshot entries were seeded
    Imported { imported: usize, skipped: usize },
}

#[derive(Debug, Deserialize)]
struct LegacySnapshot {
    #[serde(rename = "Vaults", default)]
    vaults: Option<BTreeMap<String, Option<LegacyDocument>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyDocument {
    #[serde(default)]
    vault_version: i64,
    device_clock: DateTime<Utc>,
    #[serde(default)]
    vault_blob: Option<LegacyBlob>,
    #[serde(default)]
    key_envelope: Option<LegacyEnvelope>,
    meta: LegacyMeta,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyBlob {
    ciphertext_b64: Option<String>,
    nonce_b64: Option<String>,
    aad_b64: Option<String>,
    alg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyEnvelope {
    kek_scheme: Option<String>,
    wrapped_dek_b64: Option<String>,
    wrap_nonce_b64: Option<String>,
    kdf_salt_b64: Option<String>,
    kdf_info: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyMeta {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    last_writer_device_id: Option<String>,
    #[serde(default)]
    blob_sha256_base64: Option<String>,
}

impl From<LegacyDocument> for VaultDocument {
    fn from(legacy: LegacyDocument) -> Self {
        let blob = legacy.vault_blob.unwrap_or_default();
        let envelope = legacy.key_envelope.unwrap_or_default();

        VaultDocument {
            vault_version: legacy.vault_version,
            device_clock: legacy.device_clock,
            vault_blob: VaultBlob {
                ciphertext_b64: blob.ciphertext_b64.unwrap_or_default(),
                nonce_b64: blob.nonce_b64.unwrap_or_default(),
                aad_b64: blob.aad_b64.unwrap_or_default(),
                alg: blob.alg,
            },
            key_envelope: KeyEnvelope {
                kek_scheme: envelope.kek_scheme,
                wrapped_dek_b64: envelope.wrapped_dek_b64.unwrap_or_default(),
                wrap_nonce_b64: envelope.wrap_nonce_b64.unwrap_or_default(),
                kdf_salt_b64: envelope.kdf_salt_b64.unwrap_or_default(),
                kdf_info: envelope.kdf_info,
            },
            meta: VaultMeta {
                created_at: legacy.meta.created_at,
                updated_at: legacy.meta.updated_at,
                last_writer_device_id: legacy.meta.last_writer_device_id.unwrap_or_default(),
                blob_sha256_b64: legacy.meta.blob_sha256_base64.unwrap_or_default(),
            },
        }
    }
}

/// Seed `store` from the legacy snapshot at `path` if the store is empty.
///
/// Only storage faults are returned as errors; a missing or corrupt snapshot
/// is reported through [`ImportReport`].
pub fn import_legacy_snapshot(store: &dyn VaultStore, path: &Path) -> Result<ImportReport> {
    if !store.is_empty()? {
        tracing::debug!("Vault store already populated, skipping legacy import");
        return Ok(ImportReport::StoreNotEmpty);
    }

    if !path.exists() {
        return Ok(ImportReport::NoSnapshot);
    }

    let snapshot = match read_snapshot(path) {
        Ok(snapshot) => snapshot,
        Err(reason) => {
            tracing::warn!(
                "Ignoring unreadable legacy snapshot {}: {}",
                path.display(),
                reason
            );
            return Ok(ImportReport::Unreadable { reason });
        }
    };

    let mut seeds = Vec::new();
    let mut skipped = 0;
    for (user_id, document) in snapshot.vaults.unwrap_or_default() {
        match document {
            Some(document) if !user_id.trim().is_empty() => {
                seeds.push((user_id, VaultDocument::from(document)));
            }
            _ => skipped += 1,
        }
    }

    if seeds.is_empty() {
        return Ok(ImportReport::Imported {
            imported: 0,
            skipped,
        });
    }

    let imported = store.seed_if_empty(&seeds)?;
    if imported == 0 {
        // a writer got in between the emptiness check and the seed
        return Ok(ImportReport::StoreNotEmpty);
    }

    tracing::info!(
        "Imported {} vault(s) from legacy snapshot {} ({} skipped)",
        imported,
        path.display(),
        skipped
    );
    Ok(ImportReport::Imported { imported, skipped })
}

fn read_snapshot(path: &Path) -> std::result::Result<LegacySnapshot, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}
