//! Vault service: read/write orchestration with optimistic concurrency
//!
//! The service holds no document state between requests: every call goes to
//! the injected [`VaultStore`], and a write only lands if the version the
//! client last saw is still the stored version at commit time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::{AuditOperation, AuditOutcome, AuditRecord, AuditSink};
use crate::document::{KeyEnvelope, VaultBlob, VaultDocument, VaultMeta};
use crate::error::{Result, VaultError};
use crate::storage::{CasOutcome, VaultStore};

/// Body of a vault replace request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Version the client believes is stored (0 for a first write)
    #[serde(default)]
    pub expected_version: i64,

    /// Version to install; must be positive
    #[serde(default)]
    pub new_version: i64,

    #[serde(default)]
    pub device_id: String,

    #[serde(default)]
    pub vault_blob: VaultBlob,

    #[serde(default)]
    pub key_envelope: KeyEnvelope,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<WriteMeta>,
}

/// Client-asserted metadata carried by a write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteMeta {
    #[serde(default)]
    pub blob_sha256_b64: String,
}

/// Result of a well-formed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The new revision is committed
    Accepted {
        vault_version: i64,
        updated_at: DateTime<Utc>,
    },
    /// `expected_version` was stale; re-read, merge and retry
    Conflict { server_version: i64 },
}

/// Per-request facts the service needs only for auditing
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_address: String,
}

impl RequestContext {
    pub fn new(client_address: impl Into<String>) -> Self {
        Self {
            client_address: client_address.into(),
        }
    }
}

/// Orchestrates vault reads and writes against a [`VaultStore`]
pub struct VaultService {
    store: Arc<dyn VaultStore>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for VaultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService").finish_non_exhaustive()
    }
}

impl VaultService {
    pub fn new(store: Arc<dyn VaultStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn VaultStore> {
        &self.store
    }

    /// Fetch the current document for `user_id`
    pub fn read_vault(&self, ctx: &RequestContext, user_id: &str) -> Result<Option<VaultDocument>> {
        let result = self.store.get(user_id);

        let (outcome, version) = match &result {
            Ok(Some(doc)) => (AuditOutcome::Ok, Some(doc.vault_version)),
            Ok(None) => (AuditOutcome::NotFound, None),
            Err(e) => {
                tracing::error!("Read of vault '{}' failed: {}", user_id, e);
                (AuditOutcome::StorageError, None)
            }
        };
        tracing::debug!("Read vault '{}': {:?}", user_id, outcome);
        self.emit(ctx, user_id, AuditOperation::Read, outcome, version);

        result
    }

    /// Replace the document for `user_id` if `expected_version` is current
    pub fn write_vault(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        request: WriteRequest,
    ) -> Result<WriteOutcome> {
        let result = self.try_write(user_id, request);

        let (outcome, version) = match &result {
            Ok(WriteOutcome::Accepted { vault_version, .. }) => {
                (AuditOutcome::Ok, Some(*vault_version))
            }
            Ok(WriteOutcome::Conflict { server_version }) => {
                (AuditOutcome::VersionConflict, Some(*server_version))
            }
            Err(VaultError::InvalidVersion(_)) => (AuditOutcome::InvalidVersion, None),
            Err(e) => {
                tracing::error!("Write of vault '{}' failed: {}", user_id, e);
                (AuditOutcome::StorageError, None)
            }
        };
        self.emit(ctx, user_id, AuditOperation::Write, outcome, version);

        result
    }

    fn try_write(&self, user_id: &str, request: WriteRequest) -> Result<WriteOutcome> {
        if request.new_version <= 0 {
            return Err(VaultError::InvalidVersion(request.new_version));
        }
        if request.new_version <= request.expected_version {
            // Accepted as-is: only equality with the stored version is checked.
            tracing::warn!(
                "Vault '{}' write does not advance the version ({} -> {})",
                user_id,
                request.expected_version,
                request.new_version
            );
        }

        let existing = self.store.get(user_id)?;
        let now = Utc::now();
        let (created_at, updated_at) = match &existing {
            Some(doc) => (doc.meta.created_at, now.max(doc.meta.updated_at)),
            None => (now, now),
        };

        let candidate = VaultDocument {
            vault_version: request.new_version,
            device_clock: now,
            vault_blob: request.vault_blob,
            key_envelope: request.key_envelope,
            meta: VaultMeta {
                created_at,
                updated_at,
                last_writer_device_id: request.device_id,
                blob_sha256_b64: request.meta.map(|m| m.blob_sha256_b64).unwrap_or_default(),
            },
        };

        match self
            .store
            .compare_and_swap(user_id, request.expected_version, &candidate)?
        {
            CasOutcome::Applied => {
                tracing::info!(
                    "Vault '{}' updated to version {}",
                    user_id,
                    candidate.vault_version
                );
                Ok(WriteOutcome::Accepted {
                    vault_version: candidate.vault_version,
                    updated_at,
                })
            }
            CasOutcome::Conflict { current_version } => {
                tracing::warn!(
                    "Vault '{}' version conflict: expected {}, server has {}",
                    user_id,
                    request.expected_version,
                    current_version
                );
                Ok(WriteOutcome::Conflict {
                    server_version: current_version,
                })
            }
        }
    }

    fn emit(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        operation: AuditOperation,
        outcome: AuditOutcome,
        version: Option<i64>,
    ) {
        self.audit.record(AuditRecord::new(
            user_id,
            operation,
            outcome,
            ctx.client_address.clone(),
            version,
        ));
    }
}
