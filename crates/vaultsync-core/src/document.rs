//! Vault document data model
//!
//! One [`VaultDocument`] exists per user key. Blob and envelope fields are
//! opaque base64 text owned by the client; nothing here decodes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Algorithm label presented when a blob carries none
pub const DEFAULT_ALG: &str = "AES-256-GCM";

/// KEK scheme label presented when an envelope carries none
pub const DEFAULT_KEK_SCHEME: &str = "passkey+recovery_code_v1";

/// KDF info label presented when an envelope carries none
pub const DEFAULT_KDF_INFO: &str = "vault-dek-wrap";

/// Encrypted vault payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultBlob {
    #[serde(default)]
    pub ciphertext_b64: String,

    #[serde(default)]
    pub nonce_b64: String,

    #[serde(default)]
    pub aad_b64: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
}

impl VaultBlob {
    /// Algorithm label with the default applied
    pub fn alg_or_default(&self) -> &str {
        non_blank(self.alg.as_deref()).unwrap_or(DEFAULT_ALG)
    }
}

/// Wrapped data-encryption key and its derivation parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kek_scheme: Option<String>,

    #[serde(default)]
    pub wrapped_dek_b64: String,

    #[serde(default)]
    pub wrap_nonce_b64: String,

    #[serde(default)]
    pub kdf_salt_b64: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_info: Option<String>,
}

impl KeyEnvelope {
    /// KEK scheme with the default applied
    pub fn kek_scheme_or_default(&self) -> &str {
        non_blank(self.kek_scheme.as_deref()).unwrap_or(DEFAULT_KEK_SCHEME)
    }

    /// KDF info with the default applied
    pub fn kdf_info_or_default(&self) -> &str {
        non_blank(self.kdf_info.as_deref()).unwrap_or(DEFAULT_KDF_INFO)
    }
}

/// Server-maintained metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMeta {
    /// Time of the first write for this key; never changes afterwards
    pub created_at: DateTime<Utc>,

    /// Time of the latest write
    pub updated_at: DateTime<Utc>,

    /// Device id supplied by the writer (untrusted)
    #[serde(default)]
    pub last_writer_device_id: String,

    /// Client-asserted digest of the blob (not verified)
    #[serde(default)]
    pub blob_sha256_b64: String,
}

/// The single stored document for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDocument {
    pub vault_version: i64,
    pub device_clock: DateTime<Utc>,

    #[serde(default)]
    pub vault_blob: VaultBlob,

    #[serde(default)]
    pub key_envelope: KeyEnvelope,

    pub meta: VaultMeta,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
