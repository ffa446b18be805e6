//! Document codec
//!
//! Converts a [`VaultDocument`] to and from the JSON text stored in the
//! `document_json` column, and builds the response view returned to clients.
//! Label defaults live only in [`VaultResponse`]; `encode` writes exactly what
//! the document holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::VaultDocument;
use crate::error::Result;

/// Serialize a document to its durable form
pub fn encode(document: &VaultDocument) -> Result<String> {
    Ok(serde_json::to_string(document)?)
}

/// Parse a document from its durable form
pub fn decode(text: &str) -> Result<VaultDocument> {
    Ok(serde_json::from_str(text)?)
}

/// Response body for a vault read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultResponse {
    pub user_id: String,
    pub vault_version: i64,
    pub device_clock: DateTime<Utc>,
    pub vault_blob: BlobView,
    pub key_envelope: EnvelopeView,
    pub meta: MetaView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobView {
    pub ciphertext_b64: String,
    pub nonce_b64: String,
    pub aad_b64: String,
    pub alg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeView {
    pub kek_scheme: String,
    pub wrapped_dek_b64: String,
    pub wrap_nonce_b64: String,
    pub kdf_salt_b64: String,
    pub kdf_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaView {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_writer_device_id: String,
    pub blob_sha256_b64: String,
}

impl VaultResponse {
    /// Build the response view, filling in label defaults
    pub fn from_document(user_id: impl Into<String>, document: &VaultDocument) -> Self {
        let blob = &document.vault_blob;
        let envelope = &document.key_envelope;

        Self {
            user_id: user_id.into(),
            vault_version: document.vault_version,
            device_clock: document.device_clock,
            vault_blob: BlobView {
                ciphertext_b64: blob.ciphertext_b64.clone(),
                nonce_b64: blob.nonce_b64.clone(),
                aad_b64: blob.aad_b64.clone(),
                alg: blob.alg_or_default().to_string(),
            },
            key_envelope: EnvelopeView {
                kek_scheme: envelope.kek_scheme_or_default().to_string(),
                wrapped_dek_b64: envelope.wrapped_dek_b64.clone(),
                wrap_nonce_b64: envelope.wrap_nonce_b64.clone(),
                kdf_salt_b64: envelope.kdf_salt_b64.clone(),
                kdf_info: envelope.kdf_info_or_default().to_string(),
            },
            meta: MetaView {
                created_at: document.meta.created_at,
                updated_at: document.meta.updated_at,
                last_writer_device_id: document.meta.last_writer_device_id.clone(),
                blob_sha256_b64: document.meta.blob_sha256_b64.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{KeyEnvelope, VaultBlob, VaultMeta, DEFAULT_ALG, DEFAULT_KDF_INFO};
    use chrono::TimeZone;

    fn sample() -> VaultDocument {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap();
        let updated = Utc::now();
        VaultDocument {
            vault_version: 7,
            device_clock: updated,
            vault_blob: VaultBlob {
                ciphertext_b64: "q83vEjRWeJA=".to_string(),
                nonce_b64: "AAECAwQFBgcICQoL".to_string(),
                aad_b64: String::new(),
                alg: None,
            },
            key_envelope: KeyEnvelope {
                kek_scheme: Some("passkey_only_v2".to_string()),
                wrapped_dek_b64: "d3JhcHBlZA==".to_string(),
                wrap_nonce_b64: "bm9uY2U=".to_string(),
                kdf_salt_b64: "c2FsdA==".to_string(),
                kdf_info: None,
            },
            meta: VaultMeta {
                created_at: created,
                updated_at: updated,
                last_writer_device_id: "laptop-1".to_string(),
                blob_sha256_b64: "ZGlnZXN0".to_string(),
            },
        }
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let doc = sample();
        let text = encode(&doc).unwrap();
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_encode_does_not_store_defaults() {
        let text = encode(&sample()).unwrap();
        assert!(!text.contains(DEFAULT_ALG));
        assert!(!text.contains(DEFAULT_KDF_INFO));
        assert!(!text.contains("\"alg\""));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("{not json").is_err());
        assert!(decode(r#"{"vault_version": 1}"#).is_err());
    }

    #[test]
    fn test_response_applies_defaults() {
        let doc = sample();
        let response = VaultResponse::from_document("u1", &doc);

        assert_eq!(response.user_id, "u1");
        assert_eq!(response.vault_blob.alg, DEFAULT_ALG);
        assert_eq!(response.key_envelope.kek_scheme, "passkey_only_v2");
        assert_eq!(response.key_envelope.kdf_info, DEFAULT_KDF_INFO);
        assert_eq!(response.vault_blob.ciphertext_b64, doc.vault_blob.ciphertext_b64);
        assert_eq!(response.meta.created_at, doc.meta.created_at);
    }
}
