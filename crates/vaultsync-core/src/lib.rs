//! Vaultsync Core - versioned vault persistence with optimistic concurrency
//!
//! Each user owns exactly one encrypted vault document. Clients replace it
//! wholesale, naming the version they last saw; the store commits the
//! replacement only if that version is still current.
//!
//! # Architecture
//!
//! 1. **Codec** (`codec`): durable JSON form and the response view
//! 2. **Storage** (`storage`): `VaultStore` trait, SQLite WAL and in-memory backends
//! 3. **Import** (`import`): one-shot seeding from the legacy JSON snapshot
//! 4. **Service** (`service`): OCC orchestration and revision building
//! 5. **Audit** (`audit`): one record per request, fire-and-forget
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use vaultsync_core::audit::MemoryAuditSink;
//! use vaultsync_core::service::{RequestContext, VaultService, WriteOutcome, WriteRequest};
//! use vaultsync_core::storage::MemoryVaultStore;
//!
//! let service = VaultService::new(
//!     Arc::new(MemoryVaultStore::new()),
//!     Arc::new(MemoryAuditSink::new(16)),
//! );
//! let ctx = RequestContext::new("127.0.0.1");
//!
//! let first = WriteRequest { expected_version: 0, new_version: 1, ..Default::default() };
//! assert!(matches!(
//!     service.write_vault(&ctx, "alice", first).unwrap(),
//!     WriteOutcome::Accepted { vault_version: 1, .. }
//! ));
//!
//! let stale = WriteRequest { expected_version: 0, new_version: 2, ..Default::default() };
//! assert_eq!(
//!     service.write_vault(&ctx, "alice", stale).unwrap(),
//!     WriteOutcome::Conflict { server_version: 1 }
//! );
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod audit;
pub mod codec;
pub mod document;
pub mod error;
pub mod import;
pub mod service;
pub mod storage;

pub use codec::VaultResponse;
pub use document::{KeyEnvelope, VaultBlob, VaultDocument, VaultMeta};
pub use error::{Result, VaultError};
pub use import::{import_legacy_snapshot, ImportReport};
pub use service::{RequestContext, VaultService, WriteMeta, WriteOutcome, WriteRequest};
pub use storage::{CasOutcome, MemoryVaultStore, SqliteVaultStore, VaultStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
