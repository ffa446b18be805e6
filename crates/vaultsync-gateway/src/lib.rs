//! Vaultsync Gateway - HTTP access to the versioned vault store
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               vaultsync Gateway              │
//! ├──────────────────────────────────────────────┤
//! │   GET /healthz        GET|PUT /v1/vaults/:id │
//! │                              │               │
//! │                   ┌──────────▼──────────┐    │
//! │                   │    Rate Limiter     │    │
//! │                   └──────────┬──────────┘    │
//! │                   ┌──────────▼──────────┐    │
//! │                   │  Bearer Token Gate  │    │
//! │                   └──────────┬──────────┘    │
//! │                   ┌──────────▼──────────┐    │
//! │                   │    VaultService     │────┼──► audit sink
//! │                   └──────────┬──────────┘    │
//! │                   ┌──────────▼──────────┐    │
//! │                   │ SQLite (WAL) store  │    │
//! │                   └─────────────────────┘    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Optimistic concurrency**: stale writers get `409` with the server version
//! - **Security**: shared bearer token, per-client fixed-window rate limiting
//! - **Legacy migration**: one-time import of the old JSON snapshot at startup
//! - **Audit**: one record per request, to tracing or a JSONL file

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod security;

pub use config::{GatewayConfig, SecuritySettings, StorageSettings};
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayState};
pub use security::{AuthDecision, BearerAuth, RateDecision, RateLimiter};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default gateway port
pub const DEFAULT_PORT: u16 = 8088;

/// Default bind address
pub const DEFAULT_HOST: &str = "127.0.0.1";
