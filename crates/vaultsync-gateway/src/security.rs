//! Security layer for the vaultsync Gateway
//!
//! Two gates run before any vault operation: a fixed-window rate limiter keyed
//! by client address, and a bearer-token check. Each returns a verdict only;
//! the gateway decides what response to produce.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

const BEARER_PREFIX: &str = "Bearer ";

/// Verdict of the authentication gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// No usable `Authorization: Bearer` header
    Unauthenticated,
    /// A bearer token was presented but it is not the configured one
    Forbidden,
    /// Token matches
    Authorized,
}

/// Single shared bearer token check
pub struct BearerAuth {
    token: String,
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").field("token", &"<redacted>").finish()
    }
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Check the raw `Authorization` header value.
    ///
    /// The scheme is matched case-insensitively; the token is trimmed and
    /// compared in constant time.
    pub fn check(&self, header: Option<&str>) -> AuthDecision {
        let Some(value) = header else {
            return AuthDecision::Unauthenticated;
        };

        let scheme_matches = value
            .get(..BEARER_PREFIX.len())
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case(BEARER_PREFIX));
        if !scheme_matches {
            return AuthDecision::Unauthenticated;
        }

        let presented = value[BEARER_PREFIX.len()..].trim();
        if bool::from(presented.as_bytes().ct_eq(self.token.as_bytes())) {
            AuthDecision::Authorized
        } else {
            AuthDecision::Forbidden
        }
    }
}

/// Verdict of the rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Reject,
}

/// Rate limit entry
#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new() -> Self {
        Self {
            count: 1,
            window_start: Instant::now(),
        }
    }

    fn increment(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    fn is_expired(&self, window: Duration) -> bool {
        self.window_start.elapsed() > window
    }
}

/// Fixed-window request limiter keyed by client identity
#[derive(Debug)]
pub struct RateLimiter {
    entries: RwLock<HashMap<String, RateLimitEntry>>,
    window: Duration,
    permits: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, permits: u32) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            window,
            permits,
        }
    }

    /// Count one request from `client` and decide whether it may proceed
    pub fn check(&self, client: &str) -> RateDecision {
        let mut entries = self.entries.write();

        let allowed = match entries.get_mut(client) {
            Some(entry) if !entry.is_expired(self.window) => entry.increment() <= self.permits,
            _ => {
                entries.insert(client.to_string(), RateLimitEntry::new());
                self.permits >= 1
            }
        };

        if allowed {
            RateDecision::Allow
        } else {
            tracing::debug!("Rate limit exceeded for {}", client);
            RateDecision::Reject
        }
    }

    /// Requests counted in the current window and the permit count
    pub fn status(&self, client: &str) -> (u32, u32) {
        let entries = self.entries.read();
        match entries.get(client) {
            Some(entry) if !entry.is_expired(self.window) => (entry.count, self.permits),
            _ => (0, self.permits),
        }
    }

    /// Drop entries whose window has passed
    pub fn cleanup(&self) {
        let mut entries = self.entries.write();
        entries.retain(|_, e| !e.is_expired(self.window));
    }

    /// Number of tracked clients
    pub fn tracked_clients(&self) -> usize {
        self.entries.read().len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
