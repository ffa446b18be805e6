//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::{GatewayError, DEFAULT_HOST, DEFAULT_PORT};

/// Bearer token accepted when none is configured
pub const DEV_BEARER_TOKEN: &str = "dev-token";

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Storage configuration
    pub storage: StorageSettings,

    /// Security configuration
    pub security: SecuritySettings,

    /// JSONL audit log; audit records go to tracing when unset
    pub audit_log_path: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            storage: StorageSettings::default(),
            security: SecuritySettings::default(),
            audit_log_path: None,
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the SQLite database path
    pub fn with_db_path(mut self, path: impl Into<String>) -> Self {
        self.storage.db_path = path.into();
        self
    }

    /// Set the legacy snapshot path
    pub fn with_legacy_snapshot(mut self, path: impl Into<String>) -> Self {
        self.storage.legacy_snapshot_path = Some(path.into());
        self
    }

    /// Set the required bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.security.bearer_token = token.into();
        self
    }

    /// Set the rate limit window and permits per window
    pub fn with_rate_limit(mut self, window_secs: u64, permits: u32) -> Self {
        self.security.rate_limit_window_secs = window_secs;
        self.security.rate_limit_permits = permits;
        self
    }

    /// Set the JSONL audit log path
    pub fn with_audit_log(mut self, path: impl Into<String>) -> Self {
        self.audit_log_path = Some(path.into());
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GatewayError::InvalidConfig(format!("listen address: {}", e)))
    }

    /// Reject settings the gateway cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.security.bearer_token.trim().is_empty() {
            return Err(GatewayError::InvalidConfig("bearer token is empty".to_string()));
        }
        if self.security.rate_limit_window_secs == 0 {
            return Err(GatewayError::InvalidConfig(
                "rate limit window must be > 0".to_string(),
            ));
        }
        if self.security.rate_limit_permits == 0 {
            return Err(GatewayError::InvalidConfig(
                "rate limit permits must be > 0".to_string(),
            ));
        }
        if self.storage.db_path.trim().is_empty() {
            return Err(GatewayError::InvalidConfig("db path is empty".to_string()));
        }
        self.socket_addr()?;
        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &str) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults overlaid with process environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Overlay variables produced by `lookup` onto this configuration
    pub fn overlay_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> crate::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("VAULTSYNC_HOST") {
            self.host = host;
        }
        if let Some(port) = var("VAULTSYNC_PORT") {
            self.port = parse_var("VAULTSYNC_PORT", &port)?;
        }
        if let Some(token) =
            var("TSUPASSWD_SYNC_BEARER_TOKEN").or_else(|| var("TSUPASSWD_SYNC_DEV_BEARER_TOKEN"))
        {
            self.security.bearer_token = token;
        }
        if let Some(path) = var("VAULTSYNC_DB_PATH") {
            self.storage.db_path = path;
        }
        if let Some(path) = var("TSUPASSWD_SYNC_STORE_PATH") {
            self.storage.legacy_snapshot_path = Some(path);
        }
        if let Some(path) = var("VAULTSYNC_AUDIT_LOG") {
            self.audit_log_path = Some(path);
        }
        if let Some(window) = var("VAULTSYNC_RATE_LIMIT_WINDOW_SECS") {
            self.security.rate_limit_window_secs =
                parse_var("VAULTSYNC_RATE_LIMIT_WINDOW_SECS", &window)?;
        }
        if let Some(permits) = var("VAULTSYNC_RATE_LIMIT_PERMITS") {
            self.security.rate_limit_permits = parse_var("VAULTSYNC_RATE_LIMIT_PERMITS", &permits)?;
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| GatewayError::InvalidConfig(format!("{}={:?}: {}", key, value, e)))
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file
    pub db_path: String,

    /// Legacy whole-store JSON snapshot imported once into an empty database
    pub legacy_snapshot_path: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "vault-store.db".to_string(),
            legacy_snapshot_path: Some("vault-store.json".to_string()),
        }
    }
}

/// Security settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// Token every request must present as `Authorization: Bearer <token>`
    pub bearer_token: String,

    /// Rate limit window length in seconds
    pub rate_limit_window_secs: u64,

    /// Requests allowed per client per window
    pub rate_limit_permits: u32,
}

impl SecuritySettings {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            bearer_token: DEV_BEARER_TOKEN.to_string(),
            rate_limit_window_secs: 60,
            rate_limit_permits: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.security.bearer_token, DEV_BEARER_TOKEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = GatewayConfig::new()
            .with_host("0.0.0.0")
            .with_port(9090)
            .with_bearer_token("s3cret")
            .with_rate_limit(10, 5);

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.security.bearer_token, "s3cret");
        assert_eq!(config.security.rate_limit_window(), Duration::from_secs(10));
        assert_eq!(config.security.rate_limit_permits, 5);
    }

    #[test]
    fn test_env_overlay_and_token_fallback() {
        let config = GatewayConfig::default()
            .overlay_env(env(&[
                ("TSUPASSWD_SYNC_DEV_BEARER_TOKEN", "dev-2"),
                ("TSUPASSWD_SYNC_STORE_PATH", "/var/lib/sync/vault-store.json"),
                ("VAULTSYNC_PORT", "9000"),
                ("VAULTSYNC_RATE_LIMIT_PERMITS", "7"),
            ]))
            .unwrap();
        assert_eq!(config.security.bearer_token, "dev-2");
        assert_eq!(
            config.storage.legacy_snapshot_path.as_deref(),
            Some("/var/lib/sync/vault-store.json")
        );
        assert_eq!(config.port, 9000);
        assert_eq!(config.security.rate_limit_permits, 7);

        let config = GatewayConfig::default()
            .overlay_env(env(&[
                ("TSUPASSWD_SYNC_BEARER_TOKEN", "prod"),
                ("TSUPASSWD_SYNC_DEV_BEARER_TOKEN", "dev-2"),
            ]))
            .unwrap();
        assert_eq!(config.security.bearer_token, "prod");
    }

    #[test]
    fn test_env_rejects_bad_numbers() {
        let err = GatewayConfig::default()
            .overlay_env(env(&[("VAULTSYNC_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(GatewayConfig::default().with_rate_limit(0, 5).validate().is_err());
        assert!(GatewayConfig::default().with_rate_limit(60, 0).validate().is_err());
        assert!(GatewayConfig::default().with_bearer_token("  ").validate().is_err());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let path = path.to_str().unwrap();

        let config = GatewayConfig::default().with_port(8123).with_audit_log("audit.jsonl");
        config.to_file(path).unwrap();
        let parsed = GatewayConfig::from_file(path).unwrap();
        assert_eq!(parsed.port, 8123);
        assert_eq!(parsed.audit_log_path.as_deref(), Some("audit.jsonl"));
    }
}
