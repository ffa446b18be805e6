//! Error types for the Gateway

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vaultsync_core::VaultError;

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Missing or malformed bearer token")]
    Unauthorized,

    #[error("Bearer token rejected")]
    Forbidden,

    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("vault not found")]
    VaultNotFound,

    #[error("Version conflict, server has version {server_version}")]
    VersionConflict { server_version: i64 },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InvalidConfig(e.to_string())
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(e: tokio::task::JoinError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl GatewayError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::VaultNotFound => StatusCode::NOT_FOUND,
            GatewayError::VersionConflict { .. } => StatusCode::CONFLICT,
            GatewayError::Vault(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            GatewayError::Vault(_)
            | GatewayError::InvalidConfig(_)
            | GatewayError::Io(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::Forbidden => "FORBIDDEN",
            GatewayError::RateLimited(_) => "RATE_LIMITED",
            GatewayError::InvalidBody(_) => "INVALID_BODY",
            GatewayError::VaultNotFound => "VAULT_NOT_FOUND",
            GatewayError::VersionConflict { .. } => "VERSION_CONFLICT",
            GatewayError::Vault(VaultError::InvalidVersion(_)) => "INVALID_VERSION",
            GatewayError::Vault(_) => "STORAGE_ERROR",
            GatewayError::InvalidConfig(_) | GatewayError::Io(_) | GatewayError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<i64>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let server_version = match &self {
            GatewayError::VersionConflict { server_version } => Some(*server_version),
            _ => None,
        };
        // Storage details stay in the logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            code: self.code(),
            message,
            server_version,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

/// Result type for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_codes() {
        let conflict = GatewayError::VersionConflict { server_version: 4 };
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "VERSION_CONFLICT");

        let invalid = GatewayError::from(VaultError::InvalidVersion(-1));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.code(), "INVALID_VERSION");

        let storage = GatewayError::from(VaultError::Internal("disk".to_string()));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_unauthorized_sets_challenge() {
        let response = GatewayError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
