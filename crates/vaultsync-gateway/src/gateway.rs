//! Main Gateway implementation
//!
//! HTTP front of the vault store: every vault request passes the rate limiter
//! and the bearer gate, then runs against the [`VaultService`] on the blocking
//! pool.

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use vaultsync_core::audit::{
    AuditOperation, AuditOutcome, AuditRecord, AuditSink, JsonlAuditSink, TracingAuditSink,
};
use vaultsync_core::{
    import_legacy_snapshot, ImportReport, RequestContext, SqliteVaultStore, VaultResponse,
    VaultService, VaultStore, WriteOutcome, WriteRequest,
};

use crate::config::GatewayConfig;
use crate::security::{AuthDecision, BearerAuth, RateDecision, RateLimiter};
use crate::{GatewayError, Result};

/// Client label used when the peer address is not available
const UNKNOWN_CLIENT: &str = "unknown";

/// Gateway state shared across handlers
#[derive(Clone)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub service: Arc<VaultService>,
    pub auth: Arc<BearerAuth>,
    pub rate_limiter: Arc<RateLimiter>,
    pub audit: Arc<dyn AuditSink>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("store_path", &self.config.storage.db_path)
            .field("auth", &self.auth)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl GatewayState {
    pub fn new(config: GatewayConfig, store: Arc<dyn VaultStore>, audit: Arc<dyn AuditSink>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            service: Arc::new(VaultService::new(store, audit.clone())),
            auth: Arc::new(BearerAuth::new(config.security.bearer_token.clone())),
            rate_limiter: Arc::new(RateLimiter::new(
                config.security.rate_limit_window(),
                config.security.rate_limit_permits,
            )),
            audit,
            config,
            shutdown_tx,
        }
    }
}

/// Body of an accepted write
#[derive(Debug, Serialize)]
pub struct WriteAccepted {
    pub ok: bool,
    pub vault_version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Main Gateway
#[derive(Debug)]
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a gateway over an already opened store and audit sink
    pub fn new(config: GatewayConfig, store: Arc<dyn VaultStore>, audit: Arc<dyn AuditSink>) -> Self {
        let state = Arc::new(GatewayState::new(config, store, audit));
        Self { state }
    }

    /// Open the SQLite store, run the one-time legacy import and pick the
    /// audit sink described by `config`.
    ///
    /// Blocking: call before the runtime starts serving, or from
    /// `spawn_blocking`.
    pub fn open(config: GatewayConfig) -> Result<Self> {
        let store = SqliteVaultStore::open(&config.storage.db_path)?;

        if let Some(snapshot) = &config.storage.legacy_snapshot_path {
            match import_legacy_snapshot(&store, std::path::Path::new(snapshot))? {
                ImportReport::Imported { imported, skipped } => {
                    tracing::info!(
                        "Legacy snapshot {}: {} imported, {} skipped",
                        snapshot,
                        imported,
                        skipped
                    );
                }
                ImportReport::Unreadable { reason } => {
                    tracing::warn!("Legacy snapshot {} not imported: {}", snapshot, reason);
                }
                ImportReport::NoSnapshot => {
                    tracing::debug!("No legacy snapshot at {}", snapshot);
                }
                ImportReport::StoreNotEmpty => {}
            }
        }

        let audit: Arc<dyn AuditSink> = match &config.audit_log_path {
            Some(path) => Arc::new(JsonlAuditSink::open(path)?),
            None => Arc::new(TracingAuditSink),
        };

        Ok(Self::new(config, Arc::new(store), audit))
    }

    /// Get gateway state
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/healthz", get(Self::handle_health))
            .route(
                "/v1/vaults/:user_id",
                get(Self::handle_get_vault).put(Self::handle_put_vault),
            )
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the gateway server; returns after [`Gateway::shutdown`] or Ctrl-C
    pub async fn start(&self) -> Result<()> {
        self.state.config.validate()?;
        let addr = self.state.config.socket_addr()?;
        let router = self.build_router();

        tracing::info!("vaultsync gateway starting on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        let limiter = self.state.rate_limiter.clone();
        let cleanup = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.window());
            loop {
                ticker.tick().await;
                limiter.cleanup();
            }
        });

        let mut shutdown_rx = self.state.shutdown_tx.subscribe();
        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Ctrl-C received"),
                _ = shutdown_rx.recv() => {}
            }
        })
        .await;

        cleanup.abort();
        served.map_err(|e| GatewayError::Internal(e.to_string()))?;

        tracing::info!("vaultsync gateway stopped");
        Ok(())
    }

    /// Shutdown the gateway
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
        tracing::info!("Gateway shutdown initiated");
    }

    // HTTP handlers

    async fn handle_health(State(state): State<Arc<GatewayState>>) -> Result<impl IntoResponse> {
        let service = state.service.clone();
        let vaults = tokio::task::spawn_blocking(move || service.store().count()).await??;

        Ok(Json(serde_json::json!({
            "ok": true,
            "service": "vaultsync",
            "version": crate::VERSION,
            "store_path": state.config.storage.db_path,
            "vaults": vaults,
        })))
    }

    async fn handle_get_vault(
        State(state): State<Arc<GatewayState>>,
        Path(user_id): Path<String>,
        connect: Option<ConnectInfo<SocketAddr>>,
        headers: HeaderMap,
    ) -> Result<Json<VaultResponse>> {
        let client = client_address(connect);
        admit(&state, &client, &headers, &user_id, AuditOperation::Read)?;

        let service = state.service.clone();
        let ctx = RequestContext::new(client);
        let key = user_id.clone();
        let document = tokio::task::spawn_blocking(move || service.read_vault(&ctx, &key)).await??;

        match document {
            Some(document) => Ok(Json(VaultResponse::from_document(user_id, &document))),
            None => Err(GatewayError::VaultNotFound),
        }
    }

    async fn handle_put_vault(
        State(state): State<Arc<GatewayState>>,
        Path(user_id): Path<String>,
        connect: Option<ConnectInfo<SocketAddr>>,
        headers: HeaderMap,
        body: std::result::Result<Json<WriteRequest>, JsonRejection>,
    ) -> Result<Json<WriteAccepted>> {
        let client = client_address(connect);
        admit(&state, &client, &headers, &user_id, AuditOperation::Write)?;

        let request = match body {
            Ok(Json(request)) => request,
            Err(rejection) => {
                state.audit.record(AuditRecord::new(
                    &user_id,
                    AuditOperation::Write,
                    AuditOutcome::InvalidBody,
                    &client,
                    None,
                ));
                return Err(GatewayError::InvalidBody(rejection.body_text()));
            }
        };

        let service = state.service.clone();
        let ctx = RequestContext::new(client);
        let outcome =
            tokio::task::spawn_blocking(move || service.write_vault(&ctx, &user_id, request))
                .await??;

        match outcome {
            WriteOutcome::Accepted {
                vault_version,
                updated_at,
            } => Ok(Json(WriteAccepted {
                ok: true,
                vault_version,
                updated_at,
            })),
            WriteOutcome::Conflict { server_version } => {
                Err(GatewayError::VersionConflict { server_version })
            }
        }
    }
}

fn client_address(connect: Option<ConnectInfo<SocketAddr>>) -> String {
    connect
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Rate limit, then authenticate. Rejections are audited here since they
/// never reach the service.
fn admit(
    state: &GatewayState,
    client: &str,
    headers: &HeaderMap,
    user_id: &str,
    operation: AuditOperation,
) -> Result<()> {
    let rejection = if state.rate_limiter.check(client) == RateDecision::Reject {
        Some((
            AuditOutcome::RateLimited,
            GatewayError::RateLimited(client.to_string()),
        ))
    } else {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        match state.auth.check(authorization) {
            AuthDecision::Authorized => None,
            AuthDecision::Unauthenticated => {
                Some((AuditOutcome::Unauthorized, GatewayError::Unauthorized))
            }
            AuthDecision::Forbidden => Some((AuditOutcome::Forbidden, GatewayError::Forbidden)),
        }
    };

    match rejection {
        None => Ok(()),
        Some((outcome, error)) => {
            tracing::debug!("Rejected {:?} of '{}' from {}: {}", operation, user_id, client, error);
            state
                .audit
                .record(AuditRecord::new(user_id, operation, outcome, client, None));
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use vaultsync_core::audit::MemoryAuditSink;
    use vaultsync_core::MemoryVaultStore;

    const TOKEN: &str = "test-token";

    fn test_gateway(config: GatewayConfig) -> (Gateway, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new(256));
        let gateway = Gateway::new(
            config.with_bearer_token(TOKEN),
            Arc::new(MemoryVaultStore::new()),
            audit.clone(),
        );
        (gateway, audit)
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_vault(user_id: &str, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(format!("/v1/vaults/{}", user_id));
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn put_vault(user_id: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(format!("/v1/vaults/{}", user_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    fn write_body(expected: i64, new: i64, ciphertext: &str) -> String {
        json!({
            "expected_version": expected,
            "new_version": new,
            "device_id": "laptop",
            "vault_blob": {"ciphertext_b64": ciphertext, "nonce_b64": "bm9uY2U=", "aad_b64": ""},
            "key_envelope": {"wrapped_dek_b64": "d3JhcA==", "wrap_nonce_b64": "", "kdf_salt_b64": ""},
            "meta": {"blob_sha256_b64": "c2hh"}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (gateway, _) = test_gateway(GatewayConfig::default());
        let router = gateway.build_router();

        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["service"], "vaultsync");
        assert_eq!(body["store_path"], "vault-store.db");
        assert_eq!(body["vaults"], 0);
    }

    #[tokio::test]
    async fn test_auth_gate() {
        let (gateway, audit) = test_gateway(GatewayConfig::default());
        let router = gateway.build_router();

        let (status, body) = send(&router, get_vault("alice", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = send(&router, get_vault("alice", Some("Basic abc"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&router, get_vault("alice", Some("Bearer nope"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, body) = send(&router, get_vault("alice", Some("bearer test-token"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "VAULT_NOT_FOUND");

        let outcomes: Vec<AuditOutcome> = audit.all().iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AuditOutcome::Unauthorized,
                AuditOutcome::Unauthorized,
                AuditOutcome::Forbidden,
                AuditOutcome::NotFound,
            ]
        );
        assert!(audit.all().iter().all(|r| r.client_address == UNKNOWN_CLIENT));
    }

    #[tokio::test]
    async fn test_write_read_and_conflict() {
        let (gateway, audit) = test_gateway(GatewayConfig::default());
        let router = gateway.build_router();

        let (status, body) = send(&router, put_vault("u1", write_body(0, 1, "QjE="))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["vault_version"], 1);
        assert!(body["updated_at"].is_string());

        let (status, body) = send(&router, put_vault("u1", write_body(0, 2, "QjI="))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "VERSION_CONFLICT");
        assert_eq!(body["server_version"], 1);

        let (status, _) = send(&router, put_vault("u1", write_body(1, 2, "QjI="))).await;
        assert_eq!(status, StatusCode::OK);

        let bearer = format!("Bearer {}", TOKEN);
        let (status, body) = send(&router, get_vault("u1", Some(&bearer))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["vault_version"], 2);
        assert_eq!(body["vault_blob"]["ciphertext_b64"], "QjI=");
        assert_eq!(body["vault_blob"]["alg"], "AES-256-GCM");
        assert_eq!(body["key_envelope"]["kek_scheme"], "passkey+recovery_code_v1");
        assert_eq!(body["meta"]["last_writer_device_id"], "laptop");
        assert_eq!(body["meta"]["blob_sha256_b64"], "c2hh");

        let conflict = audit
            .all()
            .into_iter()
            .find(|r| r.outcome == AuditOutcome::VersionConflict)
            .unwrap();
        assert_eq!(conflict.result_code, 409);
        assert_eq!(conflict.vault_version, Some(1));
    }

    #[tokio::test]
    async fn test_invalid_version_and_body() {
        let (gateway, audit) = test_gateway(GatewayConfig::default());
        let router = gateway.build_router();

        let (status, body) = send(&router, put_vault("u2", write_body(0, 0, "QQ=="))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_VERSION");

        let (status, body) = send(&router, put_vault("u2", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_BODY");

        let (status, body) = send(&router, put_vault("u2", r#"{"new_version": "one"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_BODY");

        let outcomes: Vec<AuditOutcome> = audit.all().iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AuditOutcome::InvalidVersion,
                AuditOutcome::InvalidBody,
                AuditOutcome::InvalidBody,
            ]
        );
        assert_eq!(gateway.state().service.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_runs_before_auth() {
        let (gateway, audit) = test_gateway(GatewayConfig::default().with_rate_limit(60, 2));
        let router = gateway.build_router();

        for _ in 0..2 {
            let (status, _) = send(&router, get_vault("carol", None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let bearer = format!("Bearer {}", TOKEN);
        let (status, body) = send(&router, get_vault("carol", Some(&bearer))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMITED");
        assert_eq!(audit.recent(1)[0].outcome, AuditOutcome::RateLimited);
    }

    #[tokio::test]
    async fn test_start_rejects_zero_rate_limit_window() {
        let (gateway, _) = test_gateway(GatewayConfig::default().with_rate_limit(0, 10));

        let err = gateway.start().await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_open_imports_legacy_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("vault-store.json");
        std::fs::write(
            &snapshot,
            r#"{"Vaults": {"dave": {
                "VaultVersion": 4,
                "DeviceClock": "2025-03-03T03:03:03+00:00",
                "VaultBlob": {"ciphertext_b64": "ZGF2ZQ==", "nonce_b64": "", "aad_b64": "", "alg": "XChaCha20-Poly1305"},
                "KeyEnvelope": {"wrapped_dek_b64": "", "wrap_nonce_b64": "", "kdf_salt_b64": ""},
                "Meta": {"CreatedAt": "2025-01-01T00:00:00+00:00",
                         "UpdatedAt": "2025-03-03T03:03:03+00:00",
                         "LastWriterDeviceId": "tablet", "BlobSha256Base64": ""}
            }}}"#,
        )
        .unwrap();
        let db_path = dir.path().join("vaults.db");

        let config = GatewayConfig::default()
            .with_bearer_token(TOKEN)
            .with_db_path(db_path.to_str().unwrap())
            .with_legacy_snapshot(snapshot.to_str().unwrap())
            .with_audit_log(dir.path().join("audit.jsonl").to_str().unwrap());
        let gateway = Gateway::open(config).unwrap();
        let router = gateway.build_router();

        let bearer = format!("Bearer {}", TOKEN);
        let (status, body) = send(&router, get_vault("dave", Some(&bearer))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vault_version"], 4);
        assert_eq!(body["vault_blob"]["alg"], "XChaCha20-Poly1305");
        assert_eq!(body["meta"]["last_writer_device_id"], "tablet");

        let audit_log = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(audit_log.lines().count(), 1);
        assert!(audit_log.contains("\"dave\""));
    }
}
