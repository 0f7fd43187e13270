//! Top-level HTTP server: request router, bearer auth, admin surface,
//! security headers, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Json;
use bon::bon;
use futures::StreamExt;
use headers::authorization::Bearer;
use headers::{Authorization, HeaderMapExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::ProfileCache;
use crate::config::{AuthMode, ServerConfig};
use crate::crypto::StoreKey;
use crate::errors::GatewayError;
use crate::observe::{AuditLog, AuditQuery, EventHub, Metrics};
use crate::probes;
use crate::profile::Profile;
use crate::redact::Redactor;
use crate::session::gateway::{self, GatewayContext};
use crate::session::hooks::{GatewayHooks, ToolCallHooks};
use crate::session::mcp::McpServiceMap;
use crate::session::{SessionTracker, run_tool_call};
use crate::store::ProfileStore;

/// How long in-flight requests get to finish after the shutdown signal.
const DRAIN_BUDGET: Duration = Duration::from_secs(30);

pub struct Gateway {
    pub config: ServerConfig,
    pub store: ProfileStore,
    pub cache: ProfileCache,
    pub redactor: Arc<Redactor>,
    pub metrics: Arc<Metrics>,
    pub audit: Arc<AuditLog>,
    pub hub: Arc<EventHub>,
    pub tracker: Arc<SessionTracker>,
    pub hooks: Arc<dyn ToolCallHooks>,
    pub mcp: McpServiceMap,
}

#[bon]
impl Gateway {
    #[builder]
    pub async fn new(config: ServerConfig, key: StoreKey) -> Result<Arc<Self>, GatewayError> {
        let store = ProfileStore::load(&config.storage, key).await?;
        let redactor = Arc::new(Redactor::new());
        let metrics = Arc::new(Metrics::new());
        let audit = Arc::new(AuditLog::new(config.audit_log.clone()));
        let hub = Arc::new(EventHub::new());
        let tracker = Arc::new(SessionTracker::new());
        let hooks: Arc<dyn ToolCallHooks> = Arc::new(GatewayHooks {
            audit: audit.clone(),
            metrics: metrics.clone(),
            hub: hub.clone(),
            tracker: tracker.clone(),
        });
        let cache = ProfileCache::new(config.cache_ttl, redactor.clone(), metrics.clone());
        Ok(Arc::new(Self {
            config,
            store,
            cache,
            redactor,
            metrics,
            audit,
            hub,
            tracker,
            hooks,
            mcp: McpServiceMap::new(),
        }))
    }
}

/// Bind, serve, and drain within the shutdown budget.
pub async fn serve(gateway: Arc<Gateway>) -> Result<(), GatewayError> {
    let bind = gateway.config.bind;
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to bind {bind}: {e}")))?;
    info!(%bind, "gateway listening");

    let _flusher = gateway.audit.spawn_flusher();
    if let Some(push) = gateway.config.metrics_push.clone() {
        let metrics = gateway.metrics.clone();
        tokio::spawn(async move {
            metrics.push_loop(push.endpoint, push.interval).await;
        });
    }

    let app = router(gateway.clone())
        .into_make_service_with_connect_info::<SocketAddr>();
    let shutdown = CancellationToken::new();
    let serve_token = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_token.cancelled().await })
            .await
    });

    shutdown_signal().await;
    info!("shutdown signal received, draining");
    shutdown.cancel();
    match tokio::time::timeout(DRAIN_BUDGET, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("server error during drain: {e}"),
        Ok(Err(e)) => error!("server task failed: {e}"),
        Err(_) => warn!("drain budget exceeded, aborting remaining connections"),
    }

    gateway.audit.flush();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/profiles", get(list_profiles))
        .route(
            "/profiles/{name}",
            get(get_profile).put(put_profile).delete(delete_profile),
        )
        .route("/profiles/{name}/tools", get(profile_tools))
        .route("/profiles/{name}/execute", post(profile_execute))
        .route("/profiles/{name}/mcp", any(profile_mcp))
        .route("/profiles/{name}/gateway", get(profile_gateway))
        .route("/detect", post(detect_handler))
        .route("/test", post(test_handler))
        .route("/operations", post(operations_handler))
        .route("/verify", post(verify_handler))
        .route("/admin/metrics", get(admin_metrics))
        .route("/admin/audit", get(admin_audit))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/config", get(admin_config))
        .route("/admin/sessions", get(admin_sessions))
        .route("/admin/events", get(admin_events))
        .route("/admin/auth", get(admin_auth))
        .layer(DefaultBodyLimit::max(gateway.config.body_limit))
        .layer(middleware::from_fn(security_headers))
        .with_state(gateway)
}

/// Security headers on every non-MCP response.
async fn security_headers(request: Request<axum::body::Body>, next: Next) -> Response {
    let skip = request.uri().path().ends_with("/mcp");
    let mut response = next.run(request).await;
    if !skip {
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        );
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        );
    }
    response
}

/// A gateway error rendered as an HTTP response, redacted.
struct ApiError(GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": self.0.tag(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

impl Gateway {
    async fn authorize_profile(
        &self,
        headers: &axum::http::HeaderMap,
        name: &str,
    ) -> Result<Profile, GatewayError> {
        let profile = self
            .store
            .get(name)
            .await
            .ok_or_else(|| GatewayError::UnknownProfile(name.to_string()))?;
        match self.config.auth_mode {
            AuthMode::None => Ok(profile),
            AuthMode::Bearer => {
                let token = bearer_token(headers).ok_or(GatewayError::Unauthorized)?;
                let is_admin = self.config.admin_token.as_deref() == Some(token.as_str());
                if token == profile.token || is_admin {
                    Ok(profile)
                } else {
                    Err(GatewayError::Unauthorized)
                }
            }
        }
    }

    fn authorize_admin(&self, headers: &axum::http::HeaderMap) -> Result<(), GatewayError> {
        if self.config.auth_mode == AuthMode::None {
            return Ok(());
        }
        let token = bearer_token(headers).ok_or(GatewayError::Unauthorized)?;
        if self.config.admin_token.as_deref() == Some(token.as_str()) {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_profiles(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    Ok(Json(json!({"profiles": gateway.store.list_names().await})))
}

async fn get_profile(
    State(gateway): State<Arc<Gateway>>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let profile = gateway.authorize_profile(&headers, &name).await?;
    Ok(Json(json!({
        "name": profile.name,
        "config_yaml": profile.config_yaml,
    })))
}

#[derive(Deserialize)]
struct PutProfileRequest {
    token: Option<String>,
    config_yaml: Option<String>,
    config_json: Option<Value>,
}

async fn put_profile(
    State(gateway): State<Arc<Gateway>>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
    Json(request): Json<PutProfileRequest>,
) -> Result<Json<Value>, ApiError> {
    let config_yaml = match (request.config_yaml, request.config_json) {
        (Some(yaml), _) => yaml,
        (None, Some(json)) => serde_yaml::to_string(&json)
            .map_err(|e| GatewayError::BadArguments(format!("invalid config_json: {e}")))?,
        (None, None) => {
            return Err(GatewayError::BadArguments(
                "config_yaml or config_json is required".to_string(),
            )
            .into());
        }
    };

    let existing = gateway.store.get(&name).await;
    let token = match &existing {
        // Update: caller must hold the current token; a new one is optional.
        Some(_) => {
            let current = gateway.authorize_profile(&headers, &name).await?;
            request.token.unwrap_or(current.token)
        }
        // Create: a fresh token must be supplied.
        None => request.token.ok_or_else(|| {
            GatewayError::BadArguments("a token is required to create a profile".to_string())
        })?,
    };

    let profile = Profile {
        name: name.clone(),
        token,
        config_yaml,
    };
    // Reject configs that do not even parse before persisting them.
    profile.config()?;
    gateway.store.upsert(profile).await?;
    gateway.cache.evict(&name).await;
    gateway.mcp.evict(&name).await;
    Ok(Json(json!({"ok": true, "created": existing.is_none()})))
}

async fn delete_profile(
    State(gateway): State<Arc<Gateway>>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_profile(&headers, &name).await?;
    let removed = gateway.store.delete(&name).await?;
    gateway.cache.evict(&name).await;
    gateway.mcp.evict(&name).await;
    Ok(Json(json!({"ok": removed})))
}

async fn profile_tools(
    State(gateway): State<Arc<Gateway>>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let profile = gateway.authorize_profile(&headers, &name).await?;
    let entry = gateway.cache.get_or_build(&profile).await?;
    let tools: Vec<Value> = entry
        .registry
        .tools()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
                "output_schema": tool.output_schema,
            })
        })
        .collect();
    Ok(Json(json!({"tools": tools})))
}

#[derive(Deserialize)]
struct ExecuteRequest {
    tool_name: String,
    #[serde(default)]
    arguments: serde_json::Map<String, Value>,
}

async fn profile_execute(
    State(gateway): State<Arc<Gateway>>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<Value>, ApiError> {
    let profile = gateway.authorize_profile(&headers, &name).await?;
    let entry = gateway.cache.get_or_build(&profile).await?;
    let result = run_tool_call(
        &entry,
        &gateway.hooks,
        Uuid::new_v4(),
        &profile.name,
        Some(addr.to_string()),
        &request.tool_name,
        request.arguments,
    )
    .await?;
    let body: Value =
        serde_json::from_str(&result.body).unwrap_or(Value::String(result.body.clone()));
    Ok(Json(json!({
        "status": result.status,
        "content_type": result.content_type,
        "body": body,
        "truncated": result.truncated,
    })))
}

async fn profile_mcp(
    State(gateway): State<Arc<Gateway>>,
    Path(name): Path<String>,
    request: Request<axum::body::Body>,
) -> Result<Response, ApiError> {
    let profile = gateway
        .authorize_profile(request.headers(), &name)
        .await?;
    let entry = gateway.cache.get_or_build(&profile).await?;
    let service = gateway
        .mcp
        .service_for(
            &profile.name,
            &entry,
            gateway.hooks.clone(),
            gateway.tracker.clone(),
        )
        .await;
    let response = (*service)
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| GatewayError::Internal(format!("mcp transport error: {e}")))?;
    Ok(response.into_response())
}

async fn profile_gateway(
    State(gateway): State<Arc<Gateway>>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let profile = gateway.authorize_profile(&headers, &name).await?;
    let entry = gateway.cache.get_or_build(&profile).await?;
    let ctx = GatewayContext {
        profile: profile.name.clone(),
        entry,
        hooks: gateway.hooks.clone(),
        tracker: gateway.tracker.clone(),
        client_addr: Some(addr.to_string()),
    };
    Ok(ws.on_upgrade(move |socket| gateway::serve(socket, ctx)))
}

async fn detect_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<probes::DetectRequest>,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    let candidates = probes::detect(&request).await;
    Ok(Json(json!({"candidates": candidates})))
}

async fn test_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<probes::TestRequest>,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    let report = probes::test_spec(&request).await;
    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}

async fn operations_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<probes::OperationsRequest>,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    let summaries = probes::operations(&request).await?;
    Ok(Json(json!({"operations": summaries})))
}

async fn verify_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<probes::VerifyRequest>,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    let report = probes::verify(&request).await;
    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}

async fn admin_metrics(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
) -> Result<Response, ApiError> {
    gateway.authorize_admin(&headers)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gateway.metrics.render_prometheus(),
    )
        .into_response())
}

#[derive(Deserialize)]
struct AuditParams {
    profile: Option<String>,
    tool_name: Option<String>,
    api_name: Option<String>,
    success: Option<bool>,
    limit: Option<usize>,
}

async fn admin_audit(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
    Query(params): Query<AuditParams>,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    gateway.audit.flush();
    let events = gateway.audit.query(&AuditQuery {
        profile: params.profile,
        tool_name: params.tool_name,
        api_name: params.api_name,
        success: params.success,
        limit: Some(params.limit.unwrap_or(100)),
        ..Default::default()
    });
    Ok(Json(json!({"events": events})))
}

async fn admin_stats(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    gateway.audit.flush();
    Ok(Json(json!({
        "audit": gateway.audit.stats(),
        "cached_profiles": gateway.cache.cached_profiles().await,
        "circuit_breakers": gateway.cache.breaker_snapshots().await,
        "active_sessions": gateway.tracker.count(),
        "uptime_seconds": gateway.metrics.uptime().as_secs(),
    })))
}

async fn admin_config(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    // Never echo tokens or key material.
    Ok(Json(json!({
        "bind": gateway.config.bind.to_string(),
        "storage": gateway.config.storage,
        "auth_mode": format!("{:?}", gateway.config.auth_mode).to_lowercase(),
        "cache_ttl_seconds": gateway.config.cache_ttl.as_secs(),
        "body_limit": gateway.config.body_limit,
    })))
}

async fn admin_sessions(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    Ok(Json(json!({"sessions": gateway.tracker.list()})))
}

async fn admin_events(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
) -> Result<Response, ApiError> {
    gateway.authorize_admin(&headers)?;
    let (_id, rx) = gateway.hub.subscribe();
    let stream = ReceiverStream::new(rx).map(|event| {
        SseEvent::default()
            .json_data(&event)
            .map_err(axum::Error::new)
    });
    Ok(Sse::new(stream).into_response())
}

async fn admin_auth(
    State(gateway): State<Arc<Gateway>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Value>, ApiError> {
    gateway.authorize_admin(&headers)?;
    Ok(Json(json!({"authorized": true})))
}

/// Pick the profile served in stdio mode: the single stored profile, or the
/// one named by `SKYLINE_STDIO_PROFILE`.
pub async fn stdio_profile(gateway: &Gateway) -> Result<Profile, GatewayError> {
    if let Ok(name) = std::env::var("SKYLINE_STDIO_PROFILE") {
        return gateway
            .store
            .get(&name)
            .await
            .ok_or(GatewayError::UnknownProfile(name));
    }
    let names = gateway.store.list_names().await;
    match names.as_slice() {
        [only] => gateway
            .store
            .get(only)
            .await
            .ok_or_else(|| GatewayError::UnknownProfile(only.clone())),
        [] => Err(GatewayError::BadArguments(
            "no profiles in store; create one before using stdio transport".to_string(),
        )),
        _ => Err(GatewayError::BadArguments(
            "multiple profiles in store; set SKYLINE_STDIO_PROFILE".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;
    use axum::body::Body;
    use tower::ServiceExt;

    async fn gateway(auth_mode: AuthMode) -> Arc<Gateway> {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            storage: dir.path().join("profiles.enc.yaml"),
            auth_mode,
            admin_token: Some("admin-token".into()),
            ..Default::default()
        };
        // Leak the tempdir so the store path stays valid for the test.
        std::mem::forget(dir);
        Gateway::builder()
            .config(config)
            .key(StoreKey::from_bytes([0u8; KEY_LEN]))
            .build()
            .await
            .unwrap()
    }

    async fn request(
        gateway: &Arc<Gateway>,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };
        let response = router(gateway.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let gw = gateway(AuthMode::Bearer).await;
        let response = router(gw)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // Security headers are applied to non-MCP responses.
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn profile_crud_with_tokens() {
        let gw = gateway(AuthMode::Bearer).await;

        // Create requires a token in the body.
        let (status, _) = request(
            &gw,
            "PUT",
            "/profiles/acme",
            None,
            Some(json!({"config_yaml": "apis: []\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = request(
            &gw,
            "PUT",
            "/profiles/acme",
            None,
            Some(json!({"token": "acme-token", "config_yaml": "apis: []\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(true));

        // Reads need the right bearer.
        let (status, _) = request(&gw, "GET", "/profiles/acme", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) =
            request(&gw, "GET", "/profiles/acme", Some("acme-token"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], json!("acme"));

        // Updates without the existing token are rejected.
        let (status, _) = request(
            &gw,
            "PUT",
            "/profiles/acme",
            Some("wrong"),
            Some(json!({"config_yaml": "apis: []\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Admin token also works on profile routes.
        let (status, _) =
            request(&gw, "DELETE", "/profiles/acme", Some("admin-token"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) =
            request(&gw, "GET", "/profiles/acme", Some("acme-token"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_routes_require_admin_token() {
        let gw = gateway(AuthMode::Bearer).await;
        let (status, _) = request(&gw, "GET", "/admin/stats", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = request(&gw, "GET", "/admin/stats", Some("admin-token"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = request(&gw, "GET", "/admin/auth", Some("admin-token"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["authorized"], json!(true));
    }

    #[tokio::test]
    async fn unknown_profile_is_404() {
        let gw = gateway(AuthMode::Bearer).await;
        let (status, body) =
            request(&gw, "GET", "/profiles/nope/tools", Some("admin-token"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("unknown_profile"));
    }

    #[tokio::test]
    async fn tools_listing_for_empty_profile() {
        let gw = gateway(AuthMode::None).await;
        let (status, _) = request(
            &gw,
            "PUT",
            "/profiles/empty",
            None,
            Some(json!({"token": "t", "config_yaml": "apis: []\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = request(&gw, "GET", "/profiles/empty/tools", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tools"], json!([]));
    }

    #[tokio::test]
    async fn invalid_profile_config_is_rejected_on_put() {
        let gw = gateway(AuthMode::None).await;
        let (status, _) = request(
            &gw,
            "PUT",
            "/profiles/bad",
            None,
            Some(json!({"token": "t", "config_yaml": "apis: [{bogus: true}]\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
