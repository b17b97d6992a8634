//! Router assembly and shared state for the proxy server.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Json;
use serde_json::json;

use crate::cache::TokenCache;
use crate::config::Config;
use crate::credential::{CredentialProvider, PROXY_MARGIN_SECS};
use crate::errors::AppError;
use crate::proxy;
use crate::proxy::upstream::UpstreamClient;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: Config,
    pub upstream_client: UpstreamClient,
    pub credentials: CredentialProvider,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        Self::with_token_cache(config, TokenCache::new(PROXY_MARGIN_SECS))
    }

    /// Same as [`AppState::new`] with a caller-supplied cache, e.g. one
    /// driven by a manual clock.
    pub fn with_token_cache(config: Config, cache: TokenCache) -> Result<Self, AppError> {
        let upstream_client =
            UpstreamClient::new(config.upstream_timeout_secs, config.upstream_retries)?;
        let credentials = CredentialProvider::new(
            config.upstream_origin.clone(),
            config.app_id.clone(),
            config.app_secret.clone(),
            upstream_client.clone(),
            cache,
        );

        Ok(Self {
            config,
            upstream_client,
            credentials,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> axum::Router {
    let prefix = state.config.route_prefix.clone();

    axum::Router::new()
        .merge(crate::api::api_router(&state.config))
        .route(&prefix, any(proxy::handler::proxy_handler))
        .route(&format!("{}/*rest", prefix), any(proxy::handler::proxy_handler))
        .fallback(fallback)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(cors_middleware))
}

/// `prefix/` with nothing after it is a missing path, anything else is 404.
async fn fallback(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let path = req.uri().path();
    if path.trim_end_matches('/') == state.config.route_prefix {
        return AppError::MissingPath.into_response();
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "code": -1, "msg": "not found" })),
    )
        .into_response()
}

/// Middleware: answers every preflight with 200 and stamps the permissive
/// cross-origin header set on every response, errors included.
pub async fn cors_middleware(req: Request, next: Next) -> Response {
    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = resp.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    resp
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}
