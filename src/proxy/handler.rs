use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::app::AppState;
use crate::credential::TOKEN_INVALID_CODE;
use crate::errors::AppError;
use crate::proxy::{transform, upstream};

/// Forwards one request to the table service and relays its JSON answer.
#[tracing::instrument(skip_all, fields(method = %method))]
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let start = Instant::now();
    let cfg = &state.config;

    // -- 1. Upstream path --
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let path = transform::strip_prefix(path_and_query, &cfg.route_prefix)
        .ok_or(AppError::MissingPath)?;

    let path = if transform::has_placeholder(path) {
        let sheet_token = cfg.sheet_token.as_deref().ok_or_else(|| {
            AppError::Configuration("FEISHU_SHEET_TOKEN is not configured".into())
        })?;
        transform::substitute_placeholder(path, sheet_token)
    } else {
        path.to_string()
    };

    let upstream_url = transform::rewrite_url(&cfg.upstream_origin, &path);
    tracing::info!(
        "{}",
        transform::redact(
            &format!("[{}] {}", method, upstream_url),
            cfg.sheet_token.as_deref()
        )
    );

    // -- 2. Credential: caller's own header, or one we fetch --
    let mut upstream_headers = reqwest::header::HeaderMap::new();
    upstream_headers.insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    let mut injected = false;
    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        let value = reqwest::header::HeaderValue::from_bytes(auth.as_bytes())
            .map_err(|_| AppError::InvalidBody("malformed Authorization header".into()))?;
        upstream_headers.insert(reqwest::header::AUTHORIZATION, value);
    } else if !transform::is_auth_path(&path) {
        let token = state.credentials.token().await?;
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("token is not a valid header: {}", e)))?;
        upstream_headers.insert(reqwest::header::AUTHORIZATION, value);
        injected = true;
    }

    // -- 3. Body (re-serialised JSON, never for GET) --
    let upstream_body = if method != Method::GET && !body.is_empty() {
        let json: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| AppError::InvalidBody(format!("body is not JSON: {}", e)))?;
        Some(serde_json::to_vec(&json).map_err(|e| AppError::Internal(e.into()))?)
    } else {
        None
    };

    let upstream_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| AppError::MethodNotAllowed)?;

    // -- 4. Forward --
    let secret = cfg.sheet_token.as_deref();
    let upstream_resp = state
        .upstream_client
        .send(upstream_method, &upstream_url, upstream_headers, upstream_body)
        .await
        .map_err(|e| redact_error(e, secret))?;

    let status = upstream_resp.status();
    let text = upstream_resp.text().await.map_err(|e| {
        AppError::Proxy(transform::redact(
            &format!("upstream body read failed: {}", upstream::body_error(e)),
            secret,
        ))
    })?;

    // -- 5. Relay, only if the body really is JSON --
    let data: serde_json::Value =
        serde_json::from_str(&text).map_err(|_| AppError::MalformedUpstream {
            status: status.as_u16(),
            excerpt: transform::excerpt(&text),
        })?;

    // A token we injected was refused; the next request exchanges again.
    if injected && data.get("code").and_then(serde_json::Value::as_i64) == Some(TOKEN_INVALID_CODE) {
        tracing::warn!("upstream rejected the cached tenant token, dropping it");
        state.credentials.invalidate().await;
    }

    tracing::debug!(
        status = status.as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "upstream responded"
    );

    let relay_status =
        StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((relay_status, Json(data)).into_response())
}

/// Proxy failures reach the caller verbatim, so they never carry the
/// sheet token.
fn redact_error(err: AppError, secret: Option<&str>) -> AppError {
    match err {
        AppError::Proxy(msg) => AppError::Proxy(transform::redact(&msg, secret)),
        other => other,
    }
}
