use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Envelope code for proxy-synthesised failures.
pub const CODE_PROXY_FAILURE: i64 = -1;
/// Envelope code for upstream bodies that are not JSON.
pub const CODE_NON_JSON_UPSTREAM: i64 = -2;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing request path")]
    MissingPath,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("authentication failed: {0}")]
    UpstreamAuth(String),

    #[error("not found or forbidden: {0}")]
    UpstreamNotFoundOrForbidden(String),

    #[error("upstream returned a non-JSON response")]
    MalformedUpstream { status: u16, excerpt: String },

    #[error("proxy request failed: {0}")]
    Proxy(String),

    #[error("{msg}")]
    Application { code: i64, msg: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message text as carried by the upstream or synthesised locally,
    /// used when remapping known upstream error codes.
    pub fn message(&self) -> String {
        match self {
            AppError::Application { msg, .. } => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest_middleware::Error> for AppError {
    fn from(e: reqwest_middleware::Error) -> Self {
        AppError::Proxy(crate::proxy::upstream::transport_error(e))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Proxy(crate::proxy::upstream::body_error(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg, data) = match &self {
            AppError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                CODE_PROXY_FAILURE,
                self.to_string(),
                None,
            ),
            AppError::MissingPath | AppError::InvalidBody(_) => (
                StatusCode::BAD_REQUEST,
                CODE_PROXY_FAILURE,
                self.to_string(),
                None,
            ),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                CODE_PROXY_FAILURE,
                self.to_string(),
                None,
            ),
            AppError::UpstreamAuth(_) | AppError::UpstreamNotFoundOrForbidden(_) => (
                StatusCode::BAD_GATEWAY,
                CODE_PROXY_FAILURE,
                self.to_string(),
                None,
            ),
            AppError::MalformedUpstream { status, excerpt } => {
                tracing::warn!(upstream_status = status, "upstream body is not JSON");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    CODE_NON_JSON_UPSTREAM,
                    self.to_string(),
                    Some(json!({ "upstream_status": status, "excerpt": excerpt })),
                )
            }
            AppError::Proxy(e) => {
                tracing::error!("Proxy failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    CODE_PROXY_FAILURE,
                    self.to_string(),
                    None,
                )
            }
            AppError::Application { code, msg } => {
                (StatusCode::BAD_GATEWAY, *code, msg.clone(), None)
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    CODE_PROXY_FAILURE,
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({ "code": code, "msg": msg });
        if let Some(data) = data {
            body["data"] = data;
        }

        (status, Json(body)).into_response()
    }
}
