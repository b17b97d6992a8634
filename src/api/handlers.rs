use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::Json;
use serde::Serialize;

use crate::app::AppState;
use crate::errors::AppError;

#[derive(Debug, Serialize)]
pub struct ConfigStatus {
    pub configured: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusEnvelope {
    pub code: i64,
    pub data: ConfigStatus,
}

/// Reports whether the server holds all three secrets. GET only.
pub async fn config_status(
    State(state): State<Arc<AppState>>,
    method: Method,
) -> Result<Json<StatusEnvelope>, AppError> {
    if method != Method::GET {
        return Err(AppError::MethodNotAllowed);
    }

    Ok(Json(StatusEnvelope {
        code: 0,
        data: ConfigStatus {
            configured: state.config.is_configured(),
        },
    }))
}
