use std::sync::Arc;

use axum::{
    routing::{any, get},
    Router,
};

use crate::app::AppState;
use crate::config::Config;

pub mod handlers;

/// Build the local (non-proxied) routes: health and the
/// configuration-status endpoint that sits next to the proxy prefix.
pub fn api_router(cfg: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(&cfg.config_status_path(), any(handlers::config_status))
}
