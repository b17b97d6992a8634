//! Tenant access token exchange behind a [`TokenCache`].
//!
//! The proxy and the table client each own one provider. They differ only
//! in where the exchange is sent (upstream origin vs. proxy base URL) and
//! in the safety margin subtracted from the advertised lifetime.

use serde::Deserialize;
use serde_json::json;

use crate::cache::{FreshToken, TokenCache};
use crate::errors::AppError;
use crate::proxy::upstream::UpstreamClient;

pub const TOKEN_EXCHANGE_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";

/// Envelope code the table service answers with for a rejected token.
pub const TOKEN_INVALID_CODE: i64 = 99991663;

/// Margin used by the proxy's own cache.
pub const PROXY_MARGIN_SECS: i64 = 300;
/// Margin used by the table client's cache.
pub const CLIENT_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: Option<i64>,
}

#[derive(Clone)]
pub struct CredentialProvider {
    base_url: String,
    app_id: Option<String>,
    app_secret: Option<String>,
    http: UpstreamClient,
    cache: TokenCache,
}

impl CredentialProvider {
    pub fn new(
        base_url: impl Into<String>,
        app_id: Option<String>,
        app_secret: Option<String>,
        http: UpstreamClient,
        cache: TokenCache,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.filter(|s| !s.is_empty()),
            app_secret: app_secret.filter(|s| !s.is_empty()),
            http,
            cache,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.app_id.is_some() && self.app_secret.is_some()
    }

    /// Cached tenant token, exchanging the app credentials when the cache
    /// is empty or expired.
    pub async fn token(&self) -> Result<String, AppError> {
        let (app_id, app_secret) = match (&self.app_id, &self.app_secret) {
            (Some(id), Some(secret)) => (id.clone(), secret.clone()),
            _ => {
                return Err(AppError::Configuration(
                    "app id and app secret are not configured".into(),
                ))
            }
        };

        self.cache
            .get_or_refresh(|| self.exchange(app_id, app_secret))
            .await
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    async fn exchange(&self, app_id: String, app_secret: String) -> Result<FreshToken, AppError> {
        let url = format!("{}{}", self.base_url, TOKEN_EXCHANGE_PATH);
        tracing::debug!("exchanging app credentials for tenant token");

        let (status, text) = self
            .http
            .post_json(&url, &json!({ "app_id": app_id, "app_secret": app_secret }))
            .await?;

        let parsed: ExchangeResponse =
            serde_json::from_str(&text).map_err(|_| AppError::MalformedUpstream {
                status: status.as_u16(),
                excerpt: crate::proxy::transform::excerpt(&text),
            })?;

        if parsed.code != 0 {
            let msg = parsed
                .msg
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "failed to obtain access token".to_string());
            tracing::warn!(code = parsed.code, "token exchange rejected: {}", msg);
            return Err(AppError::UpstreamAuth(format!("{} (code {})", msg, parsed.code)));
        }

        let value = parsed.tenant_access_token.ok_or_else(|| {
            AppError::UpstreamAuth("token exchange response carried no token".into())
        })?;

        tracing::info!(ttl_secs = parsed.expire.unwrap_or(0), "obtained tenant access token");
        Ok(FreshToken {
            value,
            ttl_secs: parsed.expire.unwrap_or(0),
        })
    }
}
