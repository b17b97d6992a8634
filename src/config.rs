use anyhow::Context;

pub const DEFAULT_UPSTREAM_ORIGIN: &str = "https://open.feishu.cn";
pub const DEFAULT_ROUTE_PREFIX: &str = "/api/feishu";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Origin of the table service, without a trailing slash.
    pub upstream_origin: String,
    /// Path prefix the proxy is mounted under. Stripped before forwarding.
    pub route_prefix: String,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    /// Server-held table collection id, substituted for the path placeholder.
    pub sheet_token: Option<String>,
    /// Total timeout for one outbound call, retries included.
    /// Set via TABLEGATE_UPSTREAM_TIMEOUT_SECS. Default: 30.
    pub upstream_timeout_secs: u64,
    /// Transient-failure retries for outbound calls. 0 = disabled.
    /// Set via TABLEGATE_UPSTREAM_RETRIES. Default: 0.
    pub upstream_retries: u32,
}

impl Config {
    /// True when all three secrets are present. Never exposes the values.
    pub fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.app_secret.is_some() && self.sheet_token.is_some()
    }

    /// Path of the configuration-status endpoint, next to the proxy prefix.
    pub fn config_status_path(&self) -> String {
        format!("{}-config", self.route_prefix)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8443,
            upstream_origin: DEFAULT_UPSTREAM_ORIGIN.to_string(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            app_id: None,
            app_secret: None,
            sheet_token: None,
            upstream_timeout_secs: 30,
            upstream_retries: 0,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let route_prefix = non_empty_var("TABLEGATE_ROUTE_PREFIX")
        .unwrap_or_else(|| DEFAULT_ROUTE_PREFIX.into());
    if !route_prefix.starts_with('/') || route_prefix.len() < 2 {
        anyhow::bail!(
            "TABLEGATE_ROUTE_PREFIX must start with '/' and name a path, got '{}'",
            route_prefix
        );
    }

    let upstream_origin = non_empty_var("TABLEGATE_UPSTREAM_ORIGIN")
        .unwrap_or_else(|| DEFAULT_UPSTREAM_ORIGIN.into());
    let parsed = url::Url::parse(&upstream_origin)
        .with_context(|| format!("TABLEGATE_UPSTREAM_ORIGIN is not a URL: '{}'", upstream_origin))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("TABLEGATE_UPSTREAM_ORIGIN must be http or https, got '{}'", upstream_origin);
    }

    let cfg = Config {
        port: std::env::var("TABLEGATE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8443),
        upstream_origin: upstream_origin.trim_end_matches('/').to_string(),
        route_prefix: route_prefix.trim_end_matches('/').to_string(),
        app_id: non_empty_var("FEISHU_APP_ID"),
        app_secret: non_empty_var("FEISHU_APP_SECRET"),
        sheet_token: non_empty_var("FEISHU_SHEET_TOKEN"),
        upstream_timeout_secs: std::env::var("TABLEGATE_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
        upstream_retries: std::env::var("TABLEGATE_UPSTREAM_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    };

    if !cfg.is_configured() {
        tracing::warn!(
            "FEISHU_APP_ID / FEISHU_APP_SECRET / FEISHU_SHEET_TOKEN not fully set; \
             proxy will only forward requests that carry their own Authorization header"
        );
    }

    Ok(cfg)
}

/// Reads an env var, treating empty or whitespace-only values as unset.
fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_requires_all_three_secrets() {
        let mut cfg = Config {
            app_id: Some("cli_a".into()),
            app_secret: Some("secret".into()),
            ..Config::default()
        };
        assert!(!cfg.is_configured());

        cfg.sheet_token = Some("XYZ".into());
        assert!(cfg.is_configured());
    }

    #[test]
    fn test_config_status_path_follows_prefix() {
        let cfg = Config::default();
        assert_eq!(cfg.config_status_path(), "/api/feishu-config");
    }
}
