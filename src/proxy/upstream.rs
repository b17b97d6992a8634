/// HTTP client for outbound calls to the table service.
/// Uses reqwest-middleware so transient-failure retries can be switched on.
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;

use crate::errors::AppError;

#[derive(Clone)]
pub struct UpstreamClient {
    client: ClientWithMiddleware,
}

impl UpstreamClient {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Result<Self, AppError> {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(32)
            .timeout(Duration::from_secs(timeout_secs)) // Total timeout including retries
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build HTTP client: {}", e)))?;

        let mut builder = ClientBuilder::new(reqwest_client);
        if max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self {
            client: builder.build(),
        })
    }

    /// Sends one request. Only transport-level failures are errors here;
    /// any HTTP status comes back as a response.
    pub async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        headers: reqwest::header::HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, AppError> {
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        request.send().await.map_err(|e| {
            let reason = transport_error(e);
            tracing::warn!("Upstream request failed: {}", reason);
            AppError::Proxy(reason)
        })
    }

    /// POSTs a JSON body and returns the status with the raw body text.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(reqwest::StatusCode, String), AppError> {
        let payload = serde_json::to_vec(body).map_err(|e| AppError::Internal(e.into()))?;
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| AppError::Proxy(transport_error(e)))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AppError::Proxy(format!("upstream body read failed: {}", body_error(e))))?;
        Ok((status, text))
    }
}

/// Error text for a failed send. The request URL is left out since it may
/// carry the sheet token; the cause chain is kept.
pub fn transport_error(e: reqwest_middleware::Error) -> String {
    match e {
        reqwest_middleware::Error::Reqwest(e) => body_error(e),
        other => other.to_string(),
    }
}

/// Same as [`transport_error`] for a plain reqwest failure.
pub fn body_error(e: reqwest::Error) -> String {
    let e = e.without_url();
    let mut text = e.to_string();
    let mut source = std::error::Error::source(&e);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
