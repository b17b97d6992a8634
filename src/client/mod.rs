//! Table client: list/create/update/delete over the three ledger tables,
//! talking to the table service through the credential proxy.

pub mod fields;
pub mod settings;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::cache::TokenCache;
use crate::credential::{CredentialProvider, CLIENT_MARGIN_SECS, TOKEN_INVALID_CODE};
use crate::errors::AppError;
use crate::models::envelope::Envelope;
use crate::models::record::Record;
use crate::models::table::{TableKind, DEFAULT_VIEW_NAME};
use crate::proxy::transform::{self, SHEET_TOKEN_PLACEHOLDER};
use crate::proxy::upstream::{self, UpstreamClient};

use fields::{translate, FieldMap};
use settings::ClientSettings;

pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8443/api/feishu";

/// Outcome of [`TableClient::setup`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupReport {
    /// Tables that did not exist and were created.
    pub created: Vec<TableKind>,
    /// Tables that were found by name.
    pub existing: Vec<TableKind>,
}

#[derive(Debug, Deserialize)]
struct TableListing {
    name: String,
    table_id: String,
}

pub struct TableClient {
    base_url: String,
    settings: ClientSettings,
    http: UpstreamClient,
    /// Present when the settings carry app credentials; otherwise the
    /// proxy injects its own token.
    credentials: Option<CredentialProvider>,
    field_maps: DashMap<TableKind, FieldMap>,
}

impl TableClient {
    pub fn new(base_url: &str, settings: ClientSettings) -> Result<Self, AppError> {
        let http = UpstreamClient::new(30, 0)?;
        Ok(Self::with_parts(
            base_url,
            settings,
            http,
            TokenCache::new(CLIENT_MARGIN_SECS),
        ))
    }

    pub fn with_parts(
        base_url: &str,
        settings: ClientSettings,
        http: UpstreamClient,
        cache: TokenCache,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let credentials = (!settings.app_id.is_empty() && !settings.app_secret.is_empty())
            .then(|| {
                CredentialProvider::new(
                    base_url.clone(),
                    Some(settings.app_id.clone()),
                    Some(settings.app_secret.clone()),
                    http.clone(),
                    cache,
                )
            });

        Self {
            base_url,
            settings,
            http,
            credentials,
            field_maps: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn field_map(&self, kind: TableKind) -> Option<FieldMap> {
        self.field_maps.get(&kind).map(|m| m.clone())
    }

    pub fn set_field_map(&self, kind: TableKind, map: FieldMap) {
        self.field_maps.insert(kind, map);
    }

    /// `/open-apis/bitable/v1/apps/{app}`; the placeholder stands in for the
    /// sheet token when only the proxy knows it.
    fn app_path(&self) -> String {
        let app = if self.settings.sheet_token.is_empty() {
            SHEET_TOKEN_PLACEHOLDER
        } else {
            self.settings.sheet_token.as_str()
        };
        format!("/open-apis/bitable/v1/apps/{}", app)
    }

    fn table_path(&self, kind: TableKind) -> Result<String, AppError> {
        let table_id = self.settings.table_id(kind).ok_or_else(|| {
            AppError::Configuration(format!("{} table id is not configured; run setup first", kind))
        })?;
        Ok(format!("{}/tables/{}", self.app_path(), table_id))
    }

    /// One call through the proxy. A non-zero envelope code is a failure
    /// regardless of HTTP status.
    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, AppError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(creds) = &self.credentials {
            let token = creds.token().await?;
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| AppError::Internal(anyhow::anyhow!("token is not a valid header: {}", e)))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let payload = body
            .map(|b| serde_json::to_vec(&b))
            .transpose()
            .map_err(|e| AppError::Internal(e.into()))?;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(
            "{}",
            transform::redact(&format!("[{}] {}", method, url), Some(self.settings.sheet_token.as_str()))
        );
        let resp = self.http.send(method, &url, headers, payload).await?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AppError::Proxy(format!("response body read failed: {}", upstream::body_error(e))))?;

        let envelope: Envelope =
            serde_json::from_str(&text).map_err(|_| AppError::MalformedUpstream {
                status: status.as_u16(),
                excerpt: transform::excerpt(&text),
            })?;
        if envelope.code == TOKEN_INVALID_CODE {
            if let Some(creds) = &self.credentials {
                creds.invalidate().await;
            }
        }
        envelope.into_result()
    }

    /// All records of one table in a single call. No pagination.
    pub async fn list(&self, kind: TableKind) -> Result<Vec<Record>, AppError> {
        let path = format!("{}/records", self.table_path(kind)?);
        let data = self.call(reqwest::Method::GET, &path, None).await?;

        let items = data
            .as_ref()
            .and_then(|d| d.get("items"))
            .and_then(Value::as_array);
        let Some(items) = items else {
            return Ok(Vec::new());
        };

        items
            .iter()
            .map(|item| {
                serde_json::from_value(item.clone())
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("unexpected record shape: {}", e)))
            })
            .collect()
    }

    pub async fn create(
        &self,
        kind: TableKind,
        fields: Map<String, Value>,
    ) -> Result<Record, AppError> {
        let path = format!("{}/records", self.table_path(kind)?);
        let fields = translate(self.field_map(kind).as_ref(), fields);
        let data = self
            .call(reqwest::Method::POST, &path, Some(json!({ "fields": fields })))
            .await?;
        record_from(data)
    }

    pub async fn update(
        &self,
        kind: TableKind,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, AppError> {
        let path = format!("{}/records/{}", self.table_path(kind)?, record_id);
        let fields = translate(self.field_map(kind).as_ref(), fields);
        let data = self
            .call(reqwest::Method::PUT, &path, Some(json!({ "fields": fields })))
            .await?;
        record_from(data)
    }

    /// Deleting an absent record surfaces whatever the service answers.
    pub async fn delete(&self, kind: TableKind, record_id: &str) -> Result<(), AppError> {
        let path = format!("{}/records/{}", self.table_path(kind)?, record_id);
        self.call(reqwest::Method::DELETE, &path, None).await?;
        Ok(())
    }

    /// Replaces each configured table's field map with a fresh listing.
    pub async fn refresh_field_maps(&self) -> Result<(), AppError> {
        for kind in TableKind::ALL {
            let Ok(table_path) = self.table_path(kind) else {
                continue;
            };
            let data = self
                .call(reqwest::Method::GET, &format!("{}/fields", table_path), None)
                .await?;
            if let Some(items) = data.as_ref().and_then(|d| d.get("items")).and_then(Value::as_array) {
                let map = FieldMap::from_items(items);
                tracing::debug!(table = %kind, fields = map.len(), "field map refreshed");
                self.field_maps.insert(kind, map);
            }
        }
        Ok(())
    }

    /// Finds or creates the three tables, records their ids in the
    /// settings and loads the field maps. The caller persists the settings.
    pub async fn setup(&mut self) -> Result<SetupReport, AppError> {
        if self.settings.app_id.is_empty() != self.settings.app_secret.is_empty() {
            return Err(AppError::Configuration(
                "app id and app secret must be set together".into(),
            ));
        }

        if let Some(creds) = &self.credentials {
            creds.token().await.map_err(classify_token_error)?;
        }

        let tables_path = format!("{}/tables", self.app_path());
        let data = self
            .call(reqwest::Method::GET, &tables_path, None)
            .await
            .map_err(classify_table_error)?;
        let listed: Vec<TableListing> = data
            .as_ref()
            .and_then(|d| d.get("items"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|t| serde_json::from_value(t.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut report = SetupReport::default();
        for kind in TableKind::ALL {
            let table_id = match listed.iter().find(|t| t.name == kind.display_name()) {
                Some(t) => {
                    report.existing.push(kind);
                    t.table_id.clone()
                }
                None => {
                    let id = self.create_table(kind).await?;
                    tracing::info!(table = %kind, table_id = %id, "created table");
                    report.created.push(kind);
                    id
                }
            };
            self.settings.set_table_id(kind, table_id);
        }

        self.refresh_field_maps().await?;
        Ok(report)
    }

    async fn create_table(&self, kind: TableKind) -> Result<String, AppError> {
        let body = json!({
            "table": {
                "name": kind.display_name(),
                "default_view_name": DEFAULT_VIEW_NAME,
                "fields": kind.schema(),
            }
        });
        let data = self
            .call(
                reqwest::Method::POST,
                &format!("{}/tables", self.app_path()),
                Some(body),
            )
            .await?;

        data.as_ref()
            .and_then(|d| {
                d.pointer("/table/table_id")
                    .or_else(|| d.get("table_id"))
                    .and_then(Value::as_str)
            })
            .map(String::from)
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "create table '{}' returned no table id",
                    kind.display_name()
                ))
            })
    }
}

fn record_from(data: Option<Value>) -> Result<Record, AppError> {
    let record = data
        .and_then(|mut d| d.get_mut("record").map(Value::take))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("response carried no record")))?;
    serde_json::from_value(record)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("unexpected record shape: {}", e)))
}

/// Remaps credential-exchange failures with known codes to a clearer message.
pub fn classify_token_error(err: AppError) -> AppError {
    let msg = err.message();
    if msg.contains("99991663") || msg.contains("invalid") {
        return AppError::UpstreamAuth("App ID or App Secret is incorrect".into());
    }
    match err {
        AppError::Configuration(_) | AppError::UpstreamAuth(_) => err,
        other => AppError::UpstreamAuth(format!("failed to obtain access token: {}", other.message())),
    }
}

/// Remaps table-listing failures with known codes to a clearer message.
pub fn classify_table_error(err: AppError) -> AppError {
    let msg = err.message();
    if msg.contains("99991400") || msg.contains("not found") {
        return AppError::UpstreamNotFoundOrForbidden(
            "sheet token is incorrect or not accessible".into(),
        );
    }
    if msg.contains("99991668") || msg.contains("permission") {
        return AppError::UpstreamNotFoundOrForbidden(
            "no permission to access the table collection; check the app's permissions".into(),
        );
    }
    err
}
