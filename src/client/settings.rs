use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::table::TableKind;

pub const DEFAULT_SETTINGS_PATH: &str = "tablegate.json";

/// Everything the client remembers between runs, stored as one JSON
/// document. Table ids are filled in by setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub sheet_token: String,
    #[serde(default)]
    pub purchase_table_id: String,
    #[serde(default)]
    pub formula_table_id: String,
    #[serde(default)]
    pub sales_table_id: String,
}

impl ClientSettings {
    /// Reads the settings file; a missing file gives defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("invalid settings file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Replaces the credentials; all three must be non-empty.
    pub fn set_credentials(
        &mut self,
        app_id: &str,
        app_secret: &str,
        sheet_token: &str,
    ) -> anyhow::Result<()> {
        let (app_id, app_secret, sheet_token) = (app_id.trim(), app_secret.trim(), sheet_token.trim());
        if app_id.is_empty() || app_secret.is_empty() || sheet_token.is_empty() {
            anyhow::bail!("app id, app secret and sheet token are all required");
        }
        self.app_id = app_id.to_string();
        self.app_secret = app_secret.to_string();
        self.sheet_token = sheet_token.to_string();
        Ok(())
    }

    pub fn table_id(&self, kind: TableKind) -> Option<&str> {
        let id = match kind {
            TableKind::Purchase => &self.purchase_table_id,
            TableKind::Formula => &self.formula_table_id,
            TableKind::Sales => &self.sales_table_id,
        };
        (!id.is_empty()).then_some(id.as_str())
    }

    pub fn set_table_id(&mut self, kind: TableKind, id: impl Into<String>) {
        let slot = match kind {
            TableKind::Purchase => &mut self.purchase_table_id,
            TableKind::Formula => &mut self.formula_table_id,
            TableKind::Sales => &mut self.sales_table_id,
        };
        *slot = id.into();
    }

    pub fn has_tables(&self) -> bool {
        TableKind::ALL.iter().all(|k| self.table_id(*k).is_some())
    }
}

/// Settings path from TABLEGATE_SETTINGS, falling back to the default.
pub fn default_path() -> PathBuf {
    std::env::var("TABLEGATE_SETTINGS")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
}
