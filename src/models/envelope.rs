use serde::Deserialize;
use serde_json::Value;

use crate::errors::AppError;

/// `{code, msg?, data?}` wrapper around every table-service answer.
/// `code` is the application-level status and is independent of HTTP status.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    /// Turns a non-zero `code` into [`AppError::Application`].
    pub fn into_result(self) -> Result<Option<Value>, AppError> {
        if self.code != 0 {
            return Err(AppError::Application {
                code: self.code,
                msg: self
                    .msg
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "API request failed".to_string()),
            });
        }
        Ok(self.data)
    }
}
