use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of a table. The upstream service owns it; clients only hold
/// transient copies that are replaced wholesale on every reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "record_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Numeric field, 0 when absent or not a number.
    pub fn num_field(&self, name: &str) -> f64 {
        self.fields.get(name).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Date field as epoch milliseconds.
    pub fn millis_field(&self, name: &str) -> Option<i64> {
        let v = self.fields.get(name)?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }
}
