use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Field name → service-assigned field id for one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap(HashMap<String, String>);

#[derive(Debug, Deserialize)]
struct FieldListing {
    field_name: String,
    #[serde(alias = "id")]
    field_id: String,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, id: impl Into<String>) {
        self.0.insert(name.into(), id.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds a map from the `items` of a field listing. Entries without a
    /// name or id are skipped.
    pub fn from_items(items: &[Value]) -> Self {
        let map = items
            .iter()
            .filter_map(|item| serde_json::from_value::<FieldListing>(item.clone()).ok())
            .map(|f| (f.field_name, f.field_id))
            .collect();
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Rewrites field names to field ids. Names the map doesn't know (or every
/// name, when there is no map yet) pass through unchanged.
pub fn translate(map: Option<&FieldMap>, fields: Map<String, Value>) -> Map<String, Value> {
    let Some(map) = map else {
        return fields;
    };

    fields
        .into_iter()
        .map(|(name, value)| match map.get(&name) {
            Some(id) => (id.to_string(), value),
            None => (name, value),
        })
        .collect()
}
