use super::identity::IdentityKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type FieldMap = BTreeMap<String, FieldValue>;

/// An extracted value. Absent values are `Text("")`, never a missing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<FieldMap>),
    Nested(FieldMap),
}

impl FieldValue {
    pub fn empty() -> Self {
        FieldValue::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Nested(map) => map.is_empty(),
            FieldValue::Integer(_) | FieldValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldMap]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Whether the pre-extraction interaction was confirmed by re-classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verification {
    Confirmed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub identity: IdentityKey,
    pub collection: String,
    pub unit: String,
    pub fields: FieldMap,
    pub failed_fields: Vec<String>,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    /// Metadata of the seed the unit came from, e.g. year or listed price.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seed: BTreeMap<String, serde_json::Value>,
    pub scraped_at: DateTime<Utc>,
}

impl ExtractedRecord {
    pub fn new(identity: IdentityKey, collection: &str, unit: &str) -> Self {
        Self {
            identity,
            collection: collection.to_string(),
            unit: unit.to_string(),
            fields: FieldMap::new(),
            failed_fields: Vec::new(),
            degraded: false,
            verification: None,
            seed: BTreeMap::new(),
            scraped_at: Utc::now(),
        }
    }

    pub fn set(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    /// Record `name` as the empty sentinel and note the failure.
    pub fn fail(&mut self, name: &str) {
        self.fields.insert(name.to_string(), FieldValue::empty());
        self.note_failure(name);
    }

    /// Note a failure without touching the field, e.g. `colors.price`.
    pub fn note_failure(&mut self, name: &str) {
        if !self.failed_fields.iter().any(|f| f == name) {
            self.failed_fields.push(name.to_string());
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_field_is_empty_string_in_json() {
        let mut record = ExtractedRecord::new(IdentityKey::of(&Default::default()), "trims", "Civic");
        record.set("name", FieldValue::Text("Sport".into()));
        record.set("price", FieldValue::Number(24990.0));
        record.fail("image");
        record.fail("image");

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["fields"]["image"], json!(""));
        assert_eq!(value["fields"]["price"], json!(24990.0));
        assert_eq!(value["failed_fields"], json!(["image"]));
        assert!(value.get("verification").is_none());
        assert!(value.get("seed").is_none());
    }

    #[test]
    fn nested_lists_serialize_as_arrays_of_objects() {
        let item = FieldMap::from([("color".to_string(), FieldValue::Text("Red".into()))]);
        let value = serde_json::to_value(FieldValue::List(vec![item])).unwrap();
        assert_eq!(value, json!([{ "color": "Red" }]));
    }
}
