use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Location of one document in the remote store, e.g. `Reviews/<content id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The per-content review document
    pub fn reviews(content_id: &str) -> Self {
        Self(format!("Reviews/{}", content_id))
    }

    /// The per-user document holding history/library sequences
    pub fn user(user_id: &str) -> Self {
        Self(format!("Users/{}", user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One typed value in the store's wire encoding.
///
/// Mirrors the tagged shape the store delivers (`{"stringValue": "..."}`,
/// `{"mapValue": {"fields": {...}}}`), so a raw revision deserializes directly
/// without going through untyped lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    StringValue(String),
    BooleanValue(bool),
    IntegerValue(String), // The store encodes 64-bit integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    NullValue(()),
    MapValue(MapValue),
    ArrayValue(ArrayValue),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<FieldValue>,
}

impl FieldValue {
    pub fn string(value: impl Into<String>) -> Self {
        FieldValue::StringValue(value.into())
    }

    pub fn timestamp(value: impl Into<String>) -> Self {
        FieldValue::TimestampValue(value.into())
    }

    pub fn map(fields: Fields) -> Self {
        FieldValue::MapValue(MapValue { fields })
    }

    pub fn string_array<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::ArrayValue(ArrayValue {
            values: values.into_iter().map(|v| FieldValue::StringValue(v.into())).collect(),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::StringValue(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::BooleanValue(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&str> {
        match self {
            FieldValue::TimestampValue(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            FieldValue::MapValue(m) => Some(&m.fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::ArrayValue(a) => Some(&a.values),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::NullValue(()))
    }

    /// Merge `other` into this value: maps merge key by key, anything else is replaced
    pub fn merge(&mut self, other: FieldValue) {
        match (self, other) {
            (FieldValue::MapValue(existing), FieldValue::MapValue(incoming)) => {
                for (key, value) in incoming.fields.0 {
                    existing.fields.insert(key, value);
                }
            }
            (slot, other) => *slot = other,
        }
    }
}

/// Ordered field mapping.
///
/// Keeps the delivery order of the source document, which is what "raw-key
/// order" means for records without a timestamp.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FieldValue> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Replace the value in place when the key exists, otherwise append it
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for Fields {
    fn from_iter<T: IntoIterator<Item = (K, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = Fields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of typed field values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                // Duplicate keys are kept; consumers decide which occurrence wins
                while let Some((key, value)) = access.next_entry::<String, FieldValue>()? {
                    entries.push((key, value));
                }
                Ok(Fields(entries))
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// One complete, point-in-time value of a remote document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteDocument {
    #[serde(default)]
    pub fields: Fields,
}

impl RemoteDocument {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_keep_delivery_order() {
        let json = r#"{"fields": {
            "zeta": {"stringValue": "z"},
            "alpha": {"booleanValue": true},
            "mid": {"nullValue": null}
        }}"#;
        let doc: RemoteDocument = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = doc.fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(doc.fields.get("alpha").and_then(|v| v.as_bool()), Some(true));
        assert!(doc.fields.get("mid").unwrap().is_null());
    }

    #[test]
    fn test_nested_map_and_array() {
        let json = r#"{"fields": {
            "history": {"mapValue": {"fields": {
                "series": {"arrayValue": {"values": [{"stringValue": "1399"}, {"stringValue": "66732"}]}}
            }}},
            "storeHistory": {"booleanValue": false}
        }}"#;
        let doc: RemoteDocument = serde_json::from_str(json).unwrap();
        let series = doc
            .fields
            .get("history")
            .and_then(|v| v.as_map())
            .and_then(|m| m.get("series"))
            .and_then(|v| v.as_array())
            .unwrap();
        let ids: Vec<&str> = series.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(ids, vec!["1399", "66732"]);
    }

    #[test]
    fn test_empty_array_value_has_no_values() {
        let value: FieldValue = serde_json::from_str(r#"{"arrayValue": {}}"#).unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(0));
    }

    #[test]
    fn test_merge_maps_key_by_key() {
        let mut record = FieldValue::map(Fields::from_iter([
            ("review", FieldValue::string("old")),
            ("isEdited", FieldValue::BooleanValue(false)),
        ]));
        record.merge(FieldValue::map(Fields::from_iter([
            ("review", FieldValue::string("new")),
            ("isEdited", FieldValue::BooleanValue(true)),
        ])));
        let fields = record.as_map().unwrap();
        assert_eq!(fields.get("review").and_then(|v| v.as_str()), Some("new"));
        assert_eq!(fields.get("isEdited").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut fields = Fields::from_iter([
            ("a", FieldValue::string("1")),
            ("b", FieldValue::string("2")),
        ]);
        fields.insert("a", FieldValue::string("3"));
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(fields.get("a").and_then(|v| v.as_str()), Some("3"));
        assert!(fields.remove("a").is_some());
        assert!(!fields.contains_key("a"));
    }
}
