//! Schema types and inference.
//!
//! A [`SchemaFragment`] maps each column to a nullable JSON-schema type
//! declaration. Every declaration admits `null`; inference never produces a
//! non-nullable column.

pub mod inference;
pub mod normalize;

pub use inference::{GuessedType, detect_header, guess_column_types, infer_schema};
pub use normalize::{header_set, samples_to_table};

use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{
    SDC_EXTRA_COLUMN, SDC_SOURCE_BUCKET_COLUMN, SDC_SOURCE_FILE_COLUMN, SDC_SOURCE_LINENO_COLUMN,
};

/// Type declaration for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSchema {
    /// `{"type": ["null", "string"], "format": "date-time"}`
    DateTime,
    /// `{"type": ["null", "string"]}`
    String,
    /// `{"type": ["null", "integer"]}`
    Integer,
    /// `{"type": ["null", "number"]}`
    Number,
}

impl ColumnSchema {
    /// The JSON-schema primitive type name.
    pub fn json_type(self) -> &'static str {
        match self {
            ColumnSchema::DateTime | ColumnSchema::String => "string",
            ColumnSchema::Integer => "integer",
            ColumnSchema::Number => "number",
        }
    }

    /// The JSON-schema `format`, if any.
    pub fn format(self) -> Option<&'static str> {
        match self {
            ColumnSchema::DateTime => Some("date-time"),
            _ => None,
        }
    }

    /// Render as a JSON-schema value.
    pub fn to_json(self) -> Value {
        match self.format() {
            Some(format) => json!({"type": ["null", self.json_type()], "format": format}),
            None => json!({"type": ["null", self.json_type()]}),
        }
    }
}

impl Serialize for ColumnSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let format = self.format();
        let mut map = serializer.serialize_map(Some(if format.is_some() { 2 } else { 1 }))?;
        map.serialize_entry("type", &["null", self.json_type()])?;
        if let Some(format) = format {
            map.serialize_entry("format", format)?;
        }
        map.end()
    }
}

/// Column name to type declaration, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaFragment {
    columns: IndexMap<String, ColumnSchema>,
}

impl SchemaFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, schema: ColumnSchema) {
        self.columns.insert(column.into(), schema);
    }

    pub fn get(&self, column: &str) -> Option<ColumnSchema> {
        self.columns.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnSchema)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, ColumnSchema)> for SchemaFragment {
    fn from_iter<I: IntoIterator<Item = (String, ColumnSchema)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// The full JSON schema of a stream: inferred columns followed by the
/// `_sdc_*` metadata columns added at extraction time.
///
/// Metadata columns win over inferred columns of the same name.
pub fn stream_schema(fragment: &SchemaFragment) -> Value {
    let mut properties: IndexMap<String, Value> = fragment
        .iter()
        .map(|(column, schema)| (column.to_string(), schema.to_json()))
        .collect();

    properties.insert(
        SDC_SOURCE_BUCKET_COLUMN.to_string(),
        json!({"type": "string"}),
    );
    properties.insert(SDC_SOURCE_FILE_COLUMN.to_string(), json!({"type": "string"}));
    properties.insert(
        SDC_SOURCE_LINENO_COLUMN.to_string(),
        json!({"type": "integer"}),
    );
    properties.insert(
        SDC_EXTRA_COLUMN.to_string(),
        json!({"type": "array", "items": {"type": "string"}}),
    );

    json!({"type": "object", "properties": properties})
}

/// Primitive types a stream schema property admits, read back from JSON.
///
/// Used at extraction time, where the schema comes from a catalog that may
/// have been edited by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PropertyTypes {
    #[serde(rename = "type", default, deserialize_with = "one_or_many")]
    pub types: Vec<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl PropertyTypes {
    /// Read the declared types of `column` from a stream schema.
    pub fn of(schema: &Value, column: &str) -> Self {
        schema
            .get("properties")
            .and_then(|properties| properties.get(column))
            .and_then(|property| serde_json::from_value(property.clone()).ok())
            .unwrap_or_default()
    }

    pub fn admits(&self, json_type: &str) -> bool {
        self.types.iter().any(|t| t == json_type)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(t) => vec![t],
        OneOrMany::Many(ts) => ts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_schema_serialization() {
        assert_eq!(
            serde_json::to_value(ColumnSchema::DateTime).unwrap(),
            json!({"type": ["null", "string"], "format": "date-time"})
        );
        assert_eq!(
            serde_json::to_value(ColumnSchema::Integer).unwrap(),
            json!({"type": ["null", "integer"]})
        );
        assert_eq!(
            serde_json::to_value(ColumnSchema::Number).unwrap(),
            ColumnSchema::Number.to_json()
        );
    }

    #[test]
    fn test_fragment_preserves_column_order() {
        let fragment: SchemaFragment = [
            ("z".to_string(), ColumnSchema::String),
            ("a".to_string(), ColumnSchema::Integer),
        ]
        .into_iter()
        .collect();

        let text = serde_json::to_string(&fragment).unwrap();
        assert_eq!(
            text,
            r#"{"z":{"type":["null","string"]},"a":{"type":["null","integer"]}}"#
        );
    }

    #[test]
    fn test_stream_schema_appends_metadata_columns() {
        let mut fragment = SchemaFragment::new();
        fragment.insert("id", ColumnSchema::Integer);
        fragment.insert(SDC_EXTRA_COLUMN, ColumnSchema::String);

        let schema = stream_schema(&fragment);
        let properties = schema["properties"].as_object().unwrap();
        let keys: Vec<&str> = properties.keys().map(String::as_str).collect();

        assert_eq!(
            keys,
            vec![
                "id",
                SDC_EXTRA_COLUMN,
                SDC_SOURCE_BUCKET_COLUMN,
                SDC_SOURCE_FILE_COLUMN,
                SDC_SOURCE_LINENO_COLUMN,
            ]
        );
        assert_eq!(properties[SDC_EXTRA_COLUMN]["type"], "array");
    }

    #[test]
    fn test_property_types_reads_single_and_list() {
        let schema = json!({"properties": {
            "a": {"type": ["null", "integer"]},
            "b": {"type": "string", "format": "date-time"}
        }});

        assert!(PropertyTypes::of(&schema, "a").admits("integer"));
        let b = PropertyTypes::of(&schema, "b");
        assert!(b.admits("string"));
        assert_eq!(b.format.as_deref(), Some("date-time"));
        assert!(PropertyTypes::of(&schema, "missing").types.is_empty());
    }
}
