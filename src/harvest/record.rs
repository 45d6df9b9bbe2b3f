//! Lenient representation of one upstream catalog record.
//!
//! Nothing in the upstream JSON is guaranteed present or correctly typed, so
//! identifiers and bounds are kept as raw [`Value`]s and free-text fields are
//! coerced to strings when they are scalars. List fields that are not arrays
//! are treated as absent, and list elements that are not objects are dropped.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One upstream catalog record, as fetched for a single source ID.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCatalogRecord {
    #[serde(default)]
    pub manufacturer_id: Value,
    #[serde(default)]
    pub product_type_id: Value,
    #[serde(default)]
    pub product_id: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub manual_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub inclusion_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub exclusion_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub image: Option<String>,
    /// Frequency/region tag, e.g. `"Europe"`.
    #[serde(default, deserialize_with = "lenient_text")]
    pub frequency_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub association_groups: Vec<RawAssociationGroup>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub configuration_parameters: Vec<RawParameter>,
}

impl RawCatalogRecord {
    /// Parses a fetched body. Anything that is not a JSON object fails.
    /// Arrays are rejected here; the derived visitor would otherwise map them
    /// positionally onto the fields.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<Value>(body)? {
            object @ Value::Object(_) => serde_json::from_value(object),
            other => Err(de::Error::invalid_type(unexpected(&other), &"a catalog record object")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawAssociationGroup {
    #[serde(default)]
    pub group_number: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
}

/// Configuration parameter descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawParameter {
    #[serde(default)]
    pub parameter_number: Value,
    #[serde(default)]
    pub size: Value,
    #[serde(default)]
    pub default_value: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub configuration_parameter_values: Vec<RawValueRange>,
}

impl RawParameter {
    pub fn ranges(&self) -> &[RawValueRange] {
        &self.configuration_parameter_values
    }
}

/// Labeled value range of a parameter. `From`/`To` may be strings or numbers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawValueRange {
    #[serde(default)]
    pub from: Value,
    #[serde(default)]
    pub to: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
}

fn unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Null => de::Unexpected::Unit,
        Value::Bool(flag) => de::Unexpected::Bool(*flag),
        Value::Number(_) => de::Unexpected::Other("number"),
        Value::String(text) => de::Unexpected::Str(text),
        Value::Array(_) => de::Unexpected::Seq,
        Value::Object(_) => de::Unexpected::Map,
    }
}

/// Textual form of a scalar, `None` for null, arrays and objects.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_text(&value))
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}
