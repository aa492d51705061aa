use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::config::Tag;

/// One device entry produced by a transform script
///
/// Both members are optional on the wire so that the pipeline can tell a record without an
/// id apart from one without fields; each case is handled differently.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DeviceRecord {
    #[serde(default, deserialize_with = "id_from_scalar")]
    pub id: Option<String>,
    #[serde(default)]
    pub fields: Option<Map<String, Value>>,
}

impl DeviceRecord {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: Some(id.into()),
            fields: Some(fields),
        }
    }
}

/// A tag together with the value reported for it
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Field {
    pub tag: Tag,
    pub value: Value,
}

/// Timestamped set of tag values for one device, the unit handed to a sink
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Point {
    pub table: String,
    pub id: String,
    pub fields: Vec<Field>,
    /// Milliseconds since the epoch
    pub time: i64,
}

// Scripts commonly emit numeric device ids
fn id_from_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    Ok(id)
}
