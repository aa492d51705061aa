use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Transport and script settings; every field may be inherited from an enclosing level
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_device_id: Option<String>,
}

/// Platform tag descriptor
///
/// Only `id` is interpreted by the driver; everything else is carried through to the sink.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Tag {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Tag plus the key under which its value appears in a transformed payload
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DeviceTag {
    pub key: String,
    #[serde(flatten)]
    pub tag: Tag,
}

/// One configuration layer (instance, table or device)
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DriverConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<DeviceTag>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Device {
    pub id: String,
    #[serde(default, alias = "device", skip_serializing_if = "Option::is_none")]
    pub config: Option<DriverConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Table {
    pub id: String,
    #[serde(default, alias = "device", skip_serializing_if = "Option::is_none")]
    pub config: Option<DriverConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub devices: Vec<Device>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverInstanceConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub driver_type: String,
    #[serde(default, alias = "device", skip_serializing_if = "Option::is_none")]
    pub config: Option<DriverConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tables: Vec<Table>,
}

impl DriverInstanceConfig {
    pub fn settings(&self) -> Option<&Settings> {
        self.config.as_ref().and_then(|c| c.settings.as_ref())
    }
}

impl Table {
    pub fn settings(&self) -> Option<&Settings> {
        self.config.as_ref().and_then(|c| c.settings.as_ref())
    }

    /// Topic filter, if one is configured and non-empty
    pub fn topic(&self) -> Option<&str> {
        self.settings()
            .and_then(|s| s.topic.as_deref())
            .filter(|t| !t.is_empty())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
