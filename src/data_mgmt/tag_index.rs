//! Per-table lookup from device and payload key to platform tag
//!
//! Built once when a table is activated and read-only afterwards.

use ahash::AHashMap;
use itertools::Itertools;

use crate::config::{ResolvedDevice, Tag};

#[derive(Debug)]
pub struct DeviceTags {
    pub device_id: String,
    tags: AHashMap<String, Tag>,
}

impl DeviceTags {
    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.tags.get(key)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Tags of every routable device in a table
///
/// Devices are keyed by their platform id. A device whose `customDeviceId` differs from
/// its id can also be found under that custom id; platform ids take precedence.
#[derive(Debug, Default)]
pub struct TagIndex {
    devices: AHashMap<String, DeviceTags>,
    aliases: AHashMap<String, String>,
}

impl TagIndex {
    pub fn build(table_id: &str, devices: &[ResolvedDevice]) -> Self {
        if devices.is_empty() {
            log::warn!("Table '{}' has no devices; nothing will be routed", table_id);
        }

        let mut index = TagIndex::default();
        for device in devices {
            if device.tags.is_empty() {
                log::warn!(
                    "Device '{}' in table '{}' has no tags; its messages will be dropped",
                    device.id,
                    table_id
                );
                continue;
            }

            let mut tags = AHashMap::with_capacity(device.tags.len());
            for device_tag in &device.tags {
                if let Some(previous) = tags.insert(device_tag.key.clone(), device_tag.tag.clone())
                {
                    log::debug!(
                        "Key '{}' of device '{}' remapped from tag '{}' to '{}'",
                        device_tag.key,
                        device.id,
                        previous.id,
                        device_tag.tag.id
                    );
                }
            }

            log::debug!(
                "Table '{}': device '{}' indexed with keys [{}]",
                table_id,
                device.id,
                tags.keys().sorted().join(", ")
            );

            let custom_id = device.custom_device_id();
            if custom_id != device.id {
                index
                    .aliases
                    .insert(custom_id.to_string(), device.id.clone());
            }

            let entry = DeviceTags {
                device_id: device.id.clone(),
                tags,
            };
            if index.devices.insert(device.id.clone(), entry).is_some() {
                log::warn!(
                    "Table '{}': device id '{}' appears more than once; the last one is used",
                    table_id,
                    device.id
                );
            }
        }

        for (alias, device_id) in index.aliases.iter() {
            if index.devices.contains_key(alias) {
                log::warn!(
                    "Table '{}': custom id '{}' of device '{}' is also a device id; records for it go to that device",
                    table_id,
                    alias,
                    device_id
                );
            }
        }
        index
    }

    /// Look up a device by platform id, falling back to custom device ids
    pub fn device(&self, id: &str) -> Option<&DeviceTags> {
        self.devices.get(id).or_else(|| {
            self.aliases
                .get(id)
                .and_then(|device_id| self.devices.get(device_id))
        })
    }

    /// Platform device ids in sorted order
    pub fn device_ids(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).sorted().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
