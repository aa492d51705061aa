//! Inheritance between configuration layers
//!
//! `merge` folds an enclosing layer into a more specific one. It is additive only: a value
//! that is already set is never replaced, and a tag is only taken over when its id is not
//! yet present. Merging the same layer twice has no further effect.

use std::collections::HashSet;

use super::model::{Device, DeviceTag, DriverConfig, Settings, Table};
use super::ConfigError;

fn inherit(slot: &mut Option<String>, enclosing: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(enclosing);
    }
}

impl Settings {
    pub fn merge(&mut self, other: Option<&Settings>) {
        let Some(other) = other else {
            return;
        };
        inherit(&mut self.server, &other.server);
        inherit(&mut self.username, &other.username);
        inherit(&mut self.password, &other.password);
        inherit(&mut self.topic, &other.topic);
        inherit(&mut self.parse_script, &other.parse_script);
        inherit(&mut self.command_script, &other.command_script);
        inherit(&mut self.custom_device_id, &other.custom_device_id);
    }
}

impl DriverConfig {
    pub fn merge(&mut self, other: Option<&DriverConfig>) {
        let Some(other) = other else {
            return;
        };

        if let Some(enclosing) = &other.settings {
            self.settings
                .get_or_insert_with(Settings::default)
                .merge(Some(enclosing));
        }

        let tags = self.tags.get_or_insert_with(Vec::new);
        let mut seen: HashSet<String> = tags.iter().map(|t| t.tag.id.clone()).collect();
        for tag in other.tags.iter().flatten() {
            if seen.insert(tag.tag.id.clone()) {
                tags.push(tag.clone());
            }
        }
    }
}

impl Table {
    /// Fold the driver-instance layer into this table's own layer
    pub fn inherit(&mut self, instance: Option<&DriverConfig>) {
        if instance.is_none() {
            return;
        }
        self.config
            .get_or_insert_with(DriverConfig::default)
            .merge(instance);
    }
}

/// Effective configuration of one device after all layers have been merged
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedDevice {
    pub id: String,
    pub settings: Settings,
    pub tags: Vec<DeviceTag>,
}

impl ResolvedDevice {
    /// Identifier the transform script reports this device under
    pub fn custom_device_id(&self) -> &str {
        self.settings.custom_device_id.as_deref().unwrap_or(&self.id)
    }
}

impl Device {
    pub fn resolve(&self, table: Option<&DriverConfig>) -> Result<ResolvedDevice, ConfigError> {
        let mut config = self.config.clone().unwrap_or_default();
        config.merge(table);

        let mut settings = config.settings.ok_or_else(|| ConfigError::MissingSettings {
            device: self.id.clone(),
        })?;
        settings
            .custom_device_id
            .get_or_insert_with(|| self.id.clone());

        Ok(ResolvedDevice {
            id: self.id.clone(),
            settings,
            tags: config.tags.unwrap_or_default(),
        })
    }
}
