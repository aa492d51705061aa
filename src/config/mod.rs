//! Layered driver configuration
//!
//! The configuration document carries settings and tags at three levels: the driver
//! instance, each table, and each device within a table. The more specific level always
//! wins; anything it leaves unset is inherited from the enclosing level (see [`merge`]).

mod merge;
mod model;

use thiserror::Error;

pub use merge::ResolvedDevice;
pub use model::{Device, DeviceTag, DriverConfig, DriverInstanceConfig, Settings, Table, Tag};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("device '{device}' has no settings at any configuration level")]
    MissingSettings { device: String },
    #[error("no broker address in driver instance settings")]
    MissingServer,
}

pub fn from_str(config_raw: &str) -> Result<DriverInstanceConfig, ConfigError> {
    serde_json::from_str::<DriverInstanceConfig>(config_raw).map_err(Into::into)
}
