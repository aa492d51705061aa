//! The MQTT driver: one broker connection shared by every table of a driver instance

mod lifecycle;
mod options;
mod subscription;

pub use lifecycle::{DriverError, DriverState, MqttDriver};
pub use options::{DriverOptions, DRIVER_OPTIONS};
pub use subscription::{SubscriptionError, TableSubscription};

/// Capability document returned by [`MqttDriver::schema`]
pub const SCHEMA: &str = include_str!("../../resources/schema/driver.schema.json");
