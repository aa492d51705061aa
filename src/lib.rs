pub mod config;
pub mod constants;
pub mod data_mgmt;
pub mod driver;
pub mod helpers;
pub mod interfaces;
pub mod script;

pub use driver::{DriverOptions, DriverState, MqttDriver};
