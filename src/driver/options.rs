use std::env;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::constants::{defaults, envvars};
use crate::helpers::rand_hex;
use crate::interfaces::mqtt::ConnectOptions;

const RAND_SERVICE_ID_BYTES: usize = 4;

/// Options resolved once from the process environment
pub static DRIVER_OPTIONS: Lazy<DriverOptions> = Lazy::new(DriverOptions::from_env);

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub service_id: String,
    pub client_id_prefix: String,
    pub connect: ConnectOptions,
    pub sink_queue_size: usize,
    pub sink_send_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            service_id: rand_hex(RAND_SERVICE_ID_BYTES),
            client_id_prefix: defaults::CLIENT_ID_PREFIX.to_string(),
            connect: ConnectOptions::default(),
            sink_queue_size: defaults::SINK_QUEUE_SIZE,
            sink_send_timeout: Duration::from_millis(defaults::SINK_SEND_TIMEOUT_MS),
        }
    }
}

impl DriverOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(service_id) = env::var(envvars::DRIVER_SERVICE_ID) {
            if !service_id.is_empty() {
                options.service_id = service_id;
            }
        }
        options.sink_queue_size =
            env_parse(envvars::SINK_QUEUE_SIZE).unwrap_or(defaults::SINK_QUEUE_SIZE);
        options.sink_send_timeout = Duration::from_millis(
            env_parse(envvars::SINK_SEND_TIMEOUT_MS).unwrap_or(defaults::SINK_SEND_TIMEOUT_MS),
        );
        options
    }

    pub fn client_id(&self) -> String {
        format!("{}_{}", self.client_id_prefix, self.service_id)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid value '{}' for {}", raw, name);
            None
        }
    }
}
