use std::time::Duration;

pub const LOG_LEVEL: &str = "INFO";

pub const MQTT_PORT: u16 = 1883;
pub const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const MQTT_REQUEST_CAPACITY: usize = 10;
pub const CLIENT_ID_PREFIX: &str = "mqtt_driver";

pub const RECONNECT_MIN_DELAY: Duration = Duration::from_secs(1);
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(120);

pub const SINK_QUEUE_SIZE: usize = 1024;
pub const SINK_SEND_TIMEOUT_MS: u64 = 1000;
