pub const LOGGING_LEVEL: &str = "LOGGING_LEVEL";

pub const SNAP_COMMON: &str = "SNAP_COMMON";

pub const DRIVER_SERVICE_ID: &str = "DRIVER_SERVICE_ID";
pub const SINK_QUEUE_SIZE: &str = "SINK_QUEUE_SIZE";
pub const SINK_SEND_TIMEOUT_MS: &str = "SINK_SEND_TIMEOUT_MS";
