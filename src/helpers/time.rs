use chrono::Utc;

/// Wall-clock time in milliseconds, truncated to whole seconds
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp() * 1000
}
