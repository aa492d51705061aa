use std::time::Duration;

use backoff::ExponentialBackoff;

/// Backoff used between broker reconnection attempts
///
/// Never gives up: `max_elapsed_time` is unset, so the delay simply saturates at `max_delay`.
pub fn reconnect_backoff(min_delay: Duration, max_delay: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: min_delay,
        initial_interval: min_delay,
        max_interval: max_delay,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}
