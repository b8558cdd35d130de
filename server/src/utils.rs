use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current wall-clock timestamp in milliseconds, for state broadcasts.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
