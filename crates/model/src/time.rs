use std::time::{SystemTime, UNIX_EPOCH};

/// The wall clock, truncated to whole seconds since the unix epoch.
pub fn now_in_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("now earlier than epoch")
        .as_secs()
}
