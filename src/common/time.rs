// SPDX-License-Identifier: MIT

use std::time::{SystemTime, UNIX_EPOCH};

/// Return the current UNIX timestamp in seconds.
pub fn current_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Return the current UNIX timestamp in milliseconds, as stored on
/// proposal records.
pub fn current_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
