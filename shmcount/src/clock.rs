//! Wall-clock timestamps stored in the header as days since the Unix epoch

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds in one day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Current time in days since the Unix epoch.
pub fn now_days() -> f64 {
    system_time_to_days(SystemTime::now())
}

/// Convert a `SystemTime` to fractional days since the Unix epoch.
///
/// Times before the epoch yield negative values.
pub fn system_time_to_days(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64() / SECONDS_PER_DAY,
        Err(before) => -before.duration().as_secs_f64() / SECONDS_PER_DAY,
    }
}

/// Convert fractional days since the Unix epoch back to a `SystemTime`.
///
/// Returns `None` for non-finite values or values outside the platform's
/// representable range.
pub fn days_to_system_time(days: f64) -> Option<SystemTime> {
    if !days.is_finite() {
        return None;
    }
    let offset = Duration::try_from_secs_f64(days.abs() * SECONDS_PER_DAY).ok()?;
    if days >= 0.0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    }
}
