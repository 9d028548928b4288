//! Translation between the monotonic clock and wall-clock time.
//!
//! Registries stamp entries with [`Instant`]s. Wall-clock time only appears
//! at the edges: the persisted snapshot stores unix milliseconds and the
//! traffic records carry a UTC time of day.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Timelike, Utc};

/// Convert a `SystemTime` to an `Instant`.
///
/// This is approximate since `Instant` doesn't have a fixed epoch.
/// Returns `None` if the resulting instant would underflow the monotonic
/// clock. Future times map to now.
///
/// # Example
///
/// ```
/// use std::time::SystemTime;
/// use glidecloud::time::system_time_to_instant;
///
/// let seen = SystemTime::now();
/// if let Some(instant) = system_time_to_instant(seen) {
///     println!("Seen {:?} ago", instant.elapsed());
/// }
/// ```
pub fn system_time_to_instant(system_time: SystemTime) -> Option<Instant> {
    WallClock::now().to_instant(system_time)
}

/// Convert an `Instant` to the wall-clock time it corresponds to.
pub fn instant_to_system_time(instant: Instant) -> SystemTime {
    WallClock::now().to_system_time(instant)
}

/// A matched pair of monotonic and wall-clock readings.
///
/// Converting a batch of stamps against one pair keeps their relative
/// spacing exact.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    instant: Instant,
    system: SystemTime,
}

impl WallClock {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            system: SystemTime::now(),
        }
    }

    pub fn instant(&self) -> Instant {
        self.instant
    }

    pub fn to_system_time(&self, instant: Instant) -> SystemTime {
        if instant <= self.instant {
            self.system - (self.instant - instant)
        } else {
            self.system + (instant - self.instant)
        }
    }

    pub fn to_instant(&self, system_time: SystemTime) -> Option<Instant> {
        match self.system.duration_since(system_time) {
            Ok(elapsed) => self.instant.checked_sub(elapsed),
            Err(_) => Some(self.instant),
        }
    }

    /// Milliseconds since the unix epoch for `instant`.
    pub fn to_unix_millis(&self, instant: Instant) -> i64 {
        unix_millis(self.to_system_time(instant))
    }

    /// Inverse of [`to_unix_millis`](Self::to_unix_millis).
    pub fn from_unix_millis(&self, millis: i64) -> Option<Instant> {
        let system = if millis >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_millis(millis as u64))?
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_millis(millis.unsigned_abs()))?
        };
        self.to_instant(system)
    }
}

/// Milliseconds since the unix epoch, negative before it.
pub fn unix_millis(system_time: SystemTime) -> i64 {
    match system_time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis().min(i64::MAX as u128) as i64,
        Err(e) => -(e.duration().as_millis().min(i64::MAX as u128) as i64),
    }
}

/// Milliseconds since UTC midnight.
pub fn time_of_day_ms(system_time: SystemTime) -> u32 {
    let utc: DateTime<Utc> = system_time.into();
    utc.num_seconds_from_midnight() * 1000 + utc.timestamp_subsec_millis().min(999)
}
