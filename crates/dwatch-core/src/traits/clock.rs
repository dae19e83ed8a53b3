// # Clock Trait
//
// The engine is purely reactive: it never reads the system time directly.
// Each tick takes one snapshot from the injected clock and uses it for
// scheduling, categorization and reporting.

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now_utc(&self) -> DateTime<Utc>;

    /// Local wall-clock time of `now` as `HH:MM`
    fn local_hhmm(&self, now: DateTime<Utc>) -> String;
}

/// System clock in the host's local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hhmm(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&Local).format("%H:%M").to_string()
    }
}

/// A clock frozen at one instant with a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    offset: FixedOffset,
}

impl FixedClock {
    /// Frozen at `now`, local time equal to UTC
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            offset: Utc.fix(),
        }
    }

    /// Use a local time zone `offset_secs` east of UTC
    pub fn with_offset_secs(mut self, offset_secs: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(offset_secs) {
            self.offset = offset;
        }
        self
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }

    fn local_hhmm(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset).format("%H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_formats_local_time() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 7, 5, 0).unwrap();
        let clock = FixedClock::new(now);
        assert_eq!(clock.local_hhmm(clock.now_utc()), "07:05");

        let shifted = clock.with_offset_secs(2 * 3600);
        assert_eq!(shifted.local_hhmm(shifted.now_utc()), "09:05");
    }
}
