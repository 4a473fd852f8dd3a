//! Time source for emtrack
//!
//! Every time-gated check in the core (4-hour exposure minimum, 24-hour
//! incubation stage minimum) reads from a single injectable [`Clock`] so
//! tests can simulate elapsed duration without real waiting.

use chrono::{DateTime, Duration, Local};
use std::sync::Mutex;

/// Supplies the current instant. Read, never awaited.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Production clock backed by the system wall clock
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }

    /// Jump the clock to an absolute instant
    pub fn set(&self, to: DateTime<Local>) {
        let mut now = self.now.lock().unwrap();
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Local.with_ymd_and_hms(2023, 11, 23, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        assert_eq!(clock.now(), start);

        clock.advance(Duration::hours(4));
        assert_eq!(clock.now(), start + Duration::hours(4));

        clock.advance(Duration::minutes(30));
        assert_eq!(clock.now(), start + Duration::hours(4) + Duration::minutes(30));
    }

    #[test]
    fn manual_clock_set_absolute() {
        let start = Local.with_ymd_and_hms(2023, 11, 23, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        let later = Local.with_ymd_and_hms(2023, 11, 25, 12, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn system_clock_returns_time() {
        let t = SystemClock.now();
        assert!(t.timestamp() > 0);
    }
}
