//! Interval gate deciding whether a low-frequency sink is due.
//!
//! Gates fire on the first reading at or after their interval has elapsed
//! since the previous firing, not on a wall-clock grid. State is in-memory
//! only, so every gate fires on the first reading after a restart.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

// ---

/// A named interval and its period in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub name: &'static str,
    pub minutes: i64,
}

pub const LIVE: Interval = Interval {
    name: "60sec",
    minutes: 1,
};
pub const FIVE_MINUTES: Interval = Interval {
    name: "5min",
    minutes: 5,
};
pub const TWENTY_FIVE_MINUTES: Interval = Interval {
    name: "25min",
    minutes: 25,
};
pub const FIFTY_MINUTES: Interval = Interval {
    name: "50min",
    minutes: 50,
};
pub const SIX_HOURS: Interval = Interval {
    name: "6hour",
    minutes: 360,
};

/// Last firing instant per interval name. A name that never fired is absent.
#[derive(Debug, Default)]
pub struct IntervalGate {
    last_fired: HashMap<String, DateTime<Utc>>,
}

impl IntervalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `name` against the current wall clock.
    pub fn check(&mut self, name: &str, minutes: i64) -> bool {
        self.check_at(name, minutes, Utc::now())
    }

    /// Fire `name` if at least `minutes` have elapsed since it last fired.
    ///
    /// Returns `true` and records `now` when armed. The first check of a name
    /// always fires. A clock that moved backwards never fires.
    pub fn check_at(&mut self, name: &str, minutes: i64, now: DateTime<Utc>) -> bool {
        // ---
        let due = match self.last_fired.get(name) {
            None => true,
            Some(last) => now.signed_duration_since(*last) >= Duration::minutes(minutes),
        };

        if due {
            self.last_fired.insert(name.to_string(), now);
        }
        due
    }

    pub fn last_fired(&self, name: &str) -> Option<DateTime<Utc>> {
        self.last_fired.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 24, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_first_check_always_fires() {
        // ---
        let mut gate = IntervalGate::new();
        assert!(gate.check("5min", 5));
        assert!(gate.last_fired("5min").is_some());
        assert!(gate.last_fired("25min").is_none());
    }

    #[test]
    fn test_fires_on_first_reading_after_boundary() {
        // ---
        let mut gate = IntervalGate::new();
        let start = t0();
        assert!(gate.check_at("5min", 5, start));

        // Readings every 60s: the gate re-arms at exactly 5 minutes.
        for minute in 1..5 {
            assert!(!gate.check_at("5min", 5, start + Duration::minutes(minute)));
        }
        assert!(gate.check_at("5min", 5, start + Duration::minutes(5)));
        assert_eq!(gate.last_fired("5min"), Some(start + Duration::minutes(5)));
    }

    #[test]
    fn test_at_most_once_per_span() {
        // ---
        let mut gate = IntervalGate::new();
        let start = t0();
        let mut fired = Vec::new();

        // A reading every 37 seconds for two hours.
        for step in 0..195 {
            let now = start + Duration::seconds(37 * step);
            if gate.check_at("5min", 5, now) {
                fired.push(now);
            }
        }

        assert!(fired.len() > 1);
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::minutes(5));
        }
    }

    #[test]
    fn test_names_are_independent() {
        // ---
        let mut gate = IntervalGate::new();
        let start = t0();
        assert!(gate.check_at("5min", 5, start));
        assert!(gate.check_at("25min", 25, start));
        assert!(!gate.check_at("5min", 5, start + Duration::minutes(2)));
        assert!(gate.check_at("6hour", 360, start + Duration::minutes(2)));
    }

    #[test]
    fn test_clock_moving_backwards_does_not_fire() {
        // ---
        let mut gate = IntervalGate::new();
        let start = t0();
        assert!(gate.check_at("5min", 5, start));
        assert!(!gate.check_at("5min", 5, start - Duration::hours(1)));
        assert_eq!(gate.last_fired("5min"), Some(start));
    }
}
