//! Clock Module
//!
//! Time source shared by the cache engine and the in-memory storage adapter.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

// == Clock ==
/// Source of "now" for staleness and recency decisions.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Wall clock time
    #[default]
    System,
    /// Manually driven time, shared between clones
    Manual(ManualClock),
}

impl Clock {
    /// Returns the current time according to this clock.
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(clock) => clock.now(),
        }
    }
}

impl From<ManualClock> for Clock {
    fn from(clock: ManualClock) -> Self {
        Clock::Manual(clock)
    }
}

// == Manual Clock ==
/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a manual clock starting at the given instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Returns the current manual time.
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let manual = ManualClock::default();
        let clock = Clock::from(manual.clone());
        let before = clock.now();

        manual.advance(Duration::seconds(5));

        assert_eq!(clock.now() - before, Duration::seconds(5));
    }

    #[test]
    fn test_manual_clock_set() {
        let manual = ManualClock::default();
        let at = Utc::now() - Duration::days(3);
        manual.set(at);
        assert_eq!(manual.now(), at);
    }

    #[test]
    fn test_system_clock_moves() {
        let clock = Clock::System;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
