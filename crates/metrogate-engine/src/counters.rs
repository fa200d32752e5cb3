//! Live counters behind a single lock.
//!
//! Every mutation is a +1, a -1 or a set, applied under one mutex, so a
//! [`snapshot`](CounterStore::snapshot) never mixes values from two
//! different moments.

use chrono::NaiveDate;
use metrogate_core::CrossingDirection;
use metrogate_core::constants::DEFAULT_CAPACITY;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Counter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterName {
    ActiveSessions,
    PeopleInside,
    TotalAccessToday,
    TotalRejectedToday,
}

impl CounterName {
    pub fn as_str(self) -> &'static str {
        match self {
            CounterName::ActiveSessions => "active_sessions",
            CounterName::PeopleInside => "people_inside",
            CounterName::TotalAccessToday => "total_access_today",
            CounterName::TotalRejectedToday => "total_rejected_today",
        }
    }
}

impl fmt::Display for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub active_sessions: u64,
    pub people_inside: u64,
    pub total_access_today: u64,
    pub total_rejected_today: u64,
    pub button_enabled: bool,
    /// Day the daily totals belong to.
    pub day: NaiveDate,
}

impl CounterSnapshot {
    fn get(&self, name: CounterName) -> u64 {
        match name {
            CounterName::ActiveSessions => self.active_sessions,
            CounterName::PeopleInside => self.people_inside,
            CounterName::TotalAccessToday => self.total_access_today,
            CounterName::TotalRejectedToday => self.total_rejected_today,
        }
    }

    fn slot(&mut self, name: CounterName) -> &mut u64 {
        match name {
            CounterName::ActiveSessions => &mut self.active_sessions,
            CounterName::PeopleInside => &mut self.people_inside,
            CounterName::TotalAccessToday => &mut self.total_access_today,
            CounterName::TotalRejectedToday => &mut self.total_rejected_today,
        }
    }
}

#[derive(Debug)]
pub struct CounterStore {
    inner: Mutex<CounterSnapshot>,
    capacity: u64,
}

impl CounterStore {
    pub fn new(day: NaiveDate) -> Self {
        Self::with_capacity(day, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(day: NaiveDate, capacity: u64) -> Self {
        Self {
            inner: Mutex::new(CounterSnapshot {
                active_sessions: 0,
                people_inside: 0,
                total_access_today: 0,
                total_rejected_today: 0,
                button_enabled: false,
                day,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn get(&self, name: CounterName) -> u64 {
        self.inner.lock().get(name)
    }

    /// Add one. `people_inside` saturates at capacity.
    pub fn increment(&self, name: CounterName) -> u64 {
        let mut counters = self.inner.lock();
        let limit = self.limit(name);
        let slot = counters.slot(name);
        if *slot >= limit {
            warn!(counter = %name, limit, "Counter at limit, increment ignored");
            return *slot;
        }
        *slot += 1;
        *slot
    }

    /// Subtract one, saturating at zero.
    pub fn decrement(&self, name: CounterName) -> u64 {
        let mut counters = self.inner.lock();
        let slot = counters.slot(name);
        if *slot == 0 {
            warn!(counter = %name, "Counter already zero, decrement ignored");
            return 0;
        }
        *slot -= 1;
        *slot
    }

    /// Overwrite one counter. Values above the limit are clamped.
    pub fn set(&self, name: CounterName, value: u64) -> u64 {
        let mut counters = self.inner.lock();
        let value = value.min(self.limit(name));
        *counters.slot(name) = value;
        value
    }

    pub fn set_button_enabled(&self, enabled: bool) {
        self.inner.lock().button_enabled = enabled;
    }

    /// Publish the session-derived values together. Callers hold the
    /// sessions lock so that publications land in the order sessions
    /// changed.
    pub fn publish_sessions(&self, open: u64, logged_in: bool) {
        let mut counters = self.inner.lock();
        counters.active_sessions = open.min(self.limit(CounterName::ActiveSessions));
        counters.button_enabled = logged_in;
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        *self.inner.lock()
    }

    /// Count a valid crossing: one more access, and one person in or out.
    pub fn record_crossing(&self, direction: CrossingDirection) -> CounterSnapshot {
        let mut counters = self.inner.lock();
        counters.total_access_today = counters.total_access_today.saturating_add(1);
        match direction {
            CrossingDirection::Inbound => {
                if counters.people_inside < self.capacity {
                    counters.people_inside += 1;
                } else {
                    warn!(capacity = self.capacity, "Capacity reached, people_inside not incremented");
                }
            }
            CrossingDirection::Outbound => {
                counters.people_inside = counters.people_inside.saturating_sub(1);
            }
            CrossingDirection::Ambiguous => {}
        }
        *counters
    }

    /// Start a new day. Zeroes the daily totals once per day; returns
    /// `true` if it did.
    pub fn roll_over(&self, day: NaiveDate) -> bool {
        let mut counters = self.inner.lock();
        if day <= counters.day {
            return false;
        }

        info!(
            from = %counters.day,
            to = %day,
            total_access = counters.total_access_today,
            total_rejected = counters.total_rejected_today,
            "Daily counters rolled over"
        );
        counters.day = day;
        counters.total_access_today = 0;
        counters.total_rejected_today = 0;
        true
    }

    /// Administrative reset of the daily totals and `people_inside`.
    pub fn reset(&self) {
        let mut counters = self.inner.lock();
        counters.total_access_today = 0;
        counters.total_rejected_today = 0;
        counters.people_inside = 0;
        info!("Counters reset");
    }

    fn limit(&self, name: CounterName) -> u64 {
        match name {
            CounterName::PeopleInside => self.capacity,
            _ => u64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_increment_decrement() {
        let store = CounterStore::new(day(1));
        assert_eq!(store.increment(CounterName::ActiveSessions), 1);
        assert_eq!(store.increment(CounterName::ActiveSessions), 2);
        assert_eq!(store.decrement(CounterName::ActiveSessions), 1);
        assert_eq!(store.get(CounterName::ActiveSessions), 1);
    }

    #[test]
    fn test_decrement_saturates_at_zero() {
        let store = CounterStore::new(day(1));
        assert_eq!(store.decrement(CounterName::PeopleInside), 0);
        assert_eq!(store.snapshot().people_inside, 0);
    }

    #[test]
    fn test_people_inside_saturates_at_capacity() {
        let store = CounterStore::with_capacity(day(1), 2);
        store.record_crossing(CrossingDirection::Inbound);
        store.record_crossing(CrossingDirection::Inbound);
        let snapshot = store.record_crossing(CrossingDirection::Inbound);

        assert_eq!(snapshot.people_inside, 2);
        assert_eq!(snapshot.total_access_today, 3);
        assert_eq!(store.set(CounterName::PeopleInside, 10), 2);
    }

    #[test]
    fn test_roll_over_idempotent() {
        let store = CounterStore::new(day(1));
        store.record_crossing(CrossingDirection::Inbound);
        store.increment(CounterName::TotalRejectedToday);

        assert!(store.roll_over(day(2)));
        assert!(!store.roll_over(day(2)));
        assert!(!store.roll_over(day(1)));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.day, day(2));
        assert_eq!(snapshot.total_access_today, 0);
        assert_eq!(snapshot.total_rejected_today, 0);
        assert_eq!(snapshot.people_inside, 1);
    }

    #[test]
    fn test_reset() {
        let store = CounterStore::new(day(1));
        store.record_crossing(CrossingDirection::Inbound);
        store.set(CounterName::ActiveSessions, 3);
        store.set_button_enabled(true);

        store.reset();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.people_inside, 0);
        assert_eq!(snapshot.total_access_today, 0);
        assert_eq!(snapshot.active_sessions, 3);
        assert!(snapshot.button_enabled);
    }

    proptest! {
        #[test]
        fn prop_people_inside_within_bounds(
            moves in prop::collection::vec(any::<bool>(), 0..200),
            capacity in 1u64..20,
        ) {
            let store = CounterStore::with_capacity(day(1), capacity);
            for inbound in moves {
                let direction = if inbound {
                    CrossingDirection::Inbound
                } else {
                    CrossingDirection::Outbound
                };
                let snapshot = store.record_crossing(direction);
                prop_assert!(snapshot.people_inside <= capacity);
            }
        }
    }
}
