//! Clock abstraction used to timestamp connection activity.
//!
//! [`LiveClock`] reads the system wall clock. [`TestClock`] only moves when
//! told to, which keeps health snapshots deterministic in tests.

use std::fmt::Debug;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

/// A source of UTC time.
pub trait Clock: Send + Sync + Debug {
    /// The current time.
    fn utc_now(&self) -> DateTime<Utc>;

    /// The current time as milliseconds since the UNIX epoch.
    fn timestamp_ms(&self) -> i64 {
        self.utc_now().timestamp_millis()
    }
}

/// Wall clock backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveClock;

impl Clock for LiveClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock.
#[derive(Debug)]
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.lock() = time;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.lock();
        *now += delta;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock still holds a valid timestamp.
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for TestClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}
