use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// Wall-clock abstraction used to timestamp plot artifacts.
///
/// - now(): current UTC time
/// - unix_secs(): helper giving whole seconds since the epoch
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Seconds since the unix epoch, clamped at 0 for pre-epoch clocks.
    fn unix_secs(&self) -> u64 {
        self.now().timestamp().max(0) as u64
    }
}

/// Real UTC clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and hand the
/// other to the engine.
#[derive(Debug, Clone)]
pub struct ManualClock {
    secs: Arc<Mutex<i64>>,
}

impl ManualClock {
    pub fn at_unix(secs: i64) -> Self {
        Self {
            secs: Arc::new(Mutex::new(secs)),
        }
    }

    /// Advance the clock by whole seconds.
    pub fn advance_secs(&self, d: i64) {
        if let Ok(mut s) = self.secs.lock() {
            *s = s.saturating_add(d);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.lock().map(|g| *g).unwrap_or(0);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }
}
