//! Time provider abstraction
//!
//! Every write is stamped with `updated_at` in epoch milliseconds, and
//! expiry is judged against "now". The [`Clock`] trait lets production code
//! use system time while tests pin and advance time explicitly.
//!
//! # Example
//!
//! ```
//! use treelike::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! assert!(clock.now_millis() > 0);
//! assert!(clock.now_secs() <= clock.now_millis() / 1000);
//! ```

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;

/// A time provider for write stamps and expiry checks.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;

    /// Current time as whole seconds since Unix epoch, rounded down.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Formats an epoch-millisecond stamp as RFC 3339 for display.
pub fn format_millis(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

/// Test clock with auto-advancing time.
///
/// Each `now_millis()` call returns the current value and then advances by
/// one millisecond, so consecutive writes never share a stamp unless the
/// test pins them with [`FixedClock::set`] or [`FixedClock::freeze`].
///
/// ```
/// use treelike::{Clock, FixedClock};
///
/// let clock = FixedClock::new(1000);
/// assert_eq!(clock.now_millis(), 1000);
/// assert_eq!(clock.now_millis(), 1001);
///
/// clock.freeze();
/// assert_eq!(clock.now_millis(), clock.now_millis());
/// ```
#[cfg(any(test, feature = "testing"))]
pub struct FixedClock {
    state: Mutex<FixedClockState>,
}

#[cfg(any(test, feature = "testing"))]
struct FixedClockState {
    millis: u64,
    frozen: bool,
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    /// Create a new fixed clock with the given initial time in milliseconds.
    pub fn new(millis: u64) -> Self {
        Self {
            state: Mutex::new(FixedClockState {
                millis,
                frozen: false,
            }),
        }
    }

    /// Stop auto-advancing until [`FixedClock::resume`] is called.
    pub fn freeze(&self) {
        self.state.lock().unwrap().frozen = true;
    }

    pub fn resume(&self) {
        self.state.lock().unwrap().frozen = false;
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        self.state.lock().unwrap().millis += ms;
    }

    /// Set the clock to a specific time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.state.lock().unwrap().millis = ms;
    }

    /// Get the current time without advancing.
    pub fn get(&self) -> u64 {
        self.state.lock().unwrap().millis
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        let t = state.millis;
        if !state.frozen {
            state.millis += 1;
        }
        t
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1704067200000)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Debug for FixedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("FixedClock")
            .field("millis", &state.millis)
            .field("frozen", &state.frozen)
            .finish()
    }
}
