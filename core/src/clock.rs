//! Clock abstraction so time-dependent components are testable.
//!
//! The rate limiter and the intake pipeline take an injected [`Clock`] instead
//! of calling `Utc::now()` directly, letting tests advance time manually
//! instead of sleeping.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
