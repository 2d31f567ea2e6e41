//! Fixed-window rate limiter keyed by `(purpose, caller key)`.
//!
//! State is process-local by design: running multiple instances without a
//! shared counter multiplies the effective limit. A periodic sweep evicts
//! expired windows to bound memory. Checks are in-memory and non-blocking; a
//! denial is immediate.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Distinct rate-limit namespaces; quotas never bleed across purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RatePurpose {
    /// Admin login attempts, keyed by caller IP.
    AdminLogin,
    /// Public form submissions, keyed by caller IP.
    PublicSubmission,
}

impl RatePurpose {
    /// Default quota for the purpose.
    #[must_use]
    pub const fn default_quota(self) -> Quota {
        match self {
            Self::AdminLogin => Quota {
                max: 10,
                window: Duration::from_secs(15 * 60),
            },
            Self::PublicSubmission => Quota {
                max: 10,
                window: Duration::from_secs(60),
            },
        }
    }
}

/// Maximum calls allowed per fixed window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quota {
    /// Calls allowed within one window.
    pub max: u32,
    /// Window length.
    pub window: Duration,
}

/// Denial verdict carrying the time until the window expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("too many requests, retry after {retry_after:?}")]
pub struct RateLimited {
    /// Time until the caller's window resets.
    pub retry_after: Duration,
}

struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Process-local fixed-window rate limiter.
///
/// Time comes from the injected [`Clock`] so tests advance it manually
/// instead of sleeping.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    quotas: HashMap<RatePurpose, Quota>,
    windows: Mutex<HashMap<(RatePurpose, String), Window>>,
}

impl RateLimiter {
    /// Creates a limiter with the default per-purpose quotas.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            quotas: [
                (RatePurpose::AdminLogin, RatePurpose::AdminLogin.default_quota()),
                (
                    RatePurpose::PublicSubmission,
                    RatePurpose::PublicSubmission.default_quota(),
                ),
            ]
            .into_iter()
            .collect(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the quota for one purpose (config and tests).
    #[must_use]
    pub fn with_quota(mut self, purpose: RatePurpose, quota: Quota) -> Self {
        self.quotas.insert(purpose, quota);
        self
    }

    fn quota(&self, purpose: RatePurpose) -> Quota {
        self.quotas
            .get(&purpose)
            .copied()
            .unwrap_or_else(|| purpose.default_quota())
    }

    /// Combined check-and-record for one call.
    ///
    /// The first call for an unseen or expired key resets the window and is
    /// allowed. Subsequent calls within the window increment the counter and
    /// are allowed while the count stays within the quota.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] with the time until the window expires when the
    /// caller is over budget. The call is not recorded in that case.
    ///
    /// # Panics
    ///
    /// Panics if the window mutex is poisoned; none of the guarded code
    /// panics.
    pub fn check(&self, purpose: RatePurpose, key: &str) -> Result<(), RateLimited> {
        let quota = self.quota(purpose);
        let now = self.clock.now();
        #[allow(clippy::unwrap_used)]
        let mut windows = self.windows.lock().unwrap();

        let window = windows
            .entry((purpose, key.to_string()))
            .or_insert(Window { started_at: now, count: 0 });

        let window_ms = i64::try_from(quota.window.as_millis()).unwrap_or(i64::MAX);
        let elapsed_ms = now.signed_duration_since(window.started_at).num_milliseconds();
        if elapsed_ms >= window_ms {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= quota.max {
            let remaining_ms = (window_ms - elapsed_ms).max(0);
            #[allow(clippy::cast_sign_loss)]
            let retry_after = Duration::from_millis(remaining_ms as u64);
            tracing::warn!(
                purpose = ?purpose,
                key = %key,
                count = window.count,
                max = quota.max,
                "rate limit exceeded"
            );
            return Err(RateLimited { retry_after });
        }

        window.count += 1;
        Ok(())
    }

    /// Evicts expired windows and returns how many were removed.
    ///
    /// # Panics
    ///
    /// Panics if the window mutex is poisoned; none of the guarded code
    /// panics.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        #[allow(clippy::unwrap_used)]
        let mut windows = self.windows.lock().unwrap();
        let before = windows.len();
        windows.retain(|(purpose, _), window| {
            let window_ms = i64::try_from(self.quota(*purpose).window.as_millis())
                .unwrap_or(i64::MAX);
            now.signed_duration_since(window.started_at).num_milliseconds() < window_ms
        });
        let evicted = before - windows.len();
        if evicted > 0 {
            tracing::debug!(evicted, tracked = windows.len(), "rate limiter sweep");
        }
        evicted
    }
}

/// Runs [`RateLimiter::sweep`] on a fixed interval until the task is aborted.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            limiter.sweep();
        }
    })
}
