//! Clock sources and rollback detection.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Backward skew absorbed silently (NTP corrections, timezone changes).
pub const ROLLBACK_TOLERANCE_SECS: i64 = 5 * 60;

/// Forward jumps beyond this are flagged as suspicious.
pub const MAX_FORWARD_JUMP_SECS: i64 = 366 * 24 * 60 * 60;

/// Direction of a detected clock anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockAnomaly {
    /// The clock was set back past the tolerance.
    Backward,
    /// The clock leapt further ahead than is plausible.
    Forward,
}

/// Result of comparing `now` against the last known-good time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCheck {
    /// False when an anomaly was detected.
    pub ok: bool,
    /// `now - last_known_date` (zero when there is no anchor yet).
    pub delta: Duration,
    /// The anomaly, if any.
    pub anomaly: Option<ClockAnomaly>,
}

impl TimeCheck {
    /// True for a backward jump, the only anomaly that freezes the engine.
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        self.anomaly == Some(ClockAnomaly::Backward)
    }
}

/// Detects clock manipulation relative to the engine's anchor.
///
/// Stateless: the anchor lives in the activation record, and the engine
/// alone decides whether to advance it.
#[derive(Debug, Clone, Copy)]
pub struct TimeIntegrityMonitor {
    tolerance: Duration,
    max_forward_jump: Duration,
}

impl TimeIntegrityMonitor {
    /// Monitor with the fixed production bounds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tolerance: Duration::seconds(ROLLBACK_TOLERANCE_SECS),
            max_forward_jump: Duration::seconds(MAX_FORWARD_JUMP_SECS),
        }
    }

    /// Compares `now` with the last known-good time.
    #[must_use]
    pub fn check(&self, now: DateTime<Utc>, last_known_date: Option<DateTime<Utc>>) -> TimeCheck {
        let Some(last) = last_known_date else {
            return TimeCheck {
                ok: true,
                delta: Duration::zero(),
                anomaly: None,
            };
        };

        let delta = now.signed_duration_since(last);
        let anomaly = if delta < -self.tolerance {
            Some(ClockAnomaly::Backward)
        } else if delta > self.max_forward_jump {
            Some(ClockAnomaly::Forward)
        } else {
            None
        };

        TimeCheck {
            ok: anomaly.is_none(),
            delta,
            anomaly,
        }
    }
}

impl Default for TimeIntegrityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for hosts' tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Moves the clock by `by` (negative to roll back).
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
