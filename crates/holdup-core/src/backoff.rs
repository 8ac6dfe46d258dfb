//! Backoff calculation between attempts.
//!
//! Pure functions only: the waiter owns the attempt counter and the
//! timers, this module just maps an attempt count to a wait duration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Delay policy between consecutive attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Every wait is the base interval.
    #[default]
    Linear,
    /// Waits grow as `base × coefficient^attempt`, capped at a maximum.
    Exponential,
}

impl fmt::Display for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffPolicy::Linear => f.write_str("linear"),
            BackoffPolicy::Exponential => f.write_str("exponential"),
        }
    }
}

impl FromStr for BackoffPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(BackoffPolicy::Linear),
            "exponential" => Ok(BackoffPolicy::Exponential),
            other => Err(format!("invalid backoff policy: {other}")),
        }
    }
}

/// Exponential backoff duration for the given attempt count.
///
/// Returns `min(base × coefficient^attempt, max)`. Saturates at `max`
/// whenever `coefficient^attempt` is non-finite or the multiplication
/// would overflow what [`Duration`] can hold. The result is strictly
/// positive for any `base > 0` and non-decreasing in `attempt` until it
/// reaches `max`, constant after.
pub fn exponential_backoff(
    attempt: u32,
    coefficient: f64,
    base: Duration,
    max: Duration,
) -> Duration {
    let multiplier = coefficient.powi(attempt as i32);

    // Saturate before multiplying: a non-finite or too-large multiplier
    // would overflow Duration::mul_f64.
    if !multiplier.is_finite() || multiplier > max.as_secs_f64() / base.as_secs_f64() {
        return max;
    }

    base.mul_f64(multiplier).min(max)
}
