//! Run-scoped settings, threaded from the invoker down to the waiter.
//!
//! The CLI parses its flags once, records them here, and hands one
//! [`RunContext`] (settings + cancellation) to every subcommand. Probes
//! never see this bag — it only parameterizes the waiter, so probe
//! constructors stay free of waiter plumbing.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;
use crate::waiter::WaitOptions;

/// Well-known waiter settings with absent-means-zero semantics.
///
/// Every getter returns the zero value of its type when the key was never
/// recorded; [`RunSettings::wait_options`] falls back to the waiter
/// defaults instead, so an invoker that sets nothing still gets a sane
/// configuration.
#[derive(Clone, Debug, Default)]
pub struct RunSettings {
    timeout: Option<Duration>,
    interval: Option<Duration>,
    invert_check: Option<bool>,
    backoff_policy: Option<BackoffPolicy>,
    backoff_coefficient: Option<f64>,
    backoff_exponential_max_interval: Option<Duration>,
}

impl RunSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_invert_check(mut self, invert: bool) -> Self {
        self.invert_check = Some(invert);
        self
    }

    pub fn with_backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.backoff_policy = Some(policy);
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = Some(coefficient);
        self
    }

    pub fn with_backoff_exponential_max_interval(mut self, max_interval: Duration) -> Self {
        self.backoff_exponential_max_interval = Some(max_interval);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or_default()
    }

    pub fn interval(&self) -> Duration {
        self.interval.unwrap_or_default()
    }

    pub fn invert_check(&self) -> bool {
        self.invert_check.unwrap_or_default()
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        self.backoff_policy.unwrap_or_default()
    }

    pub fn backoff_coefficient(&self) -> f64 {
        self.backoff_coefficient.unwrap_or_default()
    }

    pub fn backoff_exponential_max_interval(&self) -> Duration {
        self.backoff_exponential_max_interval.unwrap_or_default()
    }

    /// Waiter configuration with recorded keys applied over the defaults.
    pub fn wait_options(&self) -> WaitOptions {
        let mut options = WaitOptions::new();
        if let Some(timeout) = self.timeout {
            options = options.with_timeout(timeout);
        }
        if let Some(interval) = self.interval {
            options = options.with_interval(interval);
        }
        if let Some(invert) = self.invert_check {
            options = options.with_invert_check(invert);
        }
        if let Some(policy) = self.backoff_policy {
            options = options.with_backoff_policy(policy);
        }
        if let Some(coefficient) = self.backoff_coefficient {
            options = options.with_backoff_coefficient(coefficient);
        }
        if let Some(max_interval) = self.backoff_exponential_max_interval {
            options = options.with_backoff_exponential_max_interval(max_interval);
        }
        options
    }
}

/// One invocation's ambient state: the cancellation root plus the
/// settings bag.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    settings: RunSettings,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this invocation: every waiter holding the token (or a child
    /// of it) stops at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
