//! The waiter: retry/backoff/cancellation orchestration for one or many
//! checkers sharing a single deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::backoff::{exponential_backoff, BackoffPolicy};
use crate::checker::Checker;
use crate::error::CheckError;

/// Attempt counter cap, preventing overflow in the exponential backoff
/// arithmetic on very long waits.
const MAX_ATTEMPTS: u32 = 1_000_000;

/// Terminal outcome of a wait that did not end in readiness.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The exponential policy needs a coefficient strictly above 1.
    #[error("backoff coefficient must be greater than 1.0, got: {0:.6}")]
    BackoffCoefficientTooSmall(f64),
    /// The exponential ceiling must not undercut the base interval.
    #[error("backoff exponential max interval ({max_interval:?}) must be greater than or equal to interval ({interval:?})")]
    BackoffMaxIntervalTooSmall {
        max_interval: Duration,
        interval: Duration,
    },
    /// The base interval must be strictly positive.
    #[error("interval must be positive, got: {0:?}")]
    NonPositiveInterval(Duration),
    /// The overall timeout elapsed before the checker became ready.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The caller's cancellation token fired.
    #[error("canceled")]
    Canceled,
    /// A fatal identity or check error, propagated unmodified.
    #[error(transparent)]
    Check(#[from] CheckError),
}

/// Waiter configuration.
///
/// Built with consuming `with_*` setters; validated once per wait, before
/// the first attempt. An invalid configuration yields a fatal error and
/// zero probe invocations.
#[derive(Clone, Debug)]
pub struct WaitOptions {
    timeout: Duration,
    interval: Duration,
    invert_check: bool,
    backoff_policy: BackoffPolicy,
    backoff_coefficient: f64,
    backoff_exponential_max_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_secs(1),
            invert_check: false,
            backoff_policy: BackoffPolicy::Linear,
            backoff_coefficient: 2.0,
            backoff_exponential_max_interval: Duration::from_secs(5),
        }
    }
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total wall-clock budget. Zero means unbounded: only the caller's
    /// cancellation token can stop the wait.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base delay between attempts.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Flip the success predicate: wait for the checker to fail.
    pub fn with_invert_check(mut self, invert: bool) -> Self {
        self.invert_check = invert;
        self
    }

    pub fn with_backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.backoff_policy = policy;
        self
    }

    /// Multiplier for the exponential policy. Must be > 1.
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    /// Ceiling for the exponential policy. Must be ≥ the interval.
    pub fn with_backoff_exponential_max_interval(mut self, max_interval: Duration) -> Self {
        self.backoff_exponential_max_interval = max_interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn invert_check(&self) -> bool {
        self.invert_check
    }

    fn validate(&self) -> Result<(), WaitError> {
        if self.backoff_policy == BackoffPolicy::Exponential {
            if self.backoff_coefficient <= 1.0 {
                return Err(WaitError::BackoffCoefficientTooSmall(
                    self.backoff_coefficient,
                ));
            }
            if self.backoff_exponential_max_interval < self.interval {
                return Err(WaitError::BackoffMaxIntervalTooSmall {
                    max_interval: self.backoff_exponential_max_interval,
                    interval: self.interval,
                });
            }
        }

        if self.interval.is_zero() {
            return Err(WaitError::NonPositiveInterval(self.interval));
        }

        Ok(())
    }

    fn wait_duration(&self, attempt: u32) -> Duration {
        match self.backoff_policy {
            BackoffPolicy::Linear => self.interval,
            BackoffPolicy::Exponential => exponential_backoff(
                attempt,
                self.backoff_coefficient,
                self.interval,
                self.backoff_exponential_max_interval,
            ),
        }
    }
}

/// Resolves when the deadline passes; never resolves without one.
async fn deadline_expired(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Wait for one checker to become ready.
pub async fn wait(checker: &dyn Checker, options: &WaitOptions) -> Result<(), WaitError> {
    wait_with_cancel(&CancellationToken::new(), checker, options).await
}

/// Wait for one checker to become ready, stopping early when `cancel`
/// fires.
///
/// Terminal outcomes: `Ok(())` on (possibly inverted) success,
/// [`WaitError::DeadlineExceeded`] / [`WaitError::Canceled`] when the
/// budget runs out, or a fatal configuration/identity/check error
/// propagated unmodified.
pub async fn wait_with_cancel(
    cancel: &CancellationToken,
    checker: &dyn Checker,
    options: &WaitOptions,
) -> Result<(), WaitError> {
    options.validate()?;

    let deadline = (!options.timeout.is_zero()).then(|| Instant::now() + options.timeout);

    let kind = checker.kind();
    let identity = checker.identity()?;

    let mut attempts: u32 = 0;

    loop {
        info!("[{kind}] Checking {identity} ...");

        // Race the attempt against the deadline and the caller's token.
        // Dropping the attempt future is the cancellation: the probe's
        // in-flight I/O is torn down at its next suspension point.
        let result = {
            let attempt = checker.check();
            tokio::pin!(attempt);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WaitError::Canceled),
                () = deadline_expired(deadline) => return Err(WaitError::DeadlineExceeded),
                result = &mut attempt => result,
            }
        };

        match &result {
            Ok(()) => {}
            Err(CheckError::Expected(err)) => {
                error!(details = %err.details(), "{err}");
            }
            Err(CheckError::Fatal(err)) => {
                error!("{err:#}");
            }
        }

        match result {
            Ok(()) if !options.invert_check => return Ok(()),
            Err(_) if options.invert_check => return Ok(()),
            Err(err @ CheckError::Fatal(_)) => return Err(WaitError::Check(err)),
            _ => {}
        }

        attempts = attempts.saturating_add(1).min(MAX_ATTEMPTS);
        let wait = options.wait_duration(attempts);

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WaitError::Canceled),
            () = deadline_expired(deadline) => return Err(WaitError::DeadlineExceeded),
            () = tokio::time::sleep(wait) => {}
        }
    }
}

/// Wait for every checker in `checkers`, concurrently, under one shared
/// configuration.
pub async fn wait_parallel(
    checkers: Vec<Arc<dyn Checker>>,
    options: &WaitOptions,
) -> Result<(), WaitError> {
    wait_parallel_with_cancel(&CancellationToken::new(), checkers, options).await
}

/// Parallel wait with first-failure-wins semantics.
///
/// One task per checker. All succeeding: `Ok(())`. The first error to
/// reach the collection point is returned immediately; the shared child
/// token is cancelled so the remaining probes abort at their next
/// suspension point. Late errors are dropped — the error channel is
/// buffered to the probe count and written with `try_send`, so a losing
/// task never blocks on reporting.
///
/// A checker finishing early never cancels its peers; only failure does.
pub async fn wait_parallel_with_cancel(
    cancel: &CancellationToken,
    checkers: Vec<Arc<dyn Checker>>,
    options: &WaitOptions,
) -> Result<(), WaitError> {
    let child = cancel.child_token();
    let (err_tx, mut err_rx) = mpsc::channel::<WaitError>(checkers.len().max(1));

    let mut tasks = JoinSet::new();
    for checker in checkers {
        let token = child.clone();
        let options = options.clone();
        let err_tx = err_tx.clone();
        tasks.spawn(async move {
            if let Err(err) = wait_with_cancel(&token, checker.as_ref(), &options).await {
                let _ = err_tx.try_send(err);
            }
        });
    }

    // Once every task has finished (dropping its sender) with no error
    // buffered, recv() yields None: the all-success barrier.
    drop(err_tx);
    match err_rx.recv().await {
        Some(err) => {
            child.cancel();
            Err(err)
        }
        None => Ok(()),
    }
}
