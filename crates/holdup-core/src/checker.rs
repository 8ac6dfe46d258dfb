//! The check contract every probe satisfies.

use async_trait::async_trait;

use crate::error::CheckError;

/// One readiness probe against one external dependency.
///
/// Implementations are immutable after construction: every tunable
/// (timeouts, TLS flags, expectations, credentials) is fixed by the
/// constructor, so a probe can be checked repeatedly and concurrently
/// without accumulating state. One call to [`Checker::check`] performs
/// exactly one externally observable attempt.
///
/// The waiter never looks past this trait: it calls `kind` and `identity`
/// for logging and `check` for the attempt, nothing else.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Short probe tag used in per-attempt log lines, e.g. `HTTP`.
    fn kind(&self) -> &'static str;

    /// Human-readable target identity, derived from the probe's
    /// configuration. Cheap, does no I/O.
    ///
    /// An error here means the probe is malformed (e.g. an unparseable
    /// DSN) — the waiter surfaces it immediately, without retry and
    /// without ever invoking [`Checker::check`].
    fn identity(&self) -> Result<String, CheckError>;

    /// Perform one attempt.
    ///
    /// Per-attempt I/O must be bounded by the probe's own timeout. The
    /// waiter may drop the returned future at any suspension point when
    /// the overall deadline expires; probes must tolerate that (no
    /// detached side effects that outlive the attempt).
    async fn check(&self) -> Result<(), CheckError>;
}
