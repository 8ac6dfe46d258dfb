//! Probe error taxonomy.
//!
//! A check attempt ends in one of three ways: success, an [`ExpectedError`]
//! (the dependency is not ready yet — retry), or a fatal error (bad
//! configuration, unparseable TLS material, a transport failure the probe
//! cannot classify — retrying will not help). The waiter tells them apart
//! by variant, never by message text.

use std::fmt;

/// Ordered key/value diagnostics attached to an [`ExpectedError`].
///
/// Order is preserved for logging: pairs render as `key=value` in the
/// order the probe recorded them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Details(Vec<(&'static str, String)>);

impl Details {
    /// Append one diagnostic pair.
    pub fn push(&mut self, key: &'static str, value: impl Into<String>) {
        self.0.push((key, value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl fmt::Display for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// A retriable probe failure: the dependency was reached (or reachably
/// absent) but is not in the expected state yet.
///
/// Immutable after construction. Carries a human message, an optional
/// underlying cause, and ordered diagnostic pairs for structured logging.
#[derive(Debug)]
pub struct ExpectedError {
    message: &'static str,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    details: Details,
}

impl ExpectedError {
    pub fn new(message: &'static str) -> Self {
        Self {
            message,
            cause: None,
            details: Details::default(),
        }
    }

    /// Attach the underlying error that triggered this expectation failure.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Append one diagnostic pair. Pairs keep their insertion order.
    pub fn with_detail(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.details.push(key, value);
        self
    }

    pub fn message(&self) -> &str {
        self.message
    }

    pub fn details(&self) -> &Details {
        &self.details
    }
}

impl fmt::Display for ExpectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for ExpectedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Outcome classification for one check attempt.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// Not ready yet. The waiter logs the details and retries.
    #[error(transparent)]
    Expected(#[from] ExpectedError),
    /// Unrecoverable: malformed probe configuration, unloadable TLS
    /// material, or a transport error the probe cannot classify.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl CheckError {
    /// Wrap an arbitrary error as fatal.
    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        CheckError::Fatal(err.into())
    }

    pub fn is_expected(&self) -> bool {
        matches!(self, CheckError::Expected(_))
    }
}

/// Whether `err` (or anything in its source chain) is an I/O
/// connection-refused error.
///
/// Probes use this to classify "service not up yet" as expected while
/// leaving stranger transport failures fatal.
pub fn is_connection_refused(err: &(dyn std::error::Error + 'static)) -> bool {
    chain_has_io_kind(err, std::io::ErrorKind::ConnectionRefused)
}

/// Whether `err` (or anything in its source chain) is an I/O timeout.
pub fn is_timed_out(err: &(dyn std::error::Error + 'static)) -> bool {
    chain_has_io_kind(err, std::io::ErrorKind::TimedOut)
}

fn chain_has_io_kind(err: &(dyn std::error::Error + 'static), kind: std::io::ErrorKind) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
            if io_err.kind() == kind {
                return true;
            }
        }
        current = e.source();
    }
    false
}
