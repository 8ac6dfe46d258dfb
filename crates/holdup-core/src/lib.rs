//! holdup-core — the waiter core of holdup.
//!
//! Drives an abstract readiness check against an external dependency until
//! it succeeds (or, inverted, until it fails), under a single deadline.
//!
//! # Architecture
//!
//! ```text
//! wait() / wait_parallel()
//!   ├── WaitOptions (timeout, interval, invert, backoff policy)
//!   │   └── validated once, before the first attempt
//!   ├── Checker (kind / identity / check) — one probe per dependency
//!   └── loop: attempt → classify → sleep(backoff) → attempt …
//!         raced against the deadline and the caller's CancellationToken
//! ```
//!
//! Probe failures come in two flavors: [`ExpectedError`] ("not ready yet,
//! try again") and fatal errors ("no amount of retrying will help"). The
//! waiter retries the former, propagates the latter, and reports deadline
//! expiry as its own terminal outcome.

pub mod backoff;
pub mod checker;
pub mod error;
pub mod settings;
pub mod waiter;

pub use backoff::BackoffPolicy;
pub use checker::Checker;
pub use error::{CheckError, ExpectedError};
pub use settings::{RunContext, RunSettings};
pub use waiter::{
    wait, wait_parallel, wait_parallel_with_cancel, wait_with_cancel, WaitError, WaitOptions,
};
