//! Subcommand implementations: each builds its probes from the parsed
//! flags and runs them through the shared waiter.

pub mod dns;
pub mod exec;
pub mod grpc;
pub mod http;
pub mod mysql;
pub mod redis;
pub mod tcp;

use std::sync::Arc;

use clap::Args;

use holdup_core::{wait_parallel_with_cancel, wait_with_cancel, Checker, RunContext};

/// Trailing `-- command [args...]` executed once the wait succeeds.
#[derive(Args, Clone, Debug, Default)]
pub struct NextCommand {
    /// Command to run after all checks pass
    #[arg(last = true, value_name = "command")]
    pub command: Vec<String>,
}

/// Run one or many probes under the invocation's settings. A single
/// address stays on the single-check path; more fan out in parallel.
pub async fn run(ctx: &RunContext, checkers: Vec<Arc<dyn Checker>>) -> anyhow::Result<()> {
    let options = ctx.settings().wait_options();

    if checkers.len() == 1 {
        wait_with_cancel(ctx.cancellation(), checkers[0].as_ref(), &options).await?;
    } else {
        wait_parallel_with_cancel(ctx.cancellation(), checkers, &options).await?;
    }
    Ok(())
}
