//! `holdup exec COMMAND [ARGS...] [flags]`

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use holdup_core::{Checker, RunContext};
use holdup_exec::ExecChecker;

use crate::duration::parse_duration;

/// Check a command's exit code
#[derive(Args, Debug)]
#[command(
    after_help = "Examples:\n  holdup exec pg_isready -- -h db.internal\n  holdup exec ./smoke-test --expect-exit-code 0 -t 5m"
)]
pub struct ExecArgs {
    /// Command to run
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Command arguments
    #[arg(last = true, value_name = "args")]
    pub args: Vec<String>,

    /// Exit code that counts as ready
    #[arg(long, default_value_t = 0)]
    pub expect_exit_code: i32,

    /// Per-attempt execution timeout
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub execution_timeout: Duration,
}

pub async fn run(ctx: &RunContext, args: &ExecArgs) -> anyhow::Result<()> {
    let checker = ExecChecker::new(&args.command)
        .with_args(args.args.clone())
        .with_expect_exit_code(args.expect_exit_code)
        .with_timeout(args.execution_timeout);

    super::run(ctx, vec![Arc::new(checker) as Arc<dyn Checker>]).await
}
