//! `holdup redis ADDRESS... [flags] [-- command [args...]]`

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use holdup_core::{Checker, RunContext};
use holdup_redis::RedisChecker;

use crate::duration::parse_duration;

use super::NextCommand;

/// Check Redis servers
#[derive(Args, Debug)]
#[command(
    after_help = "Examples:\n  holdup redis 127.0.0.1:6379\n  holdup redis redis://:password@cache.internal:6380"
)]
pub struct RedisArgs {
    /// redis:// URLs or host:port endpoints to probe
    #[arg(required = true, value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Per-attempt timeout
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    pub connection_timeout: Duration,

    #[command(flatten)]
    pub next: NextCommand,
}

pub async fn run(ctx: &RunContext, args: &RedisArgs) -> anyhow::Result<()> {
    let checkers = args
        .addresses
        .iter()
        .map(|address| {
            Arc::new(RedisChecker::new(address).with_timeout(args.connection_timeout))
                as Arc<dyn Checker>
        })
        .collect();

    super::run(ctx, checkers).await
}
