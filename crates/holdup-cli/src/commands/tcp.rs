//! `holdup tcp ADDRESS... [flags] [-- command [args...]]`

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use holdup_core::{Checker, RunContext};
use holdup_tcp::TcpChecker;

use crate::duration::parse_duration;

use super::NextCommand;

/// Check TCP connections
#[derive(Args, Debug)]
#[command(
    after_help = "Examples:\n  holdup tcp 127.0.0.1:9090\n  holdup tcp db.internal:5432 cache.internal:6379 -t 1m"
)]
pub struct TcpArgs {
    /// host:port endpoints to probe
    #[arg(required = true, value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Per-attempt connection timeout
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    pub connection_timeout: Duration,

    #[command(flatten)]
    pub next: NextCommand,
}

pub async fn run(ctx: &RunContext, args: &TcpArgs) -> anyhow::Result<()> {
    let checkers = args
        .addresses
        .iter()
        .map(|address| {
            Arc::new(TcpChecker::new(address).with_timeout(args.connection_timeout))
                as Arc<dyn Checker>
        })
        .collect();

    super::run(ctx, checkers).await
}
