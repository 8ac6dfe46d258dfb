//! `holdup mysql ADDRESS... [flags] [-- command [args...]]`

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use holdup_core::{Checker, RunContext};
use holdup_mysql::MysqlChecker;

use crate::duration::parse_duration;

use super::NextCommand;

/// Check MySQL servers
#[derive(Args, Debug)]
#[command(
    after_help = "Examples:\n  holdup mysql 127.0.0.1:3306\n  holdup mysql mysql://db.internal:3307 -t 2m"
)]
pub struct MysqlArgs {
    /// mysql:// DSNs or host:port endpoints to probe
    #[arg(required = true, value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Per-attempt timeout
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    pub connection_timeout: Duration,

    #[command(flatten)]
    pub next: NextCommand,
}

pub async fn run(ctx: &RunContext, args: &MysqlArgs) -> anyhow::Result<()> {
    let checkers = args
        .addresses
        .iter()
        .map(|address| {
            Arc::new(MysqlChecker::new(address).with_timeout(args.connection_timeout))
                as Arc<dyn Checker>
        })
        .collect();

    super::run(ctx, checkers).await
}
