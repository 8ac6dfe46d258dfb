//! `holdup grpc ADDRESS... [flags] [-- command [args...]]`

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use holdup_core::{Checker, RunContext};
use holdup_grpc::GrpcChecker;

use crate::duration::parse_duration;

use super::NextCommand;

/// Check gRPC health endpoints
#[derive(Args, Debug)]
#[command(
    after_help = "Examples:\n  holdup grpc 127.0.0.1:50051 --insecure-transport\n  holdup grpc api.internal:443 --service-name jobs.v1.Worker"
)]
pub struct GrpcArgs {
    /// host:port endpoints to probe
    #[arg(required = true, value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Per-attempt dial/call timeout
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    pub connection_timeout: Duration,

    /// Dial without TLS
    #[arg(long)]
    pub insecure_transport: bool,

    /// Keep TLS but skip peer verification
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,

    /// Health-check a named service instead of the whole server
    #[arg(long)]
    pub service_name: Option<String>,

    #[command(flatten)]
    pub next: NextCommand,
}

pub async fn run(ctx: &RunContext, args: &GrpcArgs) -> anyhow::Result<()> {
    let checkers = args
        .addresses
        .iter()
        .map(|address| {
            let mut checker = GrpcChecker::new(address)
                .with_timeout(args.connection_timeout)
                .with_insecure_transport(args.insecure_transport)
                .with_insecure_skip_tls_verify(args.insecure_skip_tls_verify);
            if let Some(service) = &args.service_name {
                checker = checker.with_service_name(service);
            }
            Arc::new(checker) as Arc<dyn Checker>
        })
        .collect();

    super::run(ctx, checkers).await
}
