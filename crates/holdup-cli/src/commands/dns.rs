//! `holdup dns <a|aaaa|cname|mx|ns|txt> DOMAIN... [flags] [-- command ...]`

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};

use holdup_core::{Checker, RunContext};
use holdup_dns::{DnsChecker, RecordKind};

use crate::duration::parse_duration;

use super::NextCommand;

/// Check DNS records
#[derive(Subcommand, Debug)]
pub enum DnsCommands {
    /// Check A records
    A(DnsArgs),
    /// Check AAAA records
    Aaaa(DnsArgs),
    /// Check CNAME records
    Cname(DnsArgs),
    /// Check MX records
    Mx(DnsArgs),
    /// Check NS records
    Ns(DnsArgs),
    /// Check TXT records
    Txt(DnsArgs),
}

impl DnsCommands {
    fn record(&self) -> RecordKind {
        match self {
            DnsCommands::A(_) => RecordKind::A,
            DnsCommands::Aaaa(_) => RecordKind::Aaaa,
            DnsCommands::Cname(_) => RecordKind::Cname,
            DnsCommands::Mx(_) => RecordKind::Mx,
            DnsCommands::Ns(_) => RecordKind::Ns,
            DnsCommands::Txt(_) => RecordKind::Txt,
        }
    }

    pub fn args(&self) -> &DnsArgs {
        match self {
            DnsCommands::A(args)
            | DnsCommands::Aaaa(args)
            | DnsCommands::Cname(args)
            | DnsCommands::Mx(args)
            | DnsCommands::Ns(args)
            | DnsCommands::Txt(args) => args,
        }
    }
}

#[derive(Args, Debug)]
#[command(
    after_help = "Examples:\n  holdup dns a service.internal --expected-value 10.0.0.12\n  holdup dns mx example.com --nameserver 1.1.1.1"
)]
pub struct DnsArgs {
    /// Domains to resolve
    #[arg(required = true, value_name = "DOMAIN")]
    pub domains: Vec<String>,

    /// Nameserver to query (ip[:port], UDP) instead of the system chain
    #[arg(long)]
    pub nameserver: Option<String>,

    /// Record value at least one answer must match, repeatable
    #[arg(long = "expected-value", value_name = "VALUE")]
    pub expected_values: Vec<String>,

    /// Per-attempt resolution timeout
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    pub resolve_timeout: Duration,

    #[command(flatten)]
    pub next: NextCommand,
}

pub async fn run(ctx: &RunContext, command: &DnsCommands) -> anyhow::Result<()> {
    let record = command.record();
    let args = command.args();

    let checkers = args
        .domains
        .iter()
        .map(|domain| {
            let mut checker = DnsChecker::new(record, domain)
                .with_timeout(args.resolve_timeout)
                .with_expected_values(args.expected_values.clone());
            if let Some(nameserver) = &args.nameserver {
                checker = checker.with_nameserver(nameserver);
            }
            Arc::new(checker) as Arc<dyn Checker>
        })
        .collect();

    super::run(ctx, checkers).await
}
