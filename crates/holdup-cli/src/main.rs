//! holdup — block until dependencies are ready.
//!
//! One subcommand per probe family; global flags configure the shared
//! waiter. Exit status is 0 once every probe reports ready, non-zero on
//! timeout, cancellation, or a fatal configuration error — the shape
//! init containers and CI gates expect.

use std::time::Duration;

use clap::{Parser, Subcommand};

use holdup_core::{BackoffPolicy, RunContext, RunSettings};

mod commands;
mod duration;

use commands::dns::DnsCommands;
use commands::exec::ExecArgs;
use commands::grpc::GrpcArgs;
use commands::http::HttpArgs;
use commands::mysql::MysqlArgs;
use commands::redis::RedisArgs;
use commands::tcp::TcpArgs;
use duration::parse_duration;

#[derive(Parser, Debug)]
#[command(
    name = "holdup",
    about = "holdup — wait for TCP, HTTP, DNS, gRPC, Redis and MySQL dependencies",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Debug)]
struct GlobalArgs {
    /// Total wall-clock budget for the whole wait; 0 disables the deadline
    #[arg(short = 't', long, global = true, default_value = "10s", value_parser = parse_duration)]
    timeout: Duration,

    /// Base delay between attempts
    #[arg(short = 'i', long, global = true, default_value = "1s", value_parser = parse_duration)]
    interval: Duration,

    /// Treat probe failure as success (wait for a service to disappear)
    #[arg(short = 'v', long, global = true)]
    invert_check: bool,

    /// Backoff policy between attempts: linear or exponential
    #[arg(long, global = true, default_value = "linear", value_parser = parse_backoff_policy)]
    backoff_policy: BackoffPolicy,

    /// Multiplier for the exponential policy (must be > 1)
    #[arg(long, global = true, default_value_t = 2.0)]
    backoff_coefficient: f64,

    /// Ceiling for the exponential policy
    #[arg(long, global = true, default_value = "5s", value_parser = parse_duration)]
    backoff_exponential_max_interval: Duration,

    /// Suppress all log output
    #[arg(short = 'q', long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check TCP connections
    Tcp(TcpArgs),
    /// Check HTTP(S) resources
    Http(HttpArgs),
    /// Check gRPC health endpoints
    Grpc(GrpcArgs),
    /// Check DNS records
    Dns {
        #[command(subcommand)]
        record: DnsCommands,
    },
    /// Check Redis servers
    Redis(RedisArgs),
    /// Check MySQL servers
    Mysql(MysqlArgs),
    /// Check a command's exit code
    Exec(ExecArgs),
}

impl Commands {
    /// The trailing `-- command [args...]`, when the subcommand carries one.
    fn next_command(&self) -> &[String] {
        match self {
            Commands::Tcp(args) => &args.next.command,
            Commands::Http(args) => &args.next.command,
            Commands::Grpc(args) => &args.next.command,
            Commands::Dns { record } => &record.args().next.command,
            Commands::Redis(args) => &args.next.command,
            Commands::Mysql(args) => &args.next.command,
            Commands::Exec(_) => &[],
        }
    }
}

fn parse_backoff_policy(s: &str) -> Result<BackoffPolicy, String> {
    s.parse()
}

fn init_tracing(quiet: bool) {
    if quiet {
        return;
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.quiet);

    let settings = RunSettings::new()
        .with_timeout(cli.global.timeout)
        .with_interval(cli.global.interval)
        .with_invert_check(cli.global.invert_check)
        .with_backoff_policy(cli.global.backoff_policy)
        .with_backoff_coefficient(cli.global.backoff_coefficient)
        .with_backoff_exponential_max_interval(cli.global.backoff_exponential_max_interval);
    let ctx = RunContext::new().with_settings(settings);

    // Ctrl-C cancels every in-flight waiter.
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.cancel();
            }
        });
    }

    match &cli.command {
        Commands::Tcp(args) => commands::tcp::run(&ctx, args).await?,
        Commands::Http(args) => commands::http::run(&ctx, args).await?,
        Commands::Grpc(args) => commands::grpc::run(&ctx, args).await?,
        Commands::Dns { record } => commands::dns::run(&ctx, record).await?,
        Commands::Redis(args) => commands::redis::run(&ctx, args).await?,
        Commands::Mysql(args) => commands::mysql::run(&ctx, args).await?,
        Commands::Exec(args) => commands::exec::run(&ctx, args).await?,
    }

    let next = cli.command.next_command();
    if !next.is_empty() {
        run_next_command(next)?;
    }

    Ok(())
}

/// Exec the post-success command and propagate its exit status.
fn run_next_command(command: &[String]) -> anyhow::Result<()> {
    use anyhow::Context;

    tracing::info!("Starting the specified command: {}", command.join(" "));
    let status = std::process::Command::new(&command[0])
        .args(&command[1..])
        .status()
        .with_context(|| format!("failed to run {}", command[0]))?;

    std::process::exit(status.code().unwrap_or(1));
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tcp_parses_addresses_and_defaults() {
        let cli = Cli::parse_from(["holdup", "tcp", "127.0.0.1:9090"]);
        assert_eq!(cli.global.timeout, Duration::from_secs(10));
        assert_eq!(cli.global.interval, Duration::from_secs(1));
        match cli.command {
            Commands::Tcp(args) => {
                assert_eq!(args.addresses, vec!["127.0.0.1:9090"]);
                assert_eq!(args.connection_timeout, Duration::from_secs(3));
            }
            _ => panic!("expected the tcp subcommand"),
        }
    }

    #[test]
    fn global_flags_apply_after_the_subcommand() {
        let cli = Cli::parse_from([
            "holdup",
            "tcp",
            "127.0.0.1:9090",
            "-t",
            "1m",
            "--backoff-policy",
            "exponential",
        ]);
        assert_eq!(cli.global.timeout, Duration::from_secs(60));
        assert_eq!(cli.global.backoff_policy, BackoffPolicy::Exponential);
    }

    #[test]
    fn invalid_backoff_policy_is_rejected_at_parse() {
        let result = Cli::try_parse_from([
            "holdup",
            "tcp",
            "127.0.0.1:9090",
            "--backoff-policy",
            "constant",
        ]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("invalid backoff policy: constant"));
    }

    #[test]
    fn trailing_command_is_captured() {
        let cli = Cli::parse_from([
            "holdup", "tcp", "127.0.0.1:9090", "--", "echo", "ready",
        ]);
        assert_eq!(cli.command.next_command(), ["echo", "ready"]);
    }

    #[test]
    fn dns_subcommands_carry_shared_args() {
        let cli = Cli::parse_from([
            "holdup",
            "dns",
            "mx",
            "example.com",
            "--expected-value",
            r"mail\d\.example\.com",
        ]);
        match cli.command {
            Commands::Dns { record } => {
                assert_eq!(record.args().domains, vec!["example.com"]);
                assert_eq!(record.args().expected_values.len(), 1);
            }
            _ => panic!("expected the dns subcommand"),
        }
    }

    #[test]
    fn multiple_addresses_fan_out() {
        let cli = Cli::parse_from([
            "holdup",
            "tcp",
            "db.internal:5432",
            "cache.internal:6379",
            "queue.internal:5672",
        ]);
        match cli.command {
            Commands::Tcp(args) => assert_eq!(args.addresses.len(), 3),
            _ => panic!("expected the tcp subcommand"),
        }
    }

    #[test]
    fn exec_takes_trailing_args() {
        let cli = Cli::parse_from([
            "holdup",
            "exec",
            "pg_isready",
            "--expect-exit-code",
            "0",
            "--",
            "-h",
            "db.internal",
        ]);
        match cli.command {
            Commands::Exec(args) => {
                assert_eq!(args.command, "pg_isready");
                assert_eq!(args.args, ["-h", "db.internal"]);
                assert_eq!(args.expect_exit_code, 0);
            }
            _ => panic!("expected the exec subcommand"),
        }
    }
}
