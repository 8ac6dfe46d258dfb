//! `holdup http ADDRESS... [flags] [-- command [args...]]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use http::header::{HeaderMap, HeaderName, HeaderValue};

use holdup_core::{Checker, RunContext};
use holdup_http::HttpChecker;

use crate::duration::parse_duration;

use super::NextCommand;

/// Check HTTP(S) resources
#[derive(Args, Debug)]
#[command(
    after_help = "Examples:\n  holdup http https://api.internal/healthz --expect-status-code 200\n  holdup http http://gateway:8080 --expect-body-json status.ready -t 2m"
)]
pub struct HttpArgs {
    /// URLs to probe
    #[arg(required = true, value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Per-attempt request timeout
    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    pub connection_timeout: Duration,

    /// Exact status code the response must carry
    #[arg(long)]
    pub expect_status_code: Option<u16>,

    /// Regex the response body must match
    #[arg(long)]
    pub expect_body_regex: Option<String>,

    /// Dot-separated JSON path that must resolve in the body
    #[arg(long)]
    pub expect_body_json: Option<String>,

    /// XPath whose node set must be non-empty for the body
    #[arg(long)]
    pub expect_body_xpath: Option<String>,

    /// Header expectation: "Name" or "Name=regex"
    #[arg(long)]
    pub expect_header: Option<String>,

    /// Request header "Name: value", repeatable
    #[arg(long = "request-header", value_name = "HEADER")]
    pub request_headers: Vec<String>,

    /// Request body; switches the method to POST
    #[arg(long)]
    pub request_body: Option<String>,

    /// Skip TLS peer verification
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,

    /// Do not follow redirects
    #[arg(long)]
    pub no_redirect: bool,

    /// CA bundle to trust (PEM)
    #[arg(long, value_name = "PATH")]
    pub ca_file: Option<PathBuf>,

    /// Client certificate (PEM)
    #[arg(long, value_name = "PATH")]
    pub cert_file: Option<PathBuf>,

    /// Client key (PEM)
    #[arg(long, value_name = "PATH")]
    pub key_file: Option<PathBuf>,

    /// Prior-knowledge HTTP/2 over cleartext (needs --no-redirect)
    #[arg(long)]
    pub h2c: bool,

    #[command(flatten)]
    pub next: NextCommand,
}

pub async fn run(ctx: &RunContext, args: &HttpArgs) -> anyhow::Result<()> {
    let request_headers = parse_request_headers(&args.request_headers)?;

    let checkers = args
        .addresses
        .iter()
        .map(|address| {
            let mut checker = HttpChecker::new(address)
                .with_timeout(args.connection_timeout)
                .with_request_headers(request_headers.clone())
                .with_insecure_skip_tls_verify(args.insecure_skip_tls_verify)
                .with_no_redirect(args.no_redirect)
                .with_h2c(args.h2c);

            if let Some(code) = args.expect_status_code {
                checker = checker.with_expect_status_code(code);
            }
            if let Some(regex) = &args.expect_body_regex {
                checker = checker.with_expect_body_regex(regex);
            }
            if let Some(path) = &args.expect_body_json {
                checker = checker.with_expect_body_json(path);
            }
            if let Some(xpath) = &args.expect_body_xpath {
                checker = checker.with_expect_body_xpath(xpath);
            }
            if let Some(header) = &args.expect_header {
                checker = checker.with_expect_header(header);
            }
            if let Some(body) = &args.request_body {
                checker = checker.with_request_body(body);
            }
            if let Some(path) = &args.ca_file {
                checker = checker.with_ca_file(path);
            }
            if let Some(path) = &args.cert_file {
                checker = checker.with_cert_file(path);
            }
            if let Some(path) = &args.key_file {
                checker = checker.with_key_file(path);
            }

            Arc::new(checker) as Arc<dyn Checker>
        })
        .collect();

    super::run(ctx, checkers).await
}

fn parse_request_headers(raw: &[String]) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once(':')
            .with_context(|| format!("invalid request header (want \"Name: value\"): {entry}"))?;
        let name: HeaderName = name
            .trim()
            .parse()
            .with_context(|| format!("invalid request header name: {name}"))?;
        let value: HeaderValue = value
            .trim()
            .parse()
            .with_context(|| format!("invalid request header value in: {entry}"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_headers_parse_name_and_value() {
        let headers =
            parse_request_headers(&["Authorization: Bearer token".to_string()]).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
    }

    #[test]
    fn repeated_headers_accumulate() {
        let headers = parse_request_headers(&[
            "Accept: application/json".to_string(),
            "Accept: text/plain".to_string(),
        ])
        .unwrap();
        assert_eq!(headers.get_all("accept").iter().count(), 2);
    }

    #[test]
    fn header_without_colon_is_rejected() {
        assert!(parse_request_headers(&["Authorization".to_string()]).is_err());
    }
}
