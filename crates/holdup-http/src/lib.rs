//! HTTP(S) readiness probe.
//!
//! One attempt is one request (GET, or POST when a request body is set)
//! followed by a validation chain over the response: status code, body
//! regex, body JSON path, body XPath, headers — in that order, stopping
//! at the first mismatch. Mismatches and connect-level failures are
//! expected (retriable); unloadable TLS material and unclassifiable
//! transport errors are fatal.

mod expect;
mod tls;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use regex::Regex;
use url::Url;

use holdup_core::error::is_connection_refused;
use holdup_core::{CheckError, Checker, ExpectedError};

use expect::{json_path_exists, truncate_body, HeaderExpectation, BODY_EXCERPT_LIMIT};
pub use tls::TlsMaterial;

/// Default per-attempt request timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// HTTP checker for one URL.
///
/// All tunables are fixed at construction; the closed option set below is
/// the full surface. Option application is last-write-wins.
#[derive(Clone, Debug, Default)]
pub struct HttpChecker {
    address: String,
    timeout: Duration,
    expect_status_code: Option<u16>,
    expect_body_regex: Option<String>,
    expect_body_json: Option<String>,
    expect_body_xpath: Option<String>,
    expect_header: Option<String>,
    request_headers: HeaderMap,
    request_body: Option<String>,
    insecure_skip_tls_verify: bool,
    no_redirect: bool,
    ca_file: Option<PathBuf>,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    h2c: bool,
}

impl HttpChecker {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_CONNECTION_TIMEOUT,
            ..Self::default()
        }
    }

    /// Per-attempt request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exact status code the response must carry.
    pub fn with_expect_status_code(mut self, code: u16) -> Self {
        self.expect_status_code = Some(code);
        self
    }

    /// Regex the response body must match.
    pub fn with_expect_body_regex(mut self, regex: impl Into<String>) -> Self {
        self.expect_body_regex = Some(regex.into());
        self
    }

    /// Dot-separated JSON path that must resolve in the response body.
    pub fn with_expect_body_json(mut self, path: impl Into<String>) -> Self {
        self.expect_body_json = Some(path.into());
        self
    }

    /// XPath expression whose node set must be non-empty for the body.
    pub fn with_expect_body_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.expect_body_xpath = Some(xpath.into());
        self
    }

    /// Header expectation: `Name` (present) or `Name=regex`.
    pub fn with_expect_header(mut self, header: impl Into<String>) -> Self {
        self.expect_header = Some(header.into());
        self
    }

    /// Replace the request headers wholesale.
    pub fn with_request_headers(mut self, headers: HeaderMap) -> Self {
        self.request_headers = headers;
        self
    }

    /// Append one request header.
    pub fn with_request_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request_headers.append(name, value);
        self
    }

    /// Request body; its presence switches the method to POST.
    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    /// Disable TLS peer verification.
    pub fn with_insecure_skip_tls_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_tls_verify = skip;
        self
    }

    /// Disable automatic redirect following.
    pub fn with_no_redirect(mut self, no_redirect: bool) -> Self {
        self.no_redirect = no_redirect;
        self
    }

    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    pub fn with_cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_file = Some(path.into());
        self
    }

    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Allow prior-knowledge HTTP/2 over cleartext. Only takes effect for
    /// http:// URLs with redirects disabled and no environment proxy —
    /// h2c cannot share a transport with an https fallback through a
    /// proxy, and redirects may cross schemes.
    pub fn with_h2c(mut self, h2c: bool) -> Self {
        self.h2c = h2c;
        self
    }

    fn build_client(&self) -> Result<reqwest::Client, CheckError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(self.timeout)
            .connect_timeout(self.timeout);

        if self.no_redirect {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        if self.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        } else {
            let material = TlsMaterial {
                ca_file: self.ca_file.as_deref(),
                cert_file: self.cert_file.as_deref(),
                key_file: self.key_file.as_deref(),
            };
            builder = material.apply(builder)?;
        }

        if self.h2c_applies() {
            builder = builder.http2_prior_knowledge();
        }

        builder.build().map_err(CheckError::fatal)
    }

    fn h2c_applies(&self) -> bool {
        if !self.h2c || !self.no_redirect {
            return false;
        }
        let Ok(url) = Url::parse(&self.address) else {
            return false;
        };
        url.scheme() == "http" && !env_proxy_applies(&url)
    }

    fn validate_response(
        &self,
        status: http::StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> Result<(), CheckError> {
        if let Some(expect) = self.expect_status_code {
            if status.as_u16() != expect {
                return Err(ExpectedError::new("the status code doesn't expect")
                    .with_detail("actual", status.as_u16().to_string())
                    .with_detail("expect", expect.to_string())
                    .into());
            }
        }

        if let Some(pattern) = &self.expect_body_regex {
            let regex = Regex::new(pattern)
                .map_err(|e| CheckError::fatal(anyhow::Error::new(e).context("invalid body regex")))?;
            if !regex.is_match(body) {
                return Err(ExpectedError::new("the body doesn't expect")
                    .with_detail("actual", truncate_body(body, BODY_EXCERPT_LIMIT))
                    .with_detail("expect", pattern)
                    .into());
            }
        }

        if let Some(path) = &self.expect_body_json {
            if !json_path_exists(body, path) {
                return Err(ExpectedError::new("the JSON doesn't match")
                    .with_detail("actual", truncate_body(body, BODY_EXCERPT_LIMIT))
                    .with_detail("expect", path)
                    .into());
            }
        }

        if let Some(xpath) = &self.expect_body_xpath {
            if !xpath_matches(body, xpath)? {
                return Err(ExpectedError::new("the XPath doesn't match")
                    .with_detail("actual", truncate_body(body, BODY_EXCERPT_LIMIT))
                    .with_detail("expect", xpath)
                    .into());
            }
        }

        if let Some(expression) = &self.expect_header {
            self.validate_header(expression, headers)?;
        }

        Ok(())
    }

    fn validate_header(&self, expression: &str, headers: &HeaderMap) -> Result<(), CheckError> {
        let expectation = HeaderExpectation::parse(expression);

        if let Some(pattern) = expectation.value_pattern {
            let regex = Regex::new(pattern).map_err(|e| {
                CheckError::fatal(anyhow::Error::new(e).context("invalid header regex"))
            })?;
            let value = headers
                .get(expectation.name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !regex.is_match(value) {
                return Err(
                    ExpectedError::new("the http header key and value doesn't expect")
                        .with_detail("actual", value)
                        .with_detail("expect", expression)
                        .into(),
                );
            }
        }

        if !headers.contains_key(expectation.name) {
            let present: Vec<&str> = headers.keys().map(|k| k.as_str()).collect();
            return Err(ExpectedError::new("the http header key doesn't expect")
                .with_detail("actual", present.join(", "))
                .with_detail("expect", expression)
                .into());
        }

        Ok(())
    }
}

#[async_trait]
impl Checker for HttpChecker {
    fn kind(&self) -> &'static str {
        "HTTP"
    }

    fn identity(&self) -> Result<String, CheckError> {
        Ok(self.address.clone())
    }

    async fn check(&self) -> Result<(), CheckError> {
        let client = self.build_client()?;

        let method = if self.request_body.is_some() {
            reqwest::Method::POST
        } else {
            reqwest::Method::GET
        };

        let mut request = client
            .request(method, &self.address)
            .headers(self.request_headers.clone());
        if let Some(body) = &self.request_body {
            request = request.body(body.clone());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                return Err(ExpectedError::new("timed out while making an http call")
                    .with_cause(err)
                    .with_detail("timeout", format!("{:?}", self.timeout))
                    .into());
            }
            Err(err) if is_connection_refused(&err) => {
                return Err(ExpectedError::new("failed to establish an http connection")
                    .with_cause(err)
                    .with_detail("address", &self.address)
                    .into());
            }
            Err(err) => return Err(CheckError::fatal(err)),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let needs_body = self.expect_body_regex.is_some()
            || self.expect_body_json.is_some()
            || self.expect_body_xpath.is_some();
        let body = if needs_body {
            response.text().await.map_err(CheckError::fatal)?
        } else {
            String::new()
        };

        self.validate_response(status, &headers, &body)
    }
}

/// Whether the XPath's node set is non-empty for `body` parsed as XML.
///
/// A body that does not parse is a content mismatch, not a transport
/// problem, so it reports as "doesn't match". A malformed expression is
/// a configuration error and fatal.
fn xpath_matches(body: &str, xpath: &str) -> Result<bool, CheckError> {
    let Ok(package) = sxd_document::parser::parse(body) else {
        return Ok(false);
    };
    let document = package.as_document();

    let compiled = sxd_xpath::Factory::new()
        .build(xpath)
        .map_err(|e| CheckError::fatal(anyhow::Error::new(e).context("invalid xpath expression")))?
        .ok_or_else(|| CheckError::fatal(anyhow::anyhow!("empty xpath expression")))?;

    let context = sxd_xpath::Context::new();
    let value = compiled
        .evaluate(&context, document.root())
        .map_err(|e| CheckError::fatal(anyhow::Error::new(e).context("xpath evaluation failed")))?;

    match value {
        sxd_xpath::Value::Nodeset(nodes) => Ok(nodes.size() > 0),
        _ => Ok(false),
    }
}

/// Whether an environment proxy would intercept requests to `url`.
///
/// Only the subset the h2c guard needs: `HTTP_PROXY`/`ALL_PROXY` (and
/// lowercase forms) enable proxying, `NO_PROXY` entries exempt a host by
/// exact or dot-suffix match, `*` exempts everything.
fn env_proxy_applies(url: &Url) -> bool {
    let proxy_set = ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]
        .iter()
        .any(|key| std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false));
    if !proxy_set {
        return false;
    }

    let Some(host) = url.host_str() else {
        return true;
    };
    let no_proxy = std::env::var("NO_PROXY")
        .or_else(|_| std::env::var("no_proxy"))
        .unwrap_or_default();

    for entry in no_proxy.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if entry == "*" {
            return false;
        }
        let suffix = entry.trim_start_matches('.');
        if host == suffix || host.ends_with(&format!(".{suffix}")) {
            return false;
        }
    }

    true
}
