//! DNS record probes.
//!
//! One checker covers the six supported record families; readiness means
//! the queried name resolves to at least one record and, when expected
//! values are configured, at least one record matches. A and AAAA
//! expectations compare IPs exactly; name and text records treat each
//! expectation as a regex, so `mail\d\.example\.com` works for a pool of
//! MX hosts.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use regex::Regex;

use holdup_core::{CheckError, Checker, ExpectedError};

/// Default per-attempt resolution timeout.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Supported record families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Txt,
}

impl RecordKind {
    fn probe_kind(self) -> &'static str {
        match self {
            RecordKind::A => "DNS A",
            RecordKind::Aaaa => "DNS AAAA",
            RecordKind::Cname => "DNS CNAME",
            RecordKind::Mx => "DNS MX",
            RecordKind::Ns => "DNS NS",
            RecordKind::Txt => "DNS TXT",
        }
    }

    fn mismatch_message(self) -> &'static str {
        match self {
            RecordKind::A => "the A record value doesn't expect",
            RecordKind::Aaaa => "the AAAA record value doesn't expect",
            RecordKind::Cname => "the CNAME record value doesn't expect",
            RecordKind::Mx => "the MX record value doesn't expect",
            RecordKind::Ns => "the NS record value doesn't expect",
            RecordKind::Txt => "the TXT record value doesn't expect",
        }
    }

    fn no_records_message(self) -> &'static str {
        match self {
            RecordKind::A => "no A records found",
            RecordKind::Aaaa => "no AAAA records found",
            RecordKind::Cname => "no CNAME record found",
            RecordKind::Mx => "no MX records found",
            RecordKind::Ns => "no NS records found",
            RecordKind::Txt => "no TXT records found",
        }
    }

    /// IPs match exactly; names and text match as regexes.
    fn matches_exactly(self) -> bool {
        matches!(self, RecordKind::A | RecordKind::Aaaa)
    }
}

/// DNS checker for one domain and record family.
#[derive(Clone, Debug)]
pub struct DnsChecker {
    record: RecordKind,
    domain: String,
    nameserver: Option<String>,
    timeout: Duration,
    expected: Vec<String>,
}

impl DnsChecker {
    pub fn new(record: RecordKind, domain: impl Into<String>) -> Self {
        Self {
            record,
            domain: domain.into(),
            nameserver: None,
            timeout: DEFAULT_RESOLVE_TIMEOUT,
            expected: Vec::new(),
        }
    }

    pub fn a(domain: impl Into<String>) -> Self {
        Self::new(RecordKind::A, domain)
    }

    pub fn aaaa(domain: impl Into<String>) -> Self {
        Self::new(RecordKind::Aaaa, domain)
    }

    pub fn cname(domain: impl Into<String>) -> Self {
        Self::new(RecordKind::Cname, domain)
    }

    pub fn mx(domain: impl Into<String>) -> Self {
        Self::new(RecordKind::Mx, domain)
    }

    pub fn ns(domain: impl Into<String>) -> Self {
        Self::new(RecordKind::Ns, domain)
    }

    pub fn txt(domain: impl Into<String>) -> Self {
        Self::new(RecordKind::Txt, domain)
    }

    /// Query a specific nameserver (`ip:port`, port defaults to 53) over
    /// UDP instead of the system resolver chain.
    pub fn with_nameserver(mut self, nameserver: impl Into<String>) -> Self {
        self.nameserver = Some(nameserver.into());
        self
    }

    /// Per-attempt resolution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Values at least one record must match.
    pub fn with_expected_values(mut self, values: Vec<String>) -> Self {
        self.expected = values;
        self
    }

    fn resolver(&self) -> Result<TokioAsyncResolver, CheckError> {
        let (config, mut opts) = match &self.nameserver {
            Some(nameserver) => {
                let addr = parse_nameserver(nameserver)?;
                let mut config = ResolverConfig::new();
                config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
                (config, ResolverOpts::default())
            }
            None => hickory_resolver::system_conf::read_system_conf().map_err(|e| {
                CheckError::fatal(
                    anyhow::Error::new(e).context("can't read the system resolver configuration"),
                )
            })?,
        };
        opts.timeout = self.timeout;
        Ok(TokioAsyncResolver::tokio(config, opts))
    }

    async fn lookup(&self, resolver: &TokioAsyncResolver) -> Result<Vec<String>, ResolveError> {
        let domain = self.domain.as_str();
        let records = match self.record {
            RecordKind::A => resolver
                .ipv4_lookup(domain)
                .await?
                .iter()
                .map(|a| a.0.to_string())
                .collect(),
            RecordKind::Aaaa => resolver
                .ipv6_lookup(domain)
                .await?
                .iter()
                .map(|aaaa| aaaa.0.to_string())
                .collect(),
            RecordKind::Cname => resolver
                .lookup(domain, RecordType::CNAME)
                .await?
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::CNAME(cname) => Some(normalize_name(&cname.0.to_utf8())),
                    _ => None,
                })
                .collect(),
            RecordKind::Mx => resolver
                .mx_lookup(domain)
                .await?
                .iter()
                .map(|mx| normalize_name(&mx.exchange().to_utf8()))
                .collect(),
            RecordKind::Ns => resolver
                .ns_lookup(domain)
                .await?
                .iter()
                .map(|ns| normalize_name(&ns.0.to_utf8()))
                .collect(),
            RecordKind::Txt => resolver
                .txt_lookup(domain)
                .await?
                .iter()
                .map(|txt| txt.to_string())
                .collect(),
        };
        Ok(records)
    }

    fn classify(&self, err: ResolveError) -> CheckError {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => {
                ExpectedError::new(self.record.no_records_message())
                    .with_cause(err)
                    .with_detail("domain", &self.domain)
                    .into()
            }
            ResolveErrorKind::Timeout => {
                ExpectedError::new("timed out while resolving the dns record")
                    .with_cause(err)
                    .with_detail("timeout", format!("{:?}", self.timeout))
                    .into()
            }
            _ => CheckError::fatal(err),
        }
    }
}

#[async_trait]
impl Checker for DnsChecker {
    fn kind(&self) -> &'static str {
        self.record.probe_kind()
    }

    fn identity(&self) -> Result<String, CheckError> {
        Ok(self.domain.clone())
    }

    async fn check(&self) -> Result<(), CheckError> {
        let resolver = self.resolver()?;

        let records = self
            .lookup(&resolver)
            .await
            .map_err(|err| self.classify(err))?;

        if records.is_empty() {
            return Err(ExpectedError::new(self.record.no_records_message())
                .with_detail("domain", &self.domain)
                .into());
        }

        if records_match(self.record, &records, &self.expected)? {
            return Ok(());
        }

        Err(ExpectedError::new(self.record.mismatch_message())
            .with_detail("actual", records.join(", "))
            .with_detail("expect", self.expected.join(", "))
            .into())
    }
}

/// Whether any resolved record satisfies the expectation list. An empty
/// list accepts any record.
fn records_match(
    kind: RecordKind,
    records: &[String],
    expected: &[String],
) -> Result<bool, CheckError> {
    if expected.is_empty() {
        return Ok(true);
    }

    if kind.matches_exactly() {
        return Ok(records
            .iter()
            .any(|record| expected.iter().any(|want| want == record)));
    }

    for want in expected {
        let regex = Regex::new(want).map_err(|e| {
            CheckError::fatal(anyhow::Error::new(e).context("invalid expected value regex"))
        })?;
        if records.iter().any(|record| regex.is_match(record)) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Domain names compare without the trailing dot and case-insensitively.
fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn parse_nameserver(nameserver: &str) -> Result<SocketAddr, CheckError> {
    if let Ok(addr) = nameserver.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = nameserver.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 53));
    }
    Err(CheckError::fatal(anyhow::anyhow!(
        "invalid nameserver address: {nameserver}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_kinds_name_the_record_family() {
        assert_eq!(DnsChecker::a("example.com").kind(), "DNS A");
        assert_eq!(DnsChecker::txt("example.com").kind(), "DNS TXT");
    }

    #[test]
    fn identity_is_the_domain() {
        let checker = DnsChecker::mx("example.com").with_nameserver("1.1.1.1");
        assert_eq!(checker.identity().unwrap(), "example.com");
    }

    #[test]
    fn ip_records_match_exactly() {
        let records = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];

        assert!(records_match(RecordKind::A, &records, &[]).unwrap());
        assert!(records_match(RecordKind::A, &records, &["10.0.0.2".to_string()]).unwrap());
        assert!(!records_match(RecordKind::A, &records, &["10.0.0.3".to_string()]).unwrap());
        // No regex semantics for IPs: a pattern is just a non-matching string.
        assert!(!records_match(RecordKind::A, &records, &["10\\.0\\..*".to_string()]).unwrap());
    }

    #[test]
    fn name_records_match_as_regex() {
        let records = vec![
            "mail1.example.com".to_string(),
            "mail2.example.com".to_string(),
        ];

        assert!(records_match(RecordKind::Mx, &records, &[r"mail\d\.example\.com".to_string()])
            .unwrap());
        assert!(!records_match(RecordKind::Mx, &records, &["smtp.example.com".to_string()])
            .unwrap());
    }

    #[test]
    fn invalid_expected_regex_is_fatal() {
        let records = vec!["ns1.example.com".to_string()];
        let err = records_match(RecordKind::Ns, &records, &["([broken".to_string()]).unwrap_err();
        assert!(matches!(err, CheckError::Fatal(_)));
    }

    #[test]
    fn names_are_normalized_for_comparison() {
        assert_eq!(normalize_name("Mail.Example.COM."), "mail.example.com");
        assert_eq!(normalize_name("example.com"), "example.com");
    }

    #[test]
    fn nameserver_parsing_defaults_the_port() {
        assert_eq!(
            parse_nameserver("1.1.1.1").unwrap(),
            "1.1.1.1:53".parse().unwrap()
        );
        assert_eq!(
            parse_nameserver("127.0.0.1:5353").unwrap(),
            "127.0.0.1:5353".parse().unwrap()
        );
        assert!(parse_nameserver("dns.example.com").is_err());
    }

    #[tokio::test]
    async fn blackholed_nameserver_fails_the_attempt() {
        // TEST-NET-1 drops the query; the attempt must fail quickly
        // rather than hang.
        let checker = DnsChecker::a("example.com")
            .with_nameserver("192.0.2.1")
            .with_timeout(Duration::from_millis(100));

        assert!(checker.check().await.is_err());
    }

    #[test]
    fn expected_values_last_write_wins() {
        let checker = DnsChecker::a("example.com")
            .with_expected_values(vec!["10.0.0.1".to_string()])
            .with_expected_values(vec!["10.0.0.2".to_string()]);
        assert_eq!(checker.expected, vec!["10.0.0.2".to_string()]);
    }
}
