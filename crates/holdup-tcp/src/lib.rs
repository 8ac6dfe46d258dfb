//! Plain TCP connect probe.
//!
//! Readiness means the remote accepts a TCP connection within the
//! per-attempt timeout. The connection is closed immediately — one probe
//! is one connect, nothing more.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use holdup_core::error::is_connection_refused;
use holdup_core::{CheckError, Checker, ExpectedError};

/// Default per-attempt connection timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// TCP checker for one `host:port` address.
#[derive(Clone, Debug)]
pub struct TcpChecker {
    address: String,
    timeout: Duration,
}

impl TcpChecker {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Per-attempt connection timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Checker for TcpChecker {
    fn kind(&self) -> &'static str {
        "TCP"
    }

    fn identity(&self) -> Result<String, CheckError> {
        Ok(self.address.clone())
    }

    async fn check(&self) -> Result<(), CheckError> {
        let connect = TcpStream::connect(&self.address);

        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(err)) if is_connection_refused(&err) => {
                Err(ExpectedError::new("failed to establish a tcp connection")
                    .with_cause(err)
                    .with_detail("address", &self.address)
                    .into())
            }
            Ok(Err(err)) => Err(CheckError::fatal(err)),
            Err(_elapsed) => Err(ExpectedError::new("timed out while making a tcp connection")
                .with_detail("timeout", format!("{:?}", self.timeout))
                .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_is_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let checker = TcpChecker::new(addr.to_string());
        checker.check().await.unwrap();
    }

    #[tokio::test]
    async fn closed_port_is_expected_failure() {
        // Bind then drop to find a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = TcpChecker::new(addr.to_string());
        let err = checker.check().await.unwrap_err();

        match err {
            CheckError::Expected(expected) => {
                assert_eq!(expected.to_string(), "failed to establish a tcp connection");
                let pairs: Vec<_> = expected.details().iter().collect();
                assert_eq!(pairs, vec![("address", addr.to_string().as_str())]);
            }
            other => panic!("expected an expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unroutable_address_times_out() {
        // TEST-NET-1 (RFC 5737) is reserved and does not answer.
        let checker =
            TcpChecker::new("192.0.2.1:81").with_timeout(Duration::from_millis(100));

        let err = checker.check().await.unwrap_err();

        match err {
            CheckError::Expected(expected) => {
                assert_eq!(
                    expected.to_string(),
                    "timed out while making a tcp connection"
                );
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[test]
    fn identity_is_the_address() {
        let checker = TcpChecker::new("127.0.0.1:9090");
        assert_eq!(checker.identity().unwrap(), "127.0.0.1:9090");
        assert_eq!(checker.kind(), "TCP");
    }

    #[test]
    fn timeout_option_last_write_wins() {
        let checker = TcpChecker::new("127.0.0.1:9090")
            .with_timeout(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(checker.timeout, Duration::from_secs(5));
    }
}
