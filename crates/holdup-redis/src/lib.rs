//! Redis readiness probe.
//!
//! One attempt = TCP connect, optional `AUTH`, inline `PING`, expect
//! `+PONG\r\n`. The probe speaks just enough RESP for the handshake —
//! everything beyond the PONG is none of its business.
//!
//! ```text
//! Client → Server:
//!   AUTH <password>\r\n   (only when the URL carries a password)
//!   PING\r\n              (inline command format)
//!
//! Server → Client:
//!   +OK\r\n               (AUTH accepted)
//!   +PONG\r\n             (RESP Simple String response)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use holdup_core::error::is_connection_refused;
use holdup_core::{CheckError, Checker, ExpectedError};

/// Default per-attempt timeout, bounding connect and each reply read.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Redis PING command in inline format (simplest, universally supported).
const REDIS_PING: &[u8] = b"PING\r\n";

/// Expected PONG response (RESP Simple String).
const REDIS_PONG: &[u8] = b"+PONG\r\n";

/// Redis checker for one `redis://` URL or bare `host:port`.
#[derive(Clone, Debug)]
pub struct RedisChecker {
    address: String,
    timeout: Duration,
}

/// Connection target parsed out of the address: endpoint plus optional
/// password. Never carries the raw URL onward, so credentials stay out
/// of identities and details.
#[derive(Debug, PartialEq, Eq)]
struct Target {
    endpoint: String,
    password: Option<String>,
}

impl RedisChecker {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn target(&self) -> Result<Target, CheckError> {
        if !self.address.contains("://") {
            return Ok(Target {
                endpoint: self.address.clone(),
                password: None,
            });
        }

        let url = Url::parse(&self.address).map_err(|e| {
            CheckError::fatal(anyhow::Error::new(e).context("can't retrieve the checker identity"))
        })?;
        if url.scheme() != "redis" {
            return Err(CheckError::fatal(anyhow::anyhow!(
                "unsupported redis scheme: {}",
                url.scheme()
            )));
        }
        let host = url.host_str().ok_or_else(|| {
            CheckError::fatal(anyhow::anyhow!("redis URL is missing a host"))
        })?;
        let port = url.port().unwrap_or(6379);

        Ok(Target {
            endpoint: format!("{host}:{port}"),
            password: url.password().map(str::to_string),
        })
    }

    async fn command(
        &self,
        stream: &mut TcpStream,
        command: &[u8],
    ) -> Result<Vec<u8>, CheckError> {
        stream.write_all(command).await.map_err(CheckError::fatal)?;

        let mut buf = [0u8; 512];
        let n = tokio::time::timeout(self.timeout, stream.read(&mut buf))
            .await
            .map_err(|_| {
                ExpectedError::new("timed out while making a redis call")
                    .with_detail("timeout", format!("{:?}", self.timeout))
            })?
            .map_err(CheckError::fatal)?;

        if n == 0 {
            return Err(ExpectedError::new("redis server closed the connection").into());
        }
        Ok(buf[..n].to_vec())
    }
}

#[async_trait]
impl Checker for RedisChecker {
    fn kind(&self) -> &'static str {
        "Redis"
    }

    fn identity(&self) -> Result<String, CheckError> {
        Ok(self.target()?.endpoint)
    }

    async fn check(&self) -> Result<(), CheckError> {
        let target = self.target()?;

        let mut stream = match tokio::time::timeout(
            self.timeout,
            TcpStream::connect(&target.endpoint),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) if is_connection_refused(&err) => {
                return Err(ExpectedError::new("failed to establish a redis connection")
                    .with_cause(err)
                    .with_detail("address", &target.endpoint)
                    .into());
            }
            Ok(Err(err)) => return Err(CheckError::fatal(err)),
            Err(_elapsed) => {
                return Err(ExpectedError::new("timed out while making a redis call")
                    .with_detail("timeout", format!("{:?}", self.timeout))
                    .into());
            }
        };

        if let Some(password) = &target.password {
            let auth = format!("AUTH {password}\r\n");
            let reply = self.command(&mut stream, auth.as_bytes()).await?;
            if !reply.starts_with(b"+OK") {
                return Err(ExpectedError::new("failed to authenticate to redis")
                    .with_detail("actual", String::from_utf8_lossy(&reply).trim().to_string())
                    .into());
            }
        }

        let reply = self.command(&mut stream, REDIS_PING).await?;
        if reply != REDIS_PONG {
            return Err(ExpectedError::new("redis is not responding to PING")
                .with_detail("actual", String::from_utf8_lossy(&reply).trim().to_string())
                .with_detail("expect", "+PONG")
                .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    /// Mock Redis answering PING with `+PONG` and AUTH against a fixed
    /// password.
    async fn spawn_mock_redis(password: Option<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 512];
                    loop {
                        let Ok(n) = stream.read(&mut buf).await else {
                            break;
                        };
                        if n == 0 {
                            break;
                        }
                        let received = &buf[..n];
                        let reply: Vec<u8> = if received == b"PING\r\n" {
                            b"+PONG\r\n".to_vec()
                        } else if let Some(expected) = password {
                            if received == format!("AUTH {expected}\r\n").as_bytes() {
                                b"+OK\r\n".to_vec()
                            } else {
                                b"-ERR invalid password\r\n".to_vec()
                            }
                        } else {
                            b"-ERR unknown command\r\n".to_vec()
                        };
                        if stream.write_all(&reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr.to_string()
    }

    fn expected(err: CheckError) -> ExpectedError {
        match err {
            CheckError::Expected(e) => e,
            other => panic!("expected an expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_pong_is_ready() {
        let address = spawn_mock_redis(None).await;
        RedisChecker::new(address).check().await.unwrap();
    }

    #[tokio::test]
    async fn url_with_password_authenticates_first() {
        let address = spawn_mock_redis(Some("sekret")).await;
        RedisChecker::new(format!("redis://:sekret@{address}"))
            .check()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wrong_password_is_expected_failure() {
        let address = spawn_mock_redis(Some("sekret")).await;
        let err = RedisChecker::new(format!("redis://:wrong@{address}"))
            .check()
            .await
            .unwrap_err();

        assert_eq!(expected(err).to_string(), "failed to authenticate to redis");
    }

    #[tokio::test]
    async fn connection_refused_is_expected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = RedisChecker::new(addr.to_string()).check().await.unwrap_err();
        assert_eq!(
            expected(err).to_string(),
            "failed to establish a redis connection"
        );
    }

    #[tokio::test]
    async fn non_pong_reply_is_expected_failure() {
        // A mock that answers everything with an error.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 512];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream.write_all(b"-LOADING Redis is loading the dataset\r\n").await;
                });
            }
        });

        let err = RedisChecker::new(addr.to_string()).check().await.unwrap_err();
        let err = expected(err);
        assert_eq!(err.to_string(), "redis is not responding to PING");
        assert!(err.details().to_string().contains("LOADING"));
    }

    #[test]
    fn identity_hides_the_password() {
        let checker = RedisChecker::new("redis://:sekret@cache.internal:6380/0");
        assert_eq!(checker.identity().unwrap(), "cache.internal:6380");
    }

    #[test]
    fn bare_host_port_is_accepted() {
        let checker = RedisChecker::new("127.0.0.1:6379");
        assert_eq!(checker.identity().unwrap(), "127.0.0.1:6379");
    }

    #[test]
    fn malformed_url_fails_identity() {
        let checker = RedisChecker::new("redis://cache host:6379");
        assert!(matches!(
            checker.identity().unwrap_err(),
            CheckError::Fatal(_)
        ));
    }

    #[test]
    fn unsupported_scheme_is_fatal() {
        let checker = RedisChecker::new("memcached://127.0.0.1:11211");
        assert!(matches!(
            checker.identity().unwrap_err(),
            CheckError::Fatal(_)
        ));
    }
}
