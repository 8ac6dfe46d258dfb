//! gRPC standard health check probe.
//!
//! Dials `host:port` (plain or TLS), issues one `grpc.health.v1/Check`
//! for the configured service (empty = whole server), and maps the
//! serving status: SERVING is ready, everything else is "not serving
//! yet". Connect-level failures classify like any socket probe —
//! refused/timeout are expected, the rest fatal.

mod stream;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use holdup_core::error::{is_connection_refused, is_timed_out};
use holdup_core::{CheckError, Checker, ExpectedError};

use stream::ProbeStream;

/// Default per-attempt dial/call timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// gRPC health checker for one `host:port` address.
#[derive(Clone, Debug)]
pub struct GrpcChecker {
    address: String,
    timeout: Duration,
    insecure_transport: bool,
    insecure_skip_tls_verify: bool,
    service_name: Option<String>,
}

impl GrpcChecker {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_CONNECTION_TIMEOUT,
            insecure_transport: false,
            insecure_skip_tls_verify: false,
            service_name: None,
        }
    }

    /// Per-attempt timeout, bounding both the dial and the health call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dial without TLS.
    pub fn with_insecure_transport(mut self, insecure: bool) -> Self {
        self.insecure_transport = insecure;
        self
    }

    /// Keep TLS but skip peer verification.
    pub fn with_insecure_skip_tls_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_tls_verify = skip;
        self
    }

    /// Health-check a named service instead of the whole server.
    pub fn with_service_name(mut self, service: impl Into<String>) -> Self {
        self.service_name = Some(service.into());
        self
    }

    fn tls(&self) -> Result<Option<(tokio_rustls::TlsConnector, rustls::pki_types::ServerName<'static>)>, CheckError>
    {
        if self.insecure_transport {
            return Ok(None);
        }

        let host = self
            .address
            .rsplit_once(':')
            .map(|(host, _port)| host)
            .unwrap_or(self.address.as_str());
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| CheckError::fatal(anyhow::Error::new(e).context("invalid server name")))?;

        let mut config = if self.insecure_skip_tls_verify {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
                .with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        };
        // gRPC is HTTP/2 only.
        config.alpn_protocols = vec![b"h2".to_vec()];

        Ok(Some((
            tokio_rustls::TlsConnector::from(Arc::new(config)),
            server_name,
        )))
    }

    async fn connect(&self) -> Result<Channel, CheckError> {
        // The dial future bounds its own connect/handshake time, so the
        // endpoint carries no competing timers.
        let endpoint = Endpoint::from_shared(format!("http://{}", self.address))
            .map_err(|e| CheckError::fatal(anyhow::Error::new(e).context("invalid grpc address")))?;

        let tls = self.tls()?;
        let address = self.address.clone();
        let timeout = self.timeout;
        let connector = tower::service_fn(move |_: Uri| {
            let address = address.clone();
            let tls = tls.clone();
            async move {
                dial(&address, timeout, tls)
                    .await
                    .map(hyper_util::rt::TokioIo::new)
            }
        });

        // The dial bounds TCP/TLS setup; this bounds the HTTP/2
        // handshake on a server that accepts but never speaks.
        match tokio::time::timeout(self.timeout, endpoint.connect_with_connector(connector)).await
        {
            Ok(Ok(channel)) => Ok(channel),
            Ok(Err(err)) => Err(self.classify_connect_error(err)),
            Err(_elapsed) => Err(ExpectedError::new("timed out while making a grpc call")
                .with_detail("timeout", format!("{:?}", self.timeout))
                .into()),
        }
    }

    fn classify_connect_error(&self, err: tonic::transport::Error) -> CheckError {
        if is_connection_refused(&err) {
            ExpectedError::new("failed to establish a grpc connection")
                .with_cause(err)
                .with_detail("address", &self.address)
                .into()
        } else if is_timed_out(&err) {
            ExpectedError::new("timed out while making a grpc call")
                .with_cause(err)
                .with_detail("timeout", format!("{:?}", self.timeout))
                .into()
        } else {
            CheckError::fatal(err)
        }
    }
}

#[async_trait]
impl Checker for GrpcChecker {
    fn kind(&self) -> &'static str {
        "GRPC"
    }

    fn identity(&self) -> Result<String, CheckError> {
        match &self.service_name {
            Some(service) => Ok(format!("{} (service: {service})", self.address)),
            None => Ok(self.address.clone()),
        }
    }

    async fn check(&self) -> Result<(), CheckError> {
        let channel = self.connect().await?;
        let mut client = HealthClient::new(channel);

        let request = HealthCheckRequest {
            service: self.service_name.clone().unwrap_or_default(),
        };

        let response = match tokio::time::timeout(self.timeout, client.check(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(status)) if status.code() == tonic::Code::NotFound => {
                // The server does not know the service (yet) — the health
                // protocol's SERVICE_UNKNOWN case.
                return Err(ExpectedError::new("service is not serving")
                    .with_detail("status", ServingStatus::ServiceUnknown.as_str_name())
                    .with_detail("expected", ServingStatus::Serving.as_str_name())
                    .with_detail("service", self.service_name.clone().unwrap_or_default())
                    .into());
            }
            Ok(Err(status)) => {
                return Err(ExpectedError::new("health check failed")
                    .with_cause(status)
                    .with_detail("service", self.service_name.clone().unwrap_or_default())
                    .into());
            }
            Err(_elapsed) => {
                return Err(ExpectedError::new("timed out while making a grpc call")
                    .with_detail("timeout", format!("{:?}", self.timeout))
                    .into());
            }
        };

        let status = response.into_inner().status();
        if status != ServingStatus::Serving {
            let mut err = ExpectedError::new("service is not serving")
                .with_detail("status", status.as_str_name())
                .with_detail("expected", ServingStatus::Serving.as_str_name());
            if let Some(service) = &self.service_name {
                err = err.with_detail("service", service);
            }
            return Err(err.into());
        }

        Ok(())
    }
}

async fn dial(
    address: &str,
    timeout: Duration,
    tls: Option<(tokio_rustls::TlsConnector, rustls::pki_types::ServerName<'static>)>,
) -> std::io::Result<ProbeStream> {
    let timed_out = || std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timed out");

    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| timed_out())??;

    match tls {
        None => Ok(ProbeStream::Plain(stream)),
        Some((connector, server_name)) => {
            let tls_stream = tokio::time::timeout(timeout, connector.connect(server_name, stream))
                .await
                .map_err(|_| timed_out())??;
            Ok(ProbeStream::Tls(Box::new(tls_stream)))
        }
    }
}

/// Certificate verifier that accepts any peer. Signatures are still
/// checked so the handshake shape stays honest.
#[derive(Debug)]
struct NoVerification(rustls::crypto::CryptoProvider);

impl NoVerification {
    fn new() -> Self {
        Self(rustls::crypto::ring::default_provider())
    }
}

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
