//! TLS material loading for the HTTP probe.
//!
//! Material is read fresh on every attempt (probes are stateless); any
//! failure to load or parse it is fatal — retrying cannot repair a bad
//! certificate file.

use std::path::Path;

use anyhow::Context;

use holdup_core::CheckError;

/// Optional CA / client keypair paths, applied onto a reqwest builder.
#[derive(Debug)]
pub struct TlsMaterial<'a> {
    pub ca_file: Option<&'a Path>,
    pub cert_file: Option<&'a Path>,
    pub key_file: Option<&'a Path>,
}

impl TlsMaterial<'_> {
    pub fn apply(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, CheckError> {
        if self.cert_file.is_some() || self.key_file.is_some() {
            builder = builder.identity(self.load_identity()?);
        }

        if let Some(ca_file) = self.ca_file {
            let pem = std::fs::read(ca_file)
                .with_context(|| format!("can't read the CA file {}", ca_file.display()))
                .map_err(CheckError::Fatal)?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .context("can't append the CA file")
                .map_err(CheckError::Fatal)?;
            builder = builder.add_root_certificate(certificate);
        }

        Ok(builder)
    }

    /// Client keypair: cert and key PEM concatenated, the form reqwest's
    /// rustls backend expects.
    fn load_identity(&self) -> Result<reqwest::Identity, CheckError> {
        let (Some(cert_file), Some(key_file)) = (self.cert_file, self.key_file) else {
            return Err(CheckError::fatal(anyhow::anyhow!(
                "both cert file and key file are required for client TLS"
            )));
        };

        let mut pem = std::fs::read(cert_file)
            .with_context(|| format!("can't read the cert file {}", cert_file.display()))
            .map_err(CheckError::Fatal)?;
        let key = std::fs::read(key_file)
            .with_context(|| format!("can't read the key file {}", key_file.display()))
            .map_err(CheckError::Fatal)?;
        pem.push(b'\n');
        pem.extend_from_slice(&key);

        reqwest::Identity::from_pem(&pem)
            .context("can't load the client keypair")
            .map_err(CheckError::Fatal)
    }
}
