//! mTLS clients for calls to paired engines.
//!
//! The session authority that signed `client.crt` is discarded when the
//! pairing window closes, so there is nothing to pin the engine's server
//! certificate against. Server verification is disabled; the client
//! certificate is what authenticates the console.

use std::path::PathBuf;
use std::time::Duration;

use onyx_auth::{CertificateInfo, IssuedCertificate};

use crate::error::ClientError;
use crate::handshake::host_port;
use crate::identity::IdentityStore;

/// Timeout for administrative calls.
pub const ADMIN_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds reqwest clients presenting the console's paired identity.
#[derive(Debug, Clone)]
pub struct MtlsClientFactory {
    certificate: IssuedCertificate,
    key_pem: String,
    timeout: Duration,
}

impl MtlsClientFactory {
    /// Load `client.crt` and `client.key` from `store`.
    ///
    /// A console that has never paired gets `PersistenceFailure` naming
    /// the missing file.
    pub fn from_store(store: &IdentityStore) -> Result<Self, ClientError> {
        let not_paired = |path: PathBuf| {
            ClientError::persistence(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "console is not paired"),
            )
        };
        let key = store
            .load_key()?
            .ok_or_else(|| not_paired(store.key_path()))?;
        let certificate = store
            .load_certificate()?
            .ok_or_else(|| not_paired(store.cert_path()))?;

        let info = certificate.inspect()?;
        if !key.owns(&info.public_key) {
            return Err(ClientError::KeyMismatch);
        }

        Ok(Self {
            certificate,
            key_pem: key.to_pkcs8_pem()?.to_string(),
            timeout: ADMIN_CALL_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn certificate(&self) -> &IssuedCertificate {
        &self.certificate
    }

    pub fn certificate_info(&self) -> Result<CertificateInfo, ClientError> {
        Ok(self.certificate.inspect()?)
    }

    pub fn build(&self) -> Result<reqwest::Client, ClientError> {
        let mut pem = self.certificate.as_pem().to_string();
        if !pem.ends_with('\n') {
            pem.push('\n');
        }
        pem.push_str(&self.key_pem);

        let identity = reqwest::Identity::from_pem(pem.as_bytes())
            .map_err(|e| ClientError::Client(format!("invalid client identity: {e}")))?;

        reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .danger_accept_invalid_certs(true)
            .timeout(self.timeout)
            .build()
            .map_err(|e| ClientError::Client(e.to_string()))
    }
}

/// `https://<address>:<port>` for a paired engine.
pub fn engine_base_url(address: &str, port: u16) -> String {
    format!("https://{}", host_port(address, port))
}
