//! The console half of the pairing exchange.

use std::net::IpAddr;
use std::time::Duration;

use onyx_auth::pairing::{PAIR_PATH, PEM_CONTENT_TYPE, TOKEN_HEADER};
use onyx_auth::{IssuedCertificate, PairingToken, SigningRequest};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::error::ClientError;

/// Round-trip limit for one pairing request.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Plain HTTP client for engine pairing endpoints.
#[derive(Debug, Clone)]
pub struct PairingClient {
    http: reqwest::Client,
}

impl PairingClient {
    pub fn new() -> Result<Self, ClientError> {
        Self::with_timeout(HANDSHAKE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Client(e.to_string()))?;
        Ok(Self { http })
    }

    /// Exchange `request` for a certificate signed by the engine's session
    /// authority.
    ///
    /// The token goes out both as a bearer credential and in the
    /// `X-Onyx-Token` header.
    pub async fn handshake(
        &self,
        address: &str,
        port: u16,
        token: &PairingToken,
        request: &SigningRequest,
    ) -> Result<IssuedCertificate, ClientError> {
        let url = pairing_url(address, port);
        let token = token.to_display_string();
        tracing::debug!(%url, "Sending signing request");

        let connection_error = |source| ClientError::ConnectionError {
            url: url.clone(),
            source,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header(TOKEN_HEADER, &token)
            .header(CONTENT_TYPE, PEM_CONTENT_TYPE)
            .body(request.as_pem().to_string())
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        let body = response.text().await.map_err(connection_error)?;

        if status != StatusCode::OK {
            let reason = match body.trim() {
                "" => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
                reason => reason.to_string(),
            };
            tracing::debug!(status = status.as_u16(), %reason, "Pairing rejected");
            return Err(ClientError::PairingRejected {
                status: status.as_u16(),
                reason,
            });
        }

        Ok(IssuedCertificate::from_pem(body)?)
    }
}

/// `http://<address>:<port>/pair`.
pub fn pairing_url(address: &str, port: u16) -> String {
    format!("http://{}{PAIR_PATH}", host_port(address, port))
}

/// `<address>:<port>`, bracketing IPv6 literals.
pub fn host_port(address: &str, port: u16) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{v6}]:{port}"),
        _ => format!("{address}:{port}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_url() {
        assert_eq!(
            pairing_url("192.168.1.10", 2305),
            "http://192.168.1.10:2305/pair"
        );
        assert_eq!(pairing_url("::1", 2305), "http://[::1]:2305/pair");
        assert_eq!(
            pairing_url("engine.lan", 9000),
            "http://engine.lan:9000/pair"
        );
    }
}
