//! Pairing a console with an engine, end to end.
//!
//! 1. Load or create the console key (fatal if it cannot be persisted)
//! 2. Build a signing request for the principal name
//! 3. Present it with the token to the engine's pairing endpoint
//! 4. Store the returned certificate (fatal) and the node entry (warning)

use std::path::PathBuf;

use onyx_auth::{Fingerprint, IssuedCertificate, PairingToken, SigningRequest};

use crate::config::{AdminConfig, AdminPaths};
use crate::error::ClientError;
use crate::handshake::PairingClient;

/// What to pair with and as whom.
#[derive(Debug, Clone)]
pub struct PairRequest {
    pub address: String,
    pub port: u16,
    pub token: PairingToken,
    /// Subject common name, usually `admin@<hostname>`
    pub common_name: String,
    /// Display name for the node list; defaults to the address
    pub name: Option<String>,
}

/// Result of a completed pairing.
#[derive(Debug, Clone)]
pub struct PairReport {
    pub subject: String,
    pub fingerprint: Fingerprint,
    pub not_after: i64,
    pub certificate_path: PathBuf,
    pub node_name: String,
    /// Set when the certificate was saved but the node list was not.
    pub node_warning: Option<String>,
}

/// Where [`persist_result`] put things.
#[derive(Debug, Clone)]
pub struct PersistReport {
    pub certificate_path: PathBuf,
    pub node_name: String,
    pub node_warning: Option<String>,
}

pub async fn pair(
    paths: &AdminPaths,
    client: &PairingClient,
    request: &PairRequest,
) -> Result<PairReport, ClientError> {
    let identity = paths.identity();
    let key = identity.ensure_identity()?;
    let fingerprint = Fingerprint::from_public_key(&key.public_key());

    let csr = SigningRequest::build(&key, &request.common_name)?;
    tracing::info!(
        address = %request.address,
        port = request.port,
        subject = %request.common_name,
        token = %request.token.redacted(),
        "Requesting client certificate"
    );

    let cert = client
        .handshake(&request.address, request.port, &request.token, &csr)
        .await?;

    let info = cert.inspect()?;
    if !key.owns(&info.public_key) {
        return Err(ClientError::KeyMismatch);
    }
    info.require_client_auth_only()?;

    let persisted = persist_result(
        paths,
        &cert,
        &request.address,
        request.port,
        request.name.as_deref(),
    )?;

    Ok(PairReport {
        subject: info
            .subject_common_name
            .unwrap_or_else(|| request.common_name.clone()),
        fingerprint,
        not_after: info.not_after,
        certificate_path: persisted.certificate_path,
        node_name: persisted.node_name,
        node_warning: persisted.node_warning,
    })
}

/// Save `cert` as the console certificate and record the engine.
///
/// Only the certificate write is fatal; a node list that cannot be updated
/// leaves the certificate in place and is reported as a warning.
pub fn persist_result(
    paths: &AdminPaths,
    cert: &IssuedCertificate,
    address: &str,
    port: u16,
    name: Option<&str>,
) -> Result<PersistReport, ClientError> {
    let certificate_path = paths.identity().save_certificate(cert)?;
    let node_name = name.unwrap_or(address).to_string();

    let config_path = paths.config_path();
    let node_warning = AdminConfig::load(&config_path)
        .and_then(|mut config| {
            config.add_node(&node_name, address, port);
            config.save(&config_path)
        })
        .err()
        .map(|e| {
            tracing::warn!(error = %e, "Certificate saved but node list not updated");
            e.to_string()
        });

    Ok(PersistReport {
        certificate_path,
        node_name,
        node_warning,
    })
}
