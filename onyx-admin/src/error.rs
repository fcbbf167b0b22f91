//! Errors raised by the console side of pairing.

use std::path::PathBuf;

use onyx_auth::{CertError, KeyError};
use thiserror::Error;

/// Errors from pairing with an engine and using the resulting identity.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The engine could not be reached or the round trip did not finish.
    #[error("could not reach {url} (is the server in pairing mode?): {source}")]
    ConnectionError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The engine answered with something other than a certificate.
    #[error("pairing rejected ({status}): {reason}")]
    PairingRejected { status: u16, reason: String },

    #[error("failed to persist {}: {source}", path.display())]
    PersistenceFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local key is missing, unreadable or not an Ed25519 key.
    #[error("identity error: {0}")]
    Identity(#[from] KeyError),

    /// A signing request could not be built, or the engine returned
    /// something that is not a usable client certificate.
    #[error("certificate error: {0}")]
    Request(#[from] CertError),

    /// The issued certificate does not belong to the local key.
    #[error("issued certificate does not match the local key")]
    KeyMismatch,

    /// The HTTP client could not be configured.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ClientError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PersistenceFailure {
            path: path.into(),
            source,
        }
    }
}
