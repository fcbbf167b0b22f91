use std::net::SocketAddr;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use onyx_auth::{AuthorityError, TokenError};

/// Failures that prevent a pairing session from starting.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind pairing endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create session authority: {0}")]
    Authority(#[from] AuthorityError),
    #[error("failed to generate pairing token: {0}")]
    Token(#[from] TokenError),
}

/// Why a single pairing request was refused.
///
/// None of these end the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    #[error("invalid pairing token")]
    TokenMismatch,
    #[error("token already used")]
    TokenConsumed,
    #[error("malformed signing request: {0}")]
    MalformedRequest(String),
    #[error("signing failed: {0}")]
    SigningFailure(String),
    #[error("failed to persist authorization: {0}")]
    PersistenceFailure(String),
}

impl PairingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PairingError::TokenMismatch | PairingError::TokenConsumed => StatusCode::UNAUTHORIZED,
            PairingError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            PairingError::SigningFailure(_) | PairingError::PersistenceFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<AuthorityError> for PairingError {
    fn from(e: AuthorityError) -> Self {
        match e {
            AuthorityError::MalformedRequest(reason) => PairingError::MalformedRequest(reason),
            AuthorityError::SigningFailure(reason) => PairingError::SigningFailure(reason),
            other => PairingError::SigningFailure(other.to_string()),
        }
    }
}

impl IntoResponse for PairingError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
