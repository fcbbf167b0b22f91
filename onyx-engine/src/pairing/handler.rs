//! The `POST /pair` endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use onyx_auth::cert::MAX_CERT_SIZE;
use onyx_auth::pairing::{PAIR_PATH, PEM_CONTENT_TYPE, TOKEN_HEADER};
use onyx_auth::{IssuancePolicy, PairingToken, SessionAuthority, SigningRequest};
use tokio::sync::{oneshot, watch, Mutex};

use super::error::PairingError;
use super::session::{PairingSuccess, SessionState};
use crate::auth::AuthorizationStore;

/// Everything a request handler needs for one session.
///
/// Dropped with the server task, which zeroizes the authority key.
pub(crate) struct PairingContext {
    pub(crate) token: PairingToken,
    pub(crate) authority: SessionAuthority,
    pub(crate) policy: IssuancePolicy,
    pub(crate) store: AuthorizationStore,
    /// Taken by the one request that completes issuance, or by the
    /// orchestrator when the session ends first.
    pub(crate) success: Mutex<Option<oneshot::Sender<PairingSuccess>>>,
    pub(crate) state: watch::Sender<SessionState>,
}

pub(crate) fn router(ctx: Arc<PairingContext>) -> Router {
    Router::new()
        .route(PAIR_PATH, post(pair))
        .layer(DefaultBodyLimit::max(MAX_CERT_SIZE))
        .with_state(ctx)
}

/// The credential from `Authorization: Bearer`, else from `X-Onyx-Token`.
///
/// The scheme name is matched case-insensitively.
fn presented_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_credential)
        .or_else(|| headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()))
}

fn bearer_credential(value: &str) -> Option<&str> {
    let (scheme, credential) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| credential.trim())
        .filter(|c| !c.is_empty())
}

async fn pair(
    State(ctx): State<Arc<PairingContext>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, PairingError> {
    if !presented_token(&headers).is_some_and(|t| ctx.token.matches(t)) {
        tracing::warn!(peer = %peer, "Pairing attempt with invalid token");
        return Err(PairingError::TokenMismatch);
    }

    // Oversized or unreadable bodies are malformed requests, not transport errors.
    let body = body.map_err(|e| {
        tracing::warn!(peer = %peer, error = %e.body_text(), "Pairing request body rejected");
        PairingError::MalformedRequest(format!("request body rejected: {}", e.body_text()))
    })?;

    // Held until this request's outcome is decided.
    let mut slot = ctx.success.lock().await;
    if slot.is_none() {
        tracing::warn!(peer = %peer, "Pairing attempt after session ended");
        return Err(PairingError::TokenConsumed);
    }

    let success = match issue(&ctx, &body, peer).await {
        Ok(success) => success,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Pairing request failed, session still listening");
            return Err(e);
        }
    };

    let pem = success.certificate.as_pem().to_string();
    tracing::info!(
        peer = %peer,
        subject = %success.subject,
        serial = %success.serial,
        "Client certificate issued"
    );

    ctx.state.send_replace(SessionState::Succeeded);
    if let Some(sender) = slot.take() {
        if sender.send(success).is_err() {
            tracing::debug!("Session stopped waiting before success was delivered");
        }
    }
    drop(slot);

    Ok(([(header::CONTENT_TYPE, PEM_CONTENT_TYPE)], pem).into_response())
}

async fn issue(
    ctx: &PairingContext,
    body: &[u8],
    peer: SocketAddr,
) -> Result<PairingSuccess, PairingError> {
    let pem = std::str::from_utf8(body)
        .map_err(|_| PairingError::MalformedRequest("body is not PEM text".into()))?;
    let request = SigningRequest::from_pem(pem);

    let requested = request
        .inspect()
        .map_err(|e| PairingError::MalformedRequest(e.to_string()))?;
    AuthorizationStore::validate_subject(&requested.common_name)
        .map_err(|e| PairingError::MalformedRequest(e.to_string()))?;

    let certificate = ctx.authority.issue(&request, &ctx.policy)?;

    let info = certificate
        .inspect()
        .map_err(|e| PairingError::SigningFailure(e.to_string()))?;
    info.require_client_auth_only()
        .map_err(|e| PairingError::SigningFailure(e.to_string()))?;
    let subject = info
        .subject_common_name
        .clone()
        .ok_or_else(|| PairingError::SigningFailure("issued certificate has no subject".into()))?;

    let record = ctx
        .store
        .save(&subject, &certificate)
        .await
        .map_err(|e| PairingError::PersistenceFailure(e.to_string()))?;

    Ok(PairingSuccess {
        subject,
        serial: info.serial.iter().map(|b| format!("{b:02x}")).collect(),
        not_after: info.not_after,
        record_path: record.path,
        peer,
        certificate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_presented_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_static("LEGACY-TOKN"));
        assert_eq!(presented_token(&headers), Some("LEGACY-TOKN"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer AB3D-7XQ2"),
        );
        assert_eq!(presented_token(&headers), Some("AB3D-7XQ2"));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        for value in ["bearer AB3D-7XQ2", "BEARER AB3D-7XQ2", "Bearer   AB3D-7XQ2 "] {
            let mut headers = HeaderMap::new();
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
            assert_eq!(presented_token(&headers), Some("AB3D-7XQ2"), "{value:?}");
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(presented_token(&headers), None);
    }

    #[test]
    fn test_presented_token_ignores_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(presented_token(&headers), None);
    }
}
