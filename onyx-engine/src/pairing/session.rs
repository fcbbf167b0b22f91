//! One pairing window: `Idle -> Listening -> {Succeeded, Expired, Canceled} -> Closed`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use onyx_auth::{IssuedCertificate, PairingToken, SessionAuthority};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::ListenerError;
use super::handler::{router, PairingContext};
use crate::auth::AuthorizationStore;
use crate::config::ListenerConfig;
use crate::shutdown::ShutdownSignal;

/// Where a pairing session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Succeeded,
    Expired,
    Canceled,
    Closed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Expired | SessionState::Canceled
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Succeeded => "succeeded",
            SessionState::Expired => "expired",
            SessionState::Canceled => "canceled",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// The one successful exchange of a session.
#[derive(Debug, Clone)]
pub struct PairingSuccess {
    pub subject: String,
    /// Certificate serial, lowercase hex.
    pub serial: String,
    /// Not-after (Unix seconds).
    pub not_after: i64,
    pub record_path: PathBuf,
    pub peer: SocketAddr,
    pub certificate: IssuedCertificate,
}

/// How a session ended.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Succeeded(PairingSuccess),
    Expired,
    Canceled,
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Succeeded(_) => SessionState::Succeeded,
            SessionOutcome::Expired => SessionState::Expired,
            SessionOutcome::Canceled => SessionState::Canceled,
        }
    }
}

/// Opens pairing sessions with a fixed configuration.
#[derive(Debug, Clone)]
pub struct PairingListener {
    config: ListenerConfig,
}

impl PairingListener {
    pub fn new(config: ListenerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Move a fresh session from `Idle` to `Listening`.
    ///
    /// Generates a new session authority and, unless `token` is given, a new
    /// token; binds the endpoint and arms the deadline.
    pub async fn start(&self, token: Option<PairingToken>) -> Result<PairingSession, ListenerError> {
        let (state_tx, _) = watch::channel(SessionState::Idle);

        let token = match token {
            Some(token) => token,
            None => PairingToken::generate()?,
        };
        let authority = SessionAuthority::generate()?;

        let addr = self.config.addr();
        let tcp = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = tcp
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let (success_tx, success_rx) = oneshot::channel();
        let context = Arc::new(PairingContext {
            token: token.clone(),
            authority,
            policy: self.config.policy,
            store: AuthorizationStore::new(&self.config.auth_dir),
            success: Mutex::new(Some(success_tx)),
            state: state_tx,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(context.clone());
        let server = tokio::spawn(async move {
            axum::serve(tcp, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let deadline = Instant::now() + self.config.window;
        context.state.send_replace(SessionState::Listening);
        tracing::info!(
            addr = %local_addr,
            token = %token.redacted(),
            authority = %context.authority.fingerprint(),
            window_secs = self.config.window.as_secs(),
            "Pairing session listening"
        );

        Ok(PairingSession {
            token,
            local_addr,
            deadline,
            grace: self.config.grace,
            success_rx,
            context,
            shutdown_tx: Some(shutdown_tx),
            server,
        })
    }
}

/// A live `Listening` session.
pub struct PairingSession {
    token: PairingToken,
    local_addr: SocketAddr,
    deadline: Instant,
    grace: Duration,
    success_rx: oneshot::Receiver<PairingSuccess>,
    context: Arc<PairingContext>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: JoinHandle<std::io::Result<()>>,
}

enum Wake {
    Success(Result<PairingSuccess, oneshot::error::RecvError>),
    Deadline,
    Cancel,
}

impl PairingSession {
    pub fn token(&self) -> &PairingToken {
        &self.token
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> SessionState {
        *self.context.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.context.state.subscribe()
    }

    /// Time left before the session expires.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Block until success, the deadline, or `cancel`; then close.
    pub async fn wait(mut self, cancel: &mut ShutdownSignal) -> SessionOutcome {
        let wake = tokio::select! {
            res = &mut self.success_rx => Wake::Success(res),
            _ = tokio::time::sleep_until(self.deadline) => Wake::Deadline,
            _ = cancel.recv() => Wake::Cancel,
        };

        let outcome = match wake {
            Wake::Success(Ok(success)) => SessionOutcome::Succeeded(success),
            // The sender lives in the context this session holds; it only
            // drops after being taken, which resolve() handles.
            Wake::Success(Err(_)) | Wake::Deadline => self.resolve(SessionOutcome::Expired).await,
            Wake::Cancel => self.resolve(SessionOutcome::Canceled).await,
        };

        self.context.state.send_replace(outcome.state());
        match &outcome {
            SessionOutcome::Succeeded(s) => {
                tracing::info!(subject = %s.subject, peer = %s.peer, "Pairing succeeded")
            }
            SessionOutcome::Expired => tracing::info!("Pairing window expired"),
            SessionOutcome::Canceled => tracing::info!("Pairing canceled"),
        }

        self.close().await;
        outcome
    }

    /// Claim the success slot so no request can complete after `fallback`.
    ///
    /// A request that already took the slot sent its result while holding
    /// the lock, so it is observable here and wins.
    async fn resolve(&mut self, fallback: SessionOutcome) -> SessionOutcome {
        let mut slot = self.context.success.lock().await;
        if slot.take().is_some() {
            return fallback;
        }
        drop(slot);

        match self.success_rx.try_recv() {
            Ok(success) => SessionOutcome::Succeeded(success),
            Err(_) => fallback,
        }
    }

    async fn close(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(self.grace, &mut self.server).await {
            Ok(Ok(Ok(()))) => tracing::debug!("Pairing endpoint closed"),
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Pairing endpoint stopped with error"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Pairing endpoint task failed"),
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "In-flight pairing requests did not finish in time, aborting"
                );
                self.server.abort();
            }
        }

        self.context.state.send_replace(SessionState::Closed);
    }
}

impl Drop for PairingSession {
    fn drop(&mut self) {
        // Dropped without wait(): do not leave the endpoint running.
        if !self.server.is_finished() {
            self.server.abort();
        }
    }
}
