//! The retry loop around pairing sessions.
//!
//! Terminal I/O stays outside: the driver reports sessions to a
//! [`SessionObserver`] and asks it whether an expired or canceled session
//! should be retried. A "yes" starts over at `Idle` with a new token and a
//! new authority; anything else ends the loop.

use std::future::Future;

use onyx_auth::PairingToken;

use super::error::ListenerError;
use super::session::{PairingListener, PairingSession, PairingSuccess, SessionOutcome};
use crate::shutdown::ShutdownSignal;

/// Receives session events from [`PairingDriver::run`].
pub trait SessionObserver: Send {
    /// A session is `Listening`; its token can be shown to the operator.
    fn on_listening(&mut self, _session: &PairingSession) {}

    /// The session succeeded; the loop is about to end.
    fn on_success(&mut self, _success: &PairingSuccess) {}

    /// Decide whether to retry after an expired or canceled session.
    fn should_retry(&mut self, outcome: &SessionOutcome) -> impl Future<Output = bool> + Send;
}

/// Runs sessions until one succeeds or the observer declines a retry.
#[derive(Debug, Clone)]
pub struct PairingDriver {
    listener: PairingListener,
}

impl PairingDriver {
    pub fn new(listener: PairingListener) -> Self {
        Self { listener }
    }

    pub fn listener(&self) -> &PairingListener {
        &self.listener
    }

    /// Drive sessions to completion.
    ///
    /// `token` is used for the first session only; retries always get a
    /// fresh one. Returns `None` when the operator gave up.
    pub async fn run<O: SessionObserver>(
        &self,
        observer: &mut O,
        cancel: &mut ShutdownSignal,
        mut token: Option<PairingToken>,
    ) -> Result<Option<PairingSuccess>, ListenerError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let session = self.listener.start(token.take()).await?;
            tracing::debug!(attempt, addr = %session.local_addr(), "Pairing attempt started");
            observer.on_listening(&session);

            let outcome = session.wait(cancel).await;
            if let SessionOutcome::Succeeded(success) = outcome {
                observer.on_success(&success);
                return Ok(Some(success));
            }

            if !observer.should_retry(&outcome).await {
                tracing::info!(attempt, outcome = %outcome.state(), "Pairing abandoned");
                return Ok(None);
            }
            tracing::info!(attempt, outcome = %outcome.state(), "Retrying pairing with a new token");
        }
    }
}
