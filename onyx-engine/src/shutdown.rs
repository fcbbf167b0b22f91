//! Cancellation of pairing sessions.
//!
//! Every call to [`ShutdownCoordinator::shutdown`] is a separate request. A
//! [`ShutdownSignal`] wakes once per request it has not yet seen, so the
//! driver can cancel one session, prompt, and then start another.

use tokio::sync::watch;

/// Shutdown signal that can be cloned and awaited.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<u64>,
}

impl ShutdownSignal {
    /// Wait for the next shutdown request.
    ///
    /// Never completes once the coordinator is gone.
    pub async fn recv(&mut self) {
        if self.receiver.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Whether a request arrived that `recv` has not consumed yet.
    pub fn is_pending(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Treat every request so far as seen.
    pub fn mark_seen(&mut self) {
        self.receiver.borrow_and_update();
    }
}

/// Shutdown coordinator that can send shutdown signals.
pub struct ShutdownCoordinator {
    sender: watch::Sender<u64>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self { sender }
    }

    /// Get a signal receiver. Earlier requests are not replayed.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        self.sender.send_modify(|n| *n = n.wrapping_add(1));
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGINT (Ctrl+C) or, on unix, SIGTERM.
///
/// Returns the name of the signal received.
pub async fn os_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
}
