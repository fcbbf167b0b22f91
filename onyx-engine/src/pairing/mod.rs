//! The time-boxed pairing listener.
//!
//! - [`PairingListener`] opens one [`PairingSession`] per attempt
//! - The session's endpoint accepts `POST /pair` with a bearer token and a
//!   PEM signing request, and answers with a PEM client certificate
//! - Exactly one request per session can succeed; failed requests leave the
//!   session `Listening`
//! - [`PairingDriver`] loops sessions, asking a [`SessionObserver`] whether
//!   to retry after expiry or cancellation

mod driver;
mod error;
mod handler;
mod session;

pub use driver::{PairingDriver, SessionObserver};
pub use error::{ListenerError, PairingError};
pub use session::{
    PairingListener, PairingSession, PairingSuccess, SessionOutcome, SessionState,
};
