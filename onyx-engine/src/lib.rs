//! Onyx security engine: the administrative pairing side.
//!
//! The engine accepts new admin consoles through a short pairing window. See
//! [`pairing`] for the listener state machine and [`auth`] for the records it
//! leaves behind.

pub mod auth;
pub mod config;
pub mod pairing;
pub mod shutdown;

pub use auth::{AuthStoreError, AuthorizationRecord, AuthorizationStore};
pub use config::{parse_duration, ConfigError, ListenerConfig};
pub use pairing::{
    ListenerError, PairingDriver, PairingError, PairingListener, PairingSession, PairingSuccess,
    SessionObserver, SessionOutcome, SessionState,
};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
