//! Pairing token types.
//!
//! The pairing flow is:
//! 1. The engine generates a [`PairingToken`] when pairing mode starts
//! 2. The operator relays the token out-of-band (e.g., read over SSH)
//! 3. The console presents the token as a bearer credential with its
//!    signing request
//! 4. The engine compares it against the active token and, on a match,
//!    issues a client certificate
//!
//! # Security
//!
//! - Tokens come from the OS random source only; there is no fallback
//! - Comparison is constant-time
//! - A token lives for one listener window and is never written to disk

mod error;
mod token;

pub use error::TokenError;
pub use token::{PairingToken, TOKEN_ALPHABET, TOKEN_GROUP_LEN, TOKEN_LEN};

/// Administrative control-plane port the pairing endpoint binds to.
pub const DEFAULT_PAIRING_PORT: u16 = 2305;

/// Path of the single pairing endpoint.
pub const PAIR_PATH: &str = "/pair";

/// Header carrying the token for consoles that do not send `Authorization`.
pub const TOKEN_HEADER: &str = "x-onyx-token";

/// Content type of request and response bodies.
pub const PEM_CONTENT_TYPE: &str = "application/x-pem-file";
