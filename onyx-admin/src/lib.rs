//! Onyx admin console library.
//!
//! Pairs the console with engines and manages the resulting identity:
//! - [`identity`] - the console key and the certificate issued to it
//! - [`handshake`] - the HTTP exchange with an engine's pairing endpoint
//! - [`pair`] - the full flow, from key to node list entry
//! - [`config`] - `config.toml` settings and paired nodes
//! - [`tls`] - mTLS clients for calls after pairing

pub mod config;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod pair;
pub mod tls;

pub use config::{AdminConfig, AdminPaths, ConfigError, GlobalSettings, Node};
pub use error::ClientError;
pub use handshake::{PairingClient, HANDSHAKE_TIMEOUT};
pub use identity::{default_common_name, IdentityStore};
pub use pair::{pair, persist_result, PairReport, PairRequest, PersistReport};
pub use tls::MtlsClientFactory;
