//! Pairing primitives for Onyx.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No network calls
//! - No logging
//!
//! Modules:
//! - [`pairing`] - One-time pairing tokens shown on the engine console
//! - [`identity`] - Ed25519 keys, fingerprints and typed PEM loading
//! - [`cert`] - Signing requests, issued certificates and X.509 inspection
//! - [`authority`] - The ephemeral per-session certificate authority
//!
//! # Example
//!
//! ```
//! use onyx_auth::{IssuancePolicy, PrivateKey, SessionAuthority, SigningRequest};
//!
//! let authority = SessionAuthority::generate().unwrap();
//! let key = PrivateKey::generate();
//! let request = SigningRequest::build(&key, "admin@laptop").unwrap();
//!
//! let cert = authority.issue(&request, &IssuancePolicy::default()).unwrap();
//! assert!(cert.inspect().unwrap().is_client_auth_only());
//! ```

pub mod authority;
pub mod cert;
pub mod identity;
pub mod pairing;

pub use authority::{AuthorityError, IssuancePolicy, SessionAuthority};
pub use cert::{
    inspect_certificate, CertError, CertificateInfo, IssuedCertificate, RequestInfo,
    SigningRequest,
};
pub use identity::{
    decode_private_key_pem, Fingerprint, KeyError, Pkcs8Key, PrivateKey, PublicKey,
};
pub use pairing::{PairingToken, TokenError, DEFAULT_PAIRING_PORT};
