//! Long-lived identity keys for Onyx principals.
//!
//! Consoles and engines each hold one Ed25519 key pair, stored on disk as a
//! PEM-encoded PKCS#8 document. Loading is typed: the caller names the
//! algorithm it expects through [`Pkcs8Key`], and material for any other
//! algorithm fails with [`KeyError::UnsupportedKeyType`].
//!
//! ```
//! use onyx_auth::identity::{decode_private_key_pem, PrivateKey};
//!
//! let key = PrivateKey::generate();
//! let pem = key.to_pkcs8_pem().unwrap();
//!
//! let restored: PrivateKey = decode_private_key_pem(&pem).unwrap();
//! assert_eq!(key.public_key(), restored.public_key());
//! ```

mod keys;
mod pem;

pub use keys::{Fingerprint, KeyError, PrivateKey, PublicKey};
pub use pem::{decode_private_key_pem, Pkcs8Key, PRIVATE_KEY_LABEL};
