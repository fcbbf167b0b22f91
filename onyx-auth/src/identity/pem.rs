//! Typed PEM decoding for stored private keys.

use ed25519_dalek::pkcs8::{ObjectIdentifier, PrivateKeyInfo};
use x509_parser::pem::parse_x509_pem;

use super::keys::{KeyError, PrivateKey};

/// PEM label for PKCS#8 private keys.
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// A private key type that can be decoded from PKCS#8.
pub trait Pkcs8Key: Sized {
    /// Human-readable algorithm name for error messages.
    const ALGORITHM_NAME: &'static str;

    /// PKCS#8 algorithm identifier this type accepts.
    const ALGORITHM_OID: ObjectIdentifier;

    /// Decode from a PKCS#8 DER document already known to carry `ALGORITHM_OID`.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidFormat` if the document is malformed.
    fn from_pkcs8_der(der: &[u8]) -> Result<Self, KeyError>;
}

impl Pkcs8Key for PrivateKey {
    const ALGORITHM_NAME: &'static str = "Ed25519";
    const ALGORITHM_OID: ObjectIdentifier = ed25519_dalek::pkcs8::ALGORITHM_OID;

    fn from_pkcs8_der(der: &[u8]) -> Result<Self, KeyError> {
        PrivateKey::from_pkcs8_der(der)
    }
}

/// Decode a PEM `PRIVATE KEY` block as key type `K`.
///
/// # Errors
///
/// - `KeyError::InvalidPem` if there is no PEM block or its label is wrong
/// - `KeyError::InvalidFormat` if the block is not PKCS#8
/// - `KeyError::UnsupportedKeyType` if the key is for another algorithm
pub fn decode_private_key_pem<K: Pkcs8Key>(pem: &str) -> Result<K, KeyError> {
    let (_, block) =
        parse_x509_pem(pem.as_bytes()).map_err(|e| KeyError::InvalidPem(e.to_string()))?;

    if block.label != PRIVATE_KEY_LABEL {
        return Err(KeyError::InvalidPem(format!(
            "expected {PRIVATE_KEY_LABEL} block, found {}",
            block.label
        )));
    }

    let info = PrivateKeyInfo::try_from(block.contents.as_slice())
        .map_err(|_| KeyError::InvalidFormat)?;
    if info.algorithm.oid != K::ALGORITHM_OID {
        return Err(KeyError::UnsupportedKeyType {
            expected: K::ALGORITHM_NAME,
            found: info.algorithm.oid.to_string(),
        });
    }

    K::from_pkcs8_der(&block.contents)
}
