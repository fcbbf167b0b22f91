//! Ephemeral session certificate authority.
//!
//! A [`SessionAuthority`] exists for exactly one pairing window. It holds a
//! freshly generated Ed25519 key in memory only, converts well-formed
//! signing requests into client-authentication certificates, and is dropped
//! (key zeroized) when the window closes. Nothing here touches disk.

use rand::rngs::OsRng;
use rand::RngCore;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
    SerialNumber,
};
use time::{Duration, OffsetDateTime};

use crate::cert::{IssuedCertificate, SigningRequest};
use crate::identity::{Fingerprint, PrivateKey};

/// Common name of every session authority certificate.
pub const AUTHORITY_COMMON_NAME: &str = "Onyx Session Authority";

/// Serial numbers carry 128 random bits.
const SERIAL_LEN: usize = 16;

/// Errors raised while creating an authority or issuing a certificate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthorityError {
    /// The request PEM is absent, mislabeled, unparseable or fails its signature.
    #[error("malformed signing request: {0}")]
    MalformedRequest(String),

    /// The signing operation (or its random source) failed.
    #[error("signing failed: {0}")]
    SigningFailure(String),
}

/// Issuance policy for client certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuancePolicy {
    /// Calendar years between not-before and not-after.
    pub validity_years: u16,
}

impl Default for IssuancePolicy {
    fn default() -> Self {
        Self { validity_years: 1 }
    }
}

impl IssuancePolicy {
    /// Compute not-after for a certificate starting at `not_before`.
    ///
    /// Adds calendar years; February 29 rolls back to February 28 when the
    /// target year is not a leap year.
    #[must_use]
    pub fn not_after(&self, not_before: OffsetDateTime) -> OffsetDateTime {
        let target_year = not_before.year() + i32::from(self.validity_years);
        not_before
            .replace_year(target_year)
            .or_else(|_| {
                not_before
                    .replace_day(28)
                    .and_then(|d| d.replace_year(target_year))
            })
            .unwrap_or(not_before + Duration::days(365 * i64::from(self.validity_years)))
    }
}

/// Current time truncated to whole seconds, matching X.509 time precision.
fn now_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond()))
}

/// A 128-bit positive serial number from the OS random source.
fn random_serial() -> Result<SerialNumber, AuthorityError> {
    let mut bytes = [0u8; SERIAL_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthorityError::SigningFailure(format!("random source: {e}")))?;
    // Clear the sign bit so the DER INTEGER stays positive; force a non-zero lead byte.
    bytes[0] &= 0x7f;
    bytes[0] |= 0x01;
    Ok(SerialNumber::from_slice(&bytes))
}

/// The in-memory signing authority for one pairing session.
pub struct SessionAuthority {
    key: PrivateKey,
    certificate: Certificate,
    fingerprint: Fingerprint,
}

impl SessionAuthority {
    /// Generate a fresh authority key and its self-signed issuer certificate.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::SigningFailure` if the issuer certificate
    /// cannot be produced.
    pub fn generate() -> Result<Self, AuthorityError> {
        let key = PrivateKey::generate();
        let key_pair = rcgen_key_pair(&key)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, AUTHORITY_COMMON_NAME);
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
        params.not_before = now_seconds();
        params.not_after = params.not_before + Duration::days(1);
        params.serial_number = Some(random_serial()?);

        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| AuthorityError::SigningFailure(e.to_string()))?;
        let fingerprint = Fingerprint::from_public_key(&key.public_key());

        Ok(Self {
            key,
            certificate,
            fingerprint,
        })
    }

    /// Fingerprint of the authority's public key.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Turn a signing request into a client-authentication certificate.
    ///
    /// The certificate copies the request's subject and public key, gets a
    /// random 128-bit serial, is valid from now for the policy's duration,
    /// and carries key usage `digitalSignature` plus extended key usage
    /// `clientAuth` only.
    ///
    /// # Errors
    ///
    /// - `AuthorityError::MalformedRequest` if the request cannot be parsed,
    ///   has no common name, or its self-signature does not verify
    /// - `AuthorityError::SigningFailure` if signing or randomness fails
    pub fn issue(
        &self,
        request: &SigningRequest,
        policy: &IssuancePolicy,
    ) -> Result<IssuedCertificate, AuthorityError> {
        request
            .inspect()
            .map_err(|e| AuthorityError::MalformedRequest(e.to_string()))?;

        let mut csr = CertificateSigningRequestParams::from_pem(request.as_pem())
            .map_err(|e| AuthorityError::MalformedRequest(e.to_string()))?;

        let not_before = now_seconds();
        let params = &mut csr.params;
        params.serial_number = Some(random_serial()?);
        params.not_before = not_before;
        params.not_after = policy.not_after(not_before);
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        params.subject_alt_names.clear();
        params.custom_extensions.clear();
        params.use_authority_key_identifier_extension = true;

        let key_pair = rcgen_key_pair(&self.key)?;
        let cert = csr
            .signed_by(&self.certificate, &key_pair)
            .map_err(|e| AuthorityError::SigningFailure(e.to_string()))?;

        IssuedCertificate::from_pem(cert.pem())
            .map_err(|e| AuthorityError::SigningFailure(e.to_string()))
    }
}

impl std::fmt::Debug for SessionAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthority")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn rcgen_key_pair(key: &PrivateKey) -> Result<KeyPair, AuthorityError> {
    let pkcs8_der = key
        .to_pkcs8_der()
        .map_err(|e| AuthorityError::SigningFailure(e.to_string()))?;
    KeyPair::try_from(&pkcs8_der[..]).map_err(|e| AuthorityError::SigningFailure(e.to_string()))
}
