//! Signing requests, issued certificates and X.509 inspection.
//!
//! Both travel as PEM text. Neither container is trusted until inspected;
//! inspection rejects anything over [`MAX_CERT_SIZE`].

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use thiserror::Error;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use crate::identity::PrivateKey;

/// Size limit for one certificate or request, PEM or DER.
pub const MAX_CERT_SIZE: usize = 16 * 1024;

/// PEM label of a PKCS#10 certificate signing request.
pub const CSR_LABEL: &str = "CERTIFICATE REQUEST";

/// PEM label of an X.509 certificate.
pub const CERT_LABEL: &str = "CERTIFICATE";

/// Organization placed in every console signing request.
pub const ADMIN_ORGANIZATION: &str = "Onyx Admin";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CertError {
    #[error("certificate too large: {0} bytes (max {MAX_CERT_SIZE})")]
    TooLarge(usize),

    #[error("invalid PEM: {0}")]
    InvalidPem(String),

    #[error("failed to parse X.509 data: {0}")]
    ParseError(String),

    #[error("failed to build signing request: {0}")]
    Build(String),

    #[error("certificate is not restricted to client authentication")]
    NotClientAuth,
}

/// Decode the first PEM block of `input` and require `label`.
///
/// # Errors
///
/// Returns `CertError::TooLarge` for oversized input and
/// `CertError::InvalidPem` when no block is present or the label differs.
pub fn decode_pem_block(input: &[u8], label: &str) -> Result<Vec<u8>, CertError> {
    if input.len() > MAX_CERT_SIZE {
        return Err(CertError::TooLarge(input.len()));
    }

    let (_, block) = parse_x509_pem(input).map_err(|e| CertError::InvalidPem(e.to_string()))?;
    if block.label != label {
        return Err(CertError::InvalidPem(format!(
            "expected {label} block, found {}",
            block.label
        )));
    }
    Ok(block.contents)
}

/// A PEM-encoded PKCS#10 signing request.
///
/// Built by the requester and self-signed with its own key; the authority
/// never creates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pem: String,
}

impl SigningRequest {
    /// Build and self-sign a request binding `private_key` to `common_name`.
    ///
    /// # Errors
    ///
    /// Returns `CertError::Build` if rcgen cannot use the key or serialize.
    pub fn build(private_key: &PrivateKey, common_name: &str) -> Result<Self, CertError> {
        let pkcs8_der = private_key
            .to_pkcs8_der()
            .map_err(|e| CertError::Build(e.to_string()))?;
        let key_pair =
            KeyPair::try_from(&pkcs8_der[..]).map_err(|e| CertError::Build(e.to_string()))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params
            .distinguished_name
            .push(DnType::OrganizationName, ADMIN_ORGANIZATION);

        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| CertError::Build(e.to_string()))?;
        let pem = csr.pem().map_err(|e| CertError::Build(e.to_string()))?;

        Ok(Self { pem })
    }

    /// Wrap PEM text received from the network without validating it.
    ///
    /// Validation happens when the authority parses the request.
    #[must_use]
    pub fn from_pem(pem: impl Into<String>) -> Self {
        Self { pem: pem.into() }
    }

    /// The PEM text.
    #[must_use]
    pub fn as_pem(&self) -> &str {
        &self.pem
    }

    /// Parse the request and return its subject common name and public key.
    ///
    /// # Errors
    ///
    /// Returns `CertError` if the PEM block or PKCS#10 structure is invalid,
    /// or the subject has no common name.
    pub fn inspect(&self) -> Result<RequestInfo, CertError> {
        let der = decode_pem_block(self.pem.as_bytes(), CSR_LABEL)?;
        let (_, csr) = X509CertificationRequest::from_der(&der)
            .map_err(|e| CertError::ParseError(format!("{:?}", e)))?;

        let info = &csr.certification_request_info;
        let common_name = info
            .subject
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CertError::ParseError("subject has no common name".to_string()))?;

        Ok(RequestInfo {
            common_name,
            public_key: info.subject_pki.subject_public_key.data.to_vec(),
        })
    }
}

/// Fields of a parsed signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Subject common name, e.g. `admin@laptop`
    pub common_name: String,
    /// Raw subject public key bytes
    pub public_key: Vec<u8>,
}

/// A PEM-encoded client certificate issued by a session authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pem: String,
}

impl IssuedCertificate {
    /// Wrap and validate PEM certificate text.
    ///
    /// # Errors
    ///
    /// Returns `CertError` unless the input holds a parseable `CERTIFICATE`.
    pub fn from_pem(pem: impl Into<String>) -> Result<Self, CertError> {
        let pem = pem.into();
        let der = decode_pem_block(pem.as_bytes(), CERT_LABEL)?;
        X509Certificate::from_der(&der).map_err(|e| CertError::ParseError(format!("{:?}", e)))?;
        Ok(Self { pem })
    }

    /// The PEM text.
    #[must_use]
    pub fn as_pem(&self) -> &str {
        &self.pem
    }

    /// The DER encoding of the certificate.
    ///
    /// # Errors
    ///
    /// Cannot fail for values built through `from_pem`; the `Result` keeps the
    /// PEM decoding path in one place.
    pub fn to_der(&self) -> Result<Vec<u8>, CertError> {
        decode_pem_block(self.pem.as_bytes(), CERT_LABEL)
    }

    /// Parse the certificate fields.
    ///
    /// # Errors
    ///
    /// Returns `CertError::ParseError` if the certificate cannot be parsed.
    pub fn inspect(&self) -> Result<CertificateInfo, CertError> {
        inspect_certificate(&self.to_der()?)
    }
}

/// Fields of a parsed certificate relevant to pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject common name
    pub subject_common_name: Option<String>,
    /// Serial number as big-endian bytes
    pub serial: Vec<u8>,
    /// Not-before (Unix seconds)
    pub not_before: i64,
    /// Not-after (Unix seconds)
    pub not_after: i64,
    /// Raw subject public key bytes
    pub public_key: Vec<u8>,
    /// Key usage includes digital signature
    pub digital_signature: bool,
    /// Basic constraints mark this as a CA
    pub is_ca: bool,
    /// Extended key usage lists client authentication
    pub client_auth: bool,
    /// Extended key usage lists anything besides client authentication
    pub other_usages: bool,
}

impl CertificateInfo {
    /// Whether the certificate may only prove a client's identity.
    #[must_use]
    pub fn is_client_auth_only(&self) -> bool {
        self.client_auth && !self.other_usages && !self.is_ca
    }

    /// Require client-authentication-only usage.
    ///
    /// # Errors
    ///
    /// Returns `CertError::NotClientAuth` otherwise.
    pub fn require_client_auth_only(&self) -> Result<(), CertError> {
        if self.is_client_auth_only() {
            Ok(())
        } else {
            Err(CertError::NotClientAuth)
        }
    }
}

/// Parse a DER-encoded X.509 certificate.
///
/// # Errors
///
/// Returns `CertError::TooLarge` if certificate exceeds 16KB.
/// Returns `CertError::ParseError` if the certificate is malformed.
pub fn inspect_certificate(cert_der: &[u8]) -> Result<CertificateInfo, CertError> {
    if cert_der.len() > MAX_CERT_SIZE {
        return Err(CertError::TooLarge(cert_der.len()));
    }

    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| CertError::ParseError(format!("{:?}", e)))?;

    let subject_common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    let digital_signature = cert
        .key_usage()
        .map_err(|e| CertError::ParseError(format!("{:?}", e)))?
        .is_some_and(|ku| ku.value.digital_signature());

    let (client_auth, other_usages) = match cert
        .extended_key_usage()
        .map_err(|e| CertError::ParseError(format!("{:?}", e)))?
    {
        Some(eku) => {
            let eku = eku.value;
            let others = eku.any
                || eku.server_auth
                || eku.code_signing
                || eku.email_protection
                || eku.time_stamping
                || eku.ocsp_signing
                || !eku.other.is_empty();
            (eku.client_auth, others)
        }
        None => (false, false),
    };

    let validity = cert.validity();

    Ok(CertificateInfo {
        subject_common_name,
        serial: cert.raw_serial().to_vec(),
        not_before: validity.not_before.timestamp(),
        not_after: validity.not_after.timestamp(),
        public_key: cert.public_key().subject_public_key.data.to_vec(),
        digital_signature,
        is_ca: cert.is_ca(),
        client_auth,
        other_usages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cert_too_large() {
        let large_data = vec![0u8; MAX_CERT_SIZE + 1];
        let result = inspect_certificate(&large_data);
        assert!(matches!(result, Err(CertError::TooLarge(_))));
    }

    #[test]
    fn test_invalid_cert() {
        let result = inspect_certificate(b"not a certificate");
        assert!(matches!(result, Err(CertError::ParseError(_))));
    }

    #[test]
    fn test_build_request_binds_key_and_name() {
        let key = PrivateKey::generate();
        let request = SigningRequest::build(&key, "admin@laptop").unwrap();

        assert!(request.as_pem().starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

        let info = request.inspect().unwrap();
        assert_eq!(info.common_name, "admin@laptop");
        assert_eq!(info.public_key, key.public_key().to_bytes().to_vec());
    }

    #[test]
    fn test_request_with_wrong_label_rejected() {
        let key = PrivateKey::generate();
        let pem = SigningRequest::build(&key, "admin@laptop")
            .unwrap()
            .as_pem()
            .replace("CERTIFICATE REQUEST", "CERTIFICATE");
        let result = SigningRequest::from_pem(pem).inspect();
        assert!(matches!(result, Err(CertError::InvalidPem(_))));
    }

    #[test]
    fn test_issued_certificate_rejects_non_certificate() {
        let key = PrivateKey::generate();
        let request = SigningRequest::build(&key, "admin@laptop").unwrap();
        let result = IssuedCertificate::from_pem(request.as_pem());
        assert!(matches!(result, Err(CertError::InvalidPem(_))));
    }

    #[test]
    fn test_decode_pem_block_missing() {
        assert!(matches!(
            decode_pem_block(b"", CERT_LABEL),
            Err(CertError::InvalidPem(_))
        ));
    }
}
