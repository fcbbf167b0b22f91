//! Authorization records on disk.
//!
//! One PEM certificate per subject, `<dir>/<subject>.crt`. Records outlive the
//! session authority that signed them; they are the durable proof that a
//! subject was granted a certificate during pairing.

use std::path::{Path, PathBuf};

use onyx_auth::{CertError, IssuedCertificate};

const RECORD_EXTENSION: &str = "crt";

/// A persisted grant for one subject.
#[derive(Debug, Clone)]
pub struct AuthorizationRecord {
    pub subject: String,
    pub path: PathBuf,
    pub certificate: IssuedCertificate,
}

/// Directory of authorization records.
#[derive(Debug, Clone)]
pub struct AuthorizationStore {
    dir: PathBuf,
}

impl AuthorizationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reject subjects that cannot be used verbatim as a file name.
    pub fn validate_subject(subject: &str) -> Result<(), AuthStoreError> {
        let invalid = subject.is_empty()
            || subject.len() > 255
            || subject.starts_with('.')
            || subject
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_control());
        if invalid {
            return Err(AuthStoreError::InvalidSubject(subject.to_string()));
        }
        Ok(())
    }

    fn record_path(&self, subject: &str) -> PathBuf {
        self.dir.join(format!("{subject}.{RECORD_EXTENSION}"))
    }

    /// Write (or replace) the record for `subject`.
    ///
    /// Creates the directory with mode 0755 if absent.
    pub async fn save(
        &self,
        subject: &str,
        certificate: &IssuedCertificate,
    ) -> Result<AuthorizationRecord, AuthStoreError> {
        Self::validate_subject(subject)?;

        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder
            .create(&self.dir)
            .await
            .map_err(|source| AuthStoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.record_path(subject);
        tokio::fs::write(&path, certificate.as_pem())
            .await
            .map_err(|source| AuthStoreError::Io {
                path: path.clone(),
                source,
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|source| AuthStoreError::Io {
                    path: path.clone(),
                    source,
                })?;
        }

        tracing::info!(subject = %subject, path = %path.display(), "Authorization record written");

        Ok(AuthorizationRecord {
            subject: subject.to_string(),
            path,
            certificate: certificate.clone(),
        })
    }

    /// Load the record for `subject`, if one exists.
    pub async fn get(&self, subject: &str) -> Result<Option<AuthorizationRecord>, AuthStoreError> {
        Self::validate_subject(subject)?;
        let path = self.record_path(subject);

        let pem = match tokio::fs::read_to_string(&path).await {
            Ok(pem) => pem,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(AuthStoreError::Io { path, source }),
        };

        let certificate = IssuedCertificate::from_pem(pem)?;
        Ok(Some(AuthorizationRecord {
            subject: subject.to_string(),
            path,
            certificate,
        }))
    }

    /// All readable records, sorted by subject.
    ///
    /// A missing directory means no records. Unparseable files are skipped.
    pub async fn list(&self) -> Result<Vec<AuthorizationRecord>, AuthStoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AuthStoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| AuthStoreError::Io {
                path: self.dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(subject) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };

            let loaded = match tokio::fs::read_to_string(&path).await {
                Ok(pem) => IssuedCertificate::from_pem(pem).map_err(AuthStoreError::from),
                Err(source) => Err(AuthStoreError::Io {
                    path: path.clone(),
                    source,
                }),
            };
            match loaded {
                Ok(certificate) => records.push(AuthorizationRecord {
                    subject,
                    path,
                    certificate,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable authorization record");
                }
            }
        }

        records.sort_by(|a, b| a.subject.cmp(&b.subject));
        Ok(records)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthStoreError {
    #[error("subject {0:?} is not usable as a record name")]
    InvalidSubject(String),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored certificate is invalid: {0}")]
    Certificate(#[from] CertError),
}
