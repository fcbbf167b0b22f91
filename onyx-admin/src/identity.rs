//! Console identity persistence.
//!
//! The private key lives in `certs/client.key` (mode 0600) and the
//! certificate issued by a paired engine in `certs/client.crt`. An existing
//! key is always reused; it is never regenerated or overwritten.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use onyx_auth::{decode_private_key_pem, Fingerprint, IssuedCertificate, PrivateKey};

use crate::error::ClientError;

pub const KEY_FILE: &str = "client.key";
pub const CERT_FILE: &str = "client.crt";

/// Key and certificate files for one console principal.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    dir: PathBuf,
}

impl IdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CERT_FILE)
    }

    /// Load the private key, generating and persisting one if none exists.
    ///
    /// The new key is written to a private temp file and hard-linked into
    /// place, so `client.key` only ever appears complete. A key that
    /// appears concurrently wins and is loaded instead.
    pub fn ensure_identity(&self) -> Result<PrivateKey, ClientError> {
        if let Some(key) = self.load_key()? {
            tracing::debug!(path = %self.key_path().display(), "Using existing identity");
            return Ok(key);
        }

        create_private_dir(&self.dir)?;

        let key = PrivateKey::generate();
        let pem = key.to_pkcs8_pem()?;
        let path = self.key_path();
        let tmp = self.key_tmp_path();

        // Left over from an interrupted write by this process id.
        let _ = fs::remove_file(&tmp);
        let written = write_owner_only(&tmp, pem.as_bytes());
        let linked = written.and_then(|_| fs::hard_link(&tmp, &path));
        let _ = fs::remove_file(&tmp);

        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists && path.exists() => {
                return self
                    .load_key()?
                    .ok_or_else(|| ClientError::persistence(&path, e));
            }
            Err(e) => return Err(ClientError::persistence(&path, e)),
        }

        tracing::info!(
            path = %path.display(),
            fingerprint = %Fingerprint::from_public_key(&key.public_key()),
            "Generated new console identity"
        );
        Ok(key)
    }

    fn key_tmp_path(&self) -> PathBuf {
        self.dir
            .join(format!("{KEY_FILE}.{}.tmp", std::process::id()))
    }

    /// Load the private key if one has been created.
    pub fn load_key(&self) -> Result<Option<PrivateKey>, ClientError> {
        let path = self.key_path();
        let pem = match fs::read_to_string(&path) {
            Ok(pem) => pem,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::persistence(&path, e)),
        };
        Ok(Some(decode_private_key_pem::<PrivateKey>(&pem)?))
    }

    /// Store the certificate issued by an engine, replacing any previous one.
    pub fn save_certificate(&self, cert: &IssuedCertificate) -> Result<PathBuf, ClientError> {
        create_private_dir(&self.dir)?;

        let path = self.cert_path();
        let tmp = self.dir.join(format!("{CERT_FILE}.tmp"));
        fs::write(&tmp, cert.as_pem()).map_err(|e| ClientError::persistence(&tmp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o644))
                .map_err(|e| ClientError::persistence(&tmp, e))?;
        }

        fs::rename(&tmp, &path).map_err(|e| ClientError::persistence(&path, e))?;
        Ok(path)
    }

    /// Load the issued certificate, if pairing has completed before.
    pub fn load_certificate(&self) -> Result<Option<IssuedCertificate>, ClientError> {
        let path = self.cert_path();
        match fs::read_to_string(&path) {
            Ok(pem) => Ok(Some(IssuedCertificate::from_pem(pem)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::persistence(&path, e)),
        }
    }
}

/// Principal name used in signing requests: `admin@<hostname>`.
pub fn default_common_name() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("admin@{host}")
}

fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn create_private_dir(dir: &Path) -> Result<(), ClientError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|e| ClientError::persistence(dir, e))
}
