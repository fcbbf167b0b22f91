//! Console configuration and the list of paired engines.
//!
//! Everything lives under one base directory (`~/.config/onyx` unless
//! overridden): `config.toml` for settings and nodes, `certs/` for the
//! console identity.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use onyx_auth::DEFAULT_PAIRING_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::IdentityStore;

pub const CONFIG_FILE: &str = "config.toml";
pub const CERTS_DIR: &str = "certs";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the console keeps its files.
#[derive(Debug, Clone)]
pub struct AdminPaths {
    base: PathBuf,
}

impl AdminPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `~/.config/onyx`.
    pub fn default_base() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".config").join("onyx"))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Use `base` if given, otherwise the default location.
    pub fn resolve(base: Option<PathBuf>) -> Result<Self, ConfigError> {
        match base {
            Some(base) => Ok(Self::new(base)),
            None => Ok(Self::new(Self::default_base()?)),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join(CONFIG_FILE)
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.base.join(CERTS_DIR)
    }

    pub fn identity(&self) -> IdentityStore {
        IdentityStore::new(self.certs_dir())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Port used by `pair` when none is given
    pub default_port: u16,
    pub theme: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PAIRING_PORT,
            theme: "default".to_string(),
        }
    }
}

/// A paired engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub added_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub settings: GlobalSettings,
    pub nodes: Vec<Node>,
}

impl AdminConfig {
    /// Load the config, or the defaults if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the config atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder.create(parent).map_err(write_error(parent))?;
        }

        let content = toml::to_string_pretty(self)?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, content).map_err(write_error(&tmp))?;
        fs::rename(&tmp, path).map_err(write_error(path))?;
        Ok(())
    }

    /// Record a paired engine, timestamped now.
    pub fn add_node(&mut self, name: &str, address: &str, port: u16) -> &Node {
        self.add_node_at(name, address, port, Utc::now())
    }

    /// Upsert by address and port: an existing entry keeps `added_at` and
    /// takes the new name and `last_seen`.
    pub fn add_node_at(
        &mut self,
        name: &str,
        address: &str,
        port: u16,
        now: DateTime<Utc>,
    ) -> &Node {
        let idx = match self
            .nodes
            .iter()
            .position(|n| n.address == address && n.port == port)
        {
            Some(idx) => {
                let node = &mut self.nodes[idx];
                node.name = name.to_string();
                node.last_seen = now;
                idx
            }
            None => {
                self.nodes.push(Node {
                    name: name.to_string(),
                    address: address.to_string(),
                    port,
                    added_at: now,
                    last_seen: now,
                });
                self.nodes.len() - 1
            }
        };
        &self.nodes[idx]
    }

    pub fn find_node(&self, address: &str, port: u16) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.address == address && n.port == port)
    }
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path = path.to_path_buf();
    move |source| ConfigError::Write { path, source }
}
