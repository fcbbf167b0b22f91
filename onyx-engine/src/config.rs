//! Pairing listener configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub use onyx_auth::pairing::DEFAULT_PAIRING_PORT;
use onyx_auth::IssuancePolicy;

/// How long a pairing session accepts requests.
pub const DEFAULT_PAIRING_WINDOW: Duration = Duration::from_secs(5 * 60);

/// How long in-flight responses may take once a session ends.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Where authorization records are written.
pub const DEFAULT_AUTH_DIR: &str = "/var/lib/onyx/auth/clients";

/// Errors from parsing configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid duration: {0:?} (expected e.g. 90s, 5m, 1h)")]
    InvalidDuration(String),
}

/// Settings for one pairing listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Session deadline, armed when the endpoint opens.
    pub window: Duration,
    /// Bound on teardown after a terminal transition.
    pub grace: Duration,
    pub auth_dir: PathBuf,
    pub policy: IssuancePolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PAIRING_PORT,
            window: DEFAULT_PAIRING_WINDOW,
            grace: DEFAULT_SHUTDOWN_GRACE,
            auth_dir: PathBuf::from(DEFAULT_AUTH_DIR),
            policy: IssuancePolicy::default(),
        }
    }
}

impl ListenerConfig {
    /// Socket address the endpoint binds to.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Parse a duration string like "90s", "5m" or "1h".
///
/// A bare number is taken as seconds. Zero is rejected.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();

    let (num_str, unit) = if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else {
        (s, 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(s.to_string()))?;
    if num == 0 {
        return Err(ConfigError::InvalidDuration(s.to_string()));
    }

    Ok(Duration::from_secs(num.saturating_mul(unit)))
}
