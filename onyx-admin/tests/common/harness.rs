//! Test harness for console pairing tests.
//!
//! An in-process engine listener on `127.0.0.1:0` and a console whose
//! config directory lives in a temp directory.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use onyx_admin::{AdminPaths, PairRequest, PairingClient};
use onyx_auth::{IssuancePolicy, PairingToken};
use onyx_engine::{AuthorizationStore, ListenerConfig, PairingListener, PairingSession};
use tempfile::TempDir;

pub const TEST_TOKEN: &str = "AB3D-7XQ2";
pub const TEST_SUBJECT: &str = "admin@laptop";

/// Engine side: a listener writing records into its own temp directory.
pub struct TestEngine {
    pub listener: PairingListener,
    pub store: AuthorizationStore,
    _tmp: TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(300))
    }

    pub fn with_window(window: Duration) -> Self {
        let tmp = TempDir::new().expect("Failed to create temp dir");
        let auth_dir = tmp.path().join("auth").join("clients");
        let config = ListenerConfig {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            window,
            grace: Duration::from_secs(2),
            auth_dir: auth_dir.clone(),
            policy: IssuancePolicy::default(),
        };
        Self {
            listener: PairingListener::new(config),
            store: AuthorizationStore::new(auth_dir),
            _tmp: tmp,
        }
    }

    pub async fn start(&self) -> PairingSession {
        let token = PairingToken::parse(TEST_TOKEN).expect("test token is valid");
        self.listener
            .start(Some(token))
            .await
            .expect("Failed to start pairing session")
    }
}

/// Console side: an isolated `~/.config/onyx`.
pub struct TestConsole {
    pub paths: AdminPaths,
    pub client: PairingClient,
    _tmp: TempDir,
}

impl TestConsole {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("Failed to create temp dir");
        let paths = AdminPaths::new(tmp.path().join("onyx"));
        let client = PairingClient::with_timeout(Duration::from_secs(5))
            .expect("Failed to build pairing client");
        Self {
            paths,
            client,
            _tmp: tmp,
        }
    }

    /// A request against `session` with the given token text.
    pub fn request(&self, session: &PairingSession, token: &str) -> PairRequest {
        PairRequest {
            address: session.local_addr().ip().to_string(),
            port: session.local_addr().port(),
            token: PairingToken::parse(token).expect("token text is well-formed"),
            common_name: TEST_SUBJECT.to_string(),
            name: None,
        }
    }
}

