//! Test harness for pairing listener tests.
//!
//! Sessions bind `127.0.0.1:0` and write records into a temp directory; the
//! client side is plain reqwest so requests go over a real socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use onyx_auth::pairing::{PAIR_PATH, PEM_CONTENT_TYPE, TOKEN_HEADER};
use onyx_auth::{IssuancePolicy, PairingToken, PrivateKey, SigningRequest};
use onyx_engine::{ListenerConfig, PairingListener, PairingSession};
use tempfile::TempDir;

/// The token used by the scripted scenarios.
pub const TEST_TOKEN: &str = "AB3D-7XQ2";

/// Listener with an isolated authorization directory.
pub struct TestEngine {
    pub listener: PairingListener,
    _tmp: TempDir,
    pub auth_dir: PathBuf,
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
            _tmp: tmp,
            auth_dir,
        }
    }

    /// Start a session with the fixed test token.
    pub async fn start(&self) -> PairingSession {
        let token = PairingToken::parse(TEST_TOKEN).expect("test token is valid");
        self.listener
            .start(Some(token))
            .await
            .expect("Failed to start pairing session")
    }

    /// Subjects with a record on disk.
    pub fn recorded_subjects(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.auth_dir) else {
            return Vec::new();
        };
        let mut subjects: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();
        subjects.sort();
        subjects
    }
}

/// A console identity with its signing request.
pub struct TestConsole {
    pub private_key: PrivateKey,
    pub request: SigningRequest,
}

impl TestConsole {
    pub fn new(subject: &str) -> Self {
        let private_key = PrivateKey::generate();
        let request =
            SigningRequest::build(&private_key, subject).expect("Failed to build signing request");
        Self {
            private_key,
            request,
        }
    }
}

/// How the token is presented.
#[derive(Debug, Clone, Copy)]
pub enum TokenHeader {
    Bearer,
    Legacy,
    None,
}

#[derive(Debug)]
pub struct PairResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// POST `body` to the session's endpoint.
pub async fn post_pair(
    addr: SocketAddr,
    token: &str,
    header: TokenHeader,
    body: &str,
) -> reqwest::Result<PairResponse> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut request = client
        .post(format!("http://{addr}{PAIR_PATH}"))
        .header(reqwest::header::CONTENT_TYPE, PEM_CONTENT_TYPE)
        .body(body.to_string());
    request = match header {
        TokenHeader::Bearer => request.bearer_auth(token),
        TokenHeader::Legacy => request.header(TOKEN_HEADER, token),
        TokenHeader::None => request,
    };

    let response = request.send().await?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await?;

    Ok(PairResponse {
        status,
        content_type,
        body,
    })
}

/// POST a console's request with a bearer token.
pub async fn pair(session_addr: SocketAddr, token: &str, console: &TestConsole) -> PairResponse {
    post_pair(session_addr, token, TokenHeader::Bearer, console.request.as_pem())
        .await
        .expect("Pairing request failed to send")
}
