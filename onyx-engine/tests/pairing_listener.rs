//! End-to-end tests for a single pairing session.
//!
//! Each test binds a real listener on loopback and talks to it over HTTP.

mod common;

use std::time::{Duration, Instant};

use common::{pair, post_pair, TestConsole, TestEngine, TokenHeader, TEST_TOKEN};
use onyx_auth::IssuedCertificate;
use onyx_engine::{SessionOutcome, SessionState, ShutdownCoordinator};

// ============================================================================
// Successful exchange
// ============================================================================

#[tokio::test]
async fn test_valid_token_issues_client_certificate() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let addr = session.local_addr();
    assert_eq!(session.state(), SessionState::Listening);

    let console = TestConsole::new("admin@laptop");
    let response = pair(addr, TEST_TOKEN, &console).await;

    assert_eq!(response.status, 200, "body: {}", response.body);
    assert_eq!(response.content_type.as_deref(), Some("application/x-pem-file"));

    let cert = IssuedCertificate::from_pem(response.body).unwrap();
    let info = cert.inspect().unwrap();
    assert_eq!(info.subject_common_name.as_deref(), Some("admin@laptop"));
    assert!(info.is_client_auth_only());
    assert_eq!(
        info.public_key,
        console.private_key.public_key().to_bytes().to_vec()
    );
    let days = (info.not_after - info.not_before) / 86_400;
    assert!(days == 365 || days == 366);

    assert_eq!(session.state(), SessionState::Succeeded);
    assert_eq!(engine.recorded_subjects(), vec!["admin@laptop"]);

    let mut state = session.subscribe();
    let coordinator = ShutdownCoordinator::new();
    let mut cancel = coordinator.signal();

    let started = Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(3), session.wait(&mut cancel))
        .await
        .expect("session should resolve promptly after success");
    assert!(started.elapsed() <= Duration::from_millis(2500));

    match outcome {
        SessionOutcome::Succeeded(success) => {
            assert_eq!(success.subject, "admin@laptop");
            assert_eq!(success.certificate, cert);
            assert!(success.record_path.ends_with("admin@laptop.crt"));
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(*state.borrow_and_update(), SessionState::Closed);

    // Endpoint is gone.
    let after = post_pair(
        addr,
        TEST_TOKEN,
        TokenHeader::Bearer,
        console.request.as_pem(),
    )
    .await;
    assert!(after.is_err(), "listener should be closed");
}

#[tokio::test]
async fn test_operator_spelling_of_token_accepted() {
    let engine = TestEngine::new();
    let session = engine.start().await;

    let console = TestConsole::new("admin@laptop");
    let response = pair(session.local_addr(), "ab3d7xq2", &console).await;
    assert_eq!(response.status, 200, "body: {}", response.body);
}

#[tokio::test]
async fn test_legacy_token_header_accepted() {
    let engine = TestEngine::new();
    let session = engine.start().await;

    let console = TestConsole::new("admin@laptop");
    let response = post_pair(
        session.local_addr(),
        TEST_TOKEN,
        TokenHeader::Legacy,
        console.request.as_pem(),
    )
    .await
    .unwrap();
    assert_eq!(response.status, 200, "body: {}", response.body);
}

// ============================================================================
// Rejected requests leave the session listening
// ============================================================================

#[tokio::test]
async fn test_wrong_token_rejected_and_session_keeps_listening() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let console = TestConsole::new("admin@laptop");

    let response = pair(session.local_addr(), "WRONG-TOKN", &console).await;
    assert_eq!(response.status, 401);
    assert_eq!(response.body, "invalid pairing token");
    assert_eq!(session.state(), SessionState::Listening);
    assert!(engine.recorded_subjects().is_empty());

    // A well-formed but different token is also rejected.
    let response = pair(session.local_addr(), "ZZZZ-ZZZZ", &console).await;
    assert_eq!(response.status, 401);

    let response = pair(session.local_addr(), TEST_TOKEN, &console).await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let console = TestConsole::new("admin@laptop");

    let response = post_pair(
        session.local_addr(),
        TEST_TOKEN,
        TokenHeader::None,
        console.request.as_pem(),
    )
    .await
    .unwrap();
    assert_eq!(response.status, 401);
    assert_eq!(session.state(), SessionState::Listening);
}

#[tokio::test]
async fn test_malformed_request_rejected_and_session_keeps_listening() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let addr = session.local_addr();

    for body in [
        "",
        "not a pem",
        "-----BEGIN CERTIFICATE REQUEST-----\nAAAA\n-----END CERTIFICATE REQUEST-----\n",
    ] {
        let response = post_pair(addr, TEST_TOKEN, TokenHeader::Bearer, body)
            .await
            .unwrap();
        assert_eq!(response.status, 400, "body {body:?}");
        assert!(response.body.starts_with("malformed signing request"));
        assert_eq!(session.state(), SessionState::Listening);
    }

    let console = TestConsole::new("admin@laptop");
    let response = pair(addr, TEST_TOKEN, &console).await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_oversized_body_is_malformed_request() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let addr = session.local_addr();
    let body = "A".repeat(20 * 1024);

    let response = post_pair(addr, TEST_TOKEN, TokenHeader::Bearer, &body)
        .await
        .unwrap();
    assert_eq!(response.status, 400, "body: {}", response.body);
    assert!(response.body.starts_with("malformed signing request"));
    assert_eq!(session.state(), SessionState::Listening);

    // The token is still checked first.
    let response = post_pair(addr, "ZZZZ-ZZZZ", TokenHeader::Bearer, &body)
        .await
        .unwrap();
    assert_eq!(response.status, 401);

    let response = pair(addr, TEST_TOKEN, &TestConsole::new("admin@laptop")).await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_lowercase_bearer_scheme_accepted() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let console = TestConsole::new("admin@laptop");

    let response = reqwest::Client::new()
        .post(format!("http://{}/pair", session.local_addr()))
        .header(reqwest::header::AUTHORIZATION, format!("bearer {TEST_TOKEN}"))
        .body(console.request.as_pem().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_path_like_subject_rejected() {
    let engine = TestEngine::new();
    let session = engine.start().await;

    let console = TestConsole::new("../../etc/evil");
    let response = pair(session.local_addr(), TEST_TOKEN, &console).await;
    assert_eq!(response.status, 400);
    assert!(engine.recorded_subjects().is_empty());
    assert_eq!(session.state(), SessionState::Listening);
}

// ============================================================================
// Single use
// ============================================================================

#[tokio::test]
async fn test_token_cannot_be_reused_after_success() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let addr = session.local_addr();

    let first = pair(addr, TEST_TOKEN, &TestConsole::new("admin@laptop")).await;
    assert_eq!(first.status, 200);

    let second = pair(addr, TEST_TOKEN, &TestConsole::new("intruder@elsewhere")).await;
    assert_eq!(second.status, 401);
    assert_eq!(second.body, "token already used");
    assert_eq!(engine.recorded_subjects(), vec!["admin@laptop"]);
}

#[tokio::test]
async fn test_concurrent_valid_requests_exactly_one_succeeds() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let addr = session.local_addr();

    let attempts = (0..8).map(|i| {
        let console = TestConsole::new(&format!("console-{i}@lab"));
        async move { pair(addr, TEST_TOKEN, &console).await }
    });
    let responses = futures::future::join_all(attempts).await;

    let ok = responses.iter().filter(|r| r.status == 200).count();
    let consumed = responses
        .iter()
        .filter(|r| r.status == 401 && r.body == "token already used")
        .count();
    assert_eq!(ok, 1);
    assert_eq!(consumed, 7);
    assert_eq!(engine.recorded_subjects().len(), 1);

    let coordinator = ShutdownCoordinator::new();
    let mut cancel = coordinator.signal();
    assert!(matches!(
        session.wait(&mut cancel).await,
        SessionOutcome::Succeeded(_)
    ));
}

// ============================================================================
// Expiry and cancellation
// ============================================================================

#[tokio::test]
async fn test_session_expires_without_valid_request() {
    let engine = TestEngine::with_window(Duration::from_millis(300));
    let session = engine.start().await;
    let addr = session.local_addr();
    let mut state = session.subscribe();

    let response = pair(addr, "WRONG-TOKN", &TestConsole::new("admin@laptop")).await;
    assert_eq!(response.status, 401);

    let coordinator = ShutdownCoordinator::new();
    let mut cancel = coordinator.signal();
    let outcome = tokio::time::timeout(Duration::from_secs(5), session.wait(&mut cancel))
        .await
        .unwrap();

    assert!(matches!(outcome, SessionOutcome::Expired));
    assert_eq!(*state.borrow_and_update(), SessionState::Closed);
    assert!(engine.recorded_subjects().is_empty());
}

#[tokio::test]
async fn test_cancel_ends_session() {
    let engine = TestEngine::new();
    let session = engine.start().await;
    let addr = session.local_addr();

    let coordinator = ShutdownCoordinator::new();
    let mut cancel = coordinator.signal();
    let waiter = tokio::spawn(async move { session.wait(&mut cancel).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.shutdown();

    let outcome = tokio::time::timeout(Duration::from_secs(3), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Canceled));

    let console = TestConsole::new("admin@laptop");
    let after = post_pair(addr, TEST_TOKEN, TokenHeader::Bearer, console.request.as_pem()).await;
    assert!(after.is_err(), "listener should be closed");
    assert!(engine.recorded_subjects().is_empty());
}
