mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use opsgate_contracts::TargetKind;
use opsgate_gateway::broker::BrokerError;
use tokio::net::TcpListener;

use support::{ARGO_TOKEN, MockArgo, argo_router, broker_for, spawn_server};

#[tokio::test]
async fn open_session_logs_in_with_stored_credentials() {
    let mock = Arc::new(MockArgo::default());
    let (addr, shutdown, handle) = spawn_server(argo_router(mock.clone())).await;

    let broker = broker_for(addr, Duration::from_secs(5));
    let session = broker
        .open_session(Some("prod"))
        .await
        .expect("login should succeed");

    assert_eq!(session.token(), ARGO_TOKEN);
    assert_eq!(session.target().name(), "prod");
    assert_eq!(mock.logins.load(Ordering::SeqCst), 1);
    assert_eq!(
        mock.login_bodies.lock().unwrap()[0],
        serde_json::json!({ "username": "admin", "password": "argo-pass" })
    );
    assert!(!format!("{:?}", session).contains(ARGO_TOKEN));

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn every_session_is_a_fresh_login() {
    let mock = Arc::new(MockArgo::default());
    let (addr, shutdown, handle) = spawn_server(argo_router(mock.clone())).await;

    let broker = broker_for(addr, Duration::from_secs(5));
    broker.open_session(None).await.expect("first login");
    broker.open_session(None).await.expect("second login");

    assert_eq!(mock.logins.load(Ordering::SeqCst), 2);

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unknown_target_makes_no_network_call() {
    let mock = Arc::new(MockArgo::default());
    let (addr, shutdown, handle) = spawn_server(argo_router(mock.clone())).await;

    let broker = broker_for(addr, Duration::from_secs(5));
    let err = broker
        .open_session(Some("staging"))
        .await
        .expect_err("unknown target must fail");

    match &err {
        BrokerError::UnknownTarget(unknown) => {
            assert_eq!(unknown.kind, TargetKind::ArgoCd);
            assert_eq!(unknown.name, "staging");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.code(), "ERR_UNKNOWN_TARGET");
    assert_eq!(mock.total_calls(), 0);

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn rejected_login_surfaces_backend_body() {
    let mock = Arc::new(MockArgo {
        login_reply: (
            StatusCode::UNAUTHORIZED,
            r#"{"error":"Invalid username or password"}"#.to_string(),
        ),
        ..MockArgo::default()
    });
    let (addr, shutdown, handle) = spawn_server(argo_router(mock.clone())).await;

    let broker = broker_for(addr, Duration::from_secs(5));
    let err = broker
        .open_session(None)
        .await
        .expect_err("rejected login must fail");

    assert_eq!(
        err,
        BrokerError::AuthRejected {
            status: 401,
            body: r#"{"error":"Invalid username or password"}"#.to_string(),
        }
    );
    assert_eq!(mock.logins.load(Ordering::SeqCst), 1);

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn login_without_token_is_invalid_response() {
    let mock = Arc::new(MockArgo {
        login_reply: (StatusCode::OK, "{}".to_string()),
        ..MockArgo::default()
    });
    let (addr, shutdown, handle) = spawn_server(argo_router(mock.clone())).await;

    let broker = broker_for(addr, Duration::from_secs(5));
    let err = broker.open_session(None).await.expect_err("must fail");
    assert_eq!(err.code(), "ERR_BACKEND_INVALID_RESPONSE");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unreachable_backend_is_reported_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");
    drop(listener);

    let broker = broker_for(addr, Duration::from_secs(2));
    let err = broker
        .open_session(None)
        .await
        .expect_err("closed port must fail");

    assert!(matches!(err, BrokerError::BackendUnreachable(_)));
    assert_eq!(err.code(), "ERR_BACKEND_UNREACHABLE");
}
