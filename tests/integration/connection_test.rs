// tests/integration/connection_test.rs

//! Integration tests for pipelined TCP sessions
//! Tests: response ordering, peer close, local close, connect errors

use super::test_helpers::{LineServer, config_for};
use bytes::Bytes;
use hsclient::connection::{LOCAL_CLOSE_REASON, PEER_CLOSED_REASON};
use hsclient::{HsClientError, RawCommand, connect};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn command(line: &str) -> Arc<RawCommand> {
    Arc::new(RawCommand::new(format!("{line}\n")))
}

#[tokio::test]
async fn test_pipelined_commands_complete_in_order() {
    let server = LineServer::start(None, Duration::from_secs(5)).await;
    let connection = connect(server.addr, &config_for(server.addr)).await.unwrap();

    let mut responses = Vec::new();
    for i in 0..50 {
        let cmd = command(&format!("0\t=\t1\t{i}"));
        responses.push(cmd.response().unwrap());
        connection.send(cmd).await.unwrap();
    }

    for (i, response) in responses.into_iter().enumerate() {
        let frame = timeout(WAIT, response).await.unwrap().unwrap();
        assert_eq!(frame, Bytes::from(format!("0\t1\t0\t=\t1\t{i}")));
    }

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_unanswered_command_fails_when_server_closes() {
    let server = LineServer::start(Some(3), Duration::from_millis(200)).await;
    let connection = connect(server.addr, &config_for(server.addr)).await.unwrap();

    let mut responses = Vec::new();
    for name in ["A", "B", "C", "D"] {
        let cmd = command(name);
        responses.push(cmd.response().unwrap());
        connection.send(cmd).await.unwrap();
    }
    let d = responses.pop().unwrap();

    for (response, name) in responses.into_iter().zip(["A", "B", "C"]) {
        let frame = timeout(WAIT, response).await.unwrap().unwrap();
        assert_eq!(frame, Bytes::from(format!("0\t1\t{name}")));
    }

    assert_eq!(
        timeout(WAIT, d).await.unwrap(),
        Err(HsClientError::ConnectionClosed(PEER_CLOSED_REASON.to_string()))
    );
    assert!(connection.session.is_closed());
}

#[tokio::test]
async fn test_local_close_fails_outstanding_and_keeps_address() {
    let server = LineServer::start(Some(0), Duration::from_secs(5)).await;
    let connection = connect(server.addr, &config_for(server.addr)).await.unwrap();
    let session = connection.session.clone();
    assert_eq!(session.remote_addr(), Some(server.addr));

    let cmd = command("never answered");
    let response = cmd.response().unwrap();
    connection.send(cmd).await.unwrap();

    connection.close().await.unwrap();

    assert_eq!(
        timeout(WAIT, response).await.unwrap(),
        Err(HsClientError::ConnectionClosed(LOCAL_CLOSE_REASON.to_string()))
    );
    assert_eq!(session.remote_addr(), Some(server.addr));

    let late = command("late");
    let err = session.send(late).await.unwrap_err();
    assert!(err.is_connection_closed());
}

#[tokio::test]
async fn test_connect_refused_is_io_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = connect(addr, &config_for(addr)).await.unwrap_err();
    assert!(matches!(err, HsClientError::Io(_)));
}

#[tokio::test]
async fn test_dropping_connection_shuts_down_session() {
    let server = LineServer::start(Some(0), Duration::from_secs(5)).await;
    let connection = connect(server.addr, &config_for(server.addr)).await.unwrap();
    let session = connection.session.clone();

    let cmd = command("never answered");
    let response = cmd.response().unwrap();
    connection.send(cmd).await.unwrap();

    drop(connection);

    timeout(WAIT, session.closed()).await.unwrap();
    assert!(
        timeout(WAIT, response)
            .await
            .unwrap()
            .unwrap_err()
            .is_connection_closed()
    );
}
