//! End-to-end tests over a real socket.
//!
//! Each test binds the server to `127.0.0.1:0` and drives it with a
//! `tokio-tungstenite` client, the way a remote agent would.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use atrium_core::config::ServerSettings;
use atrium_core::{ErrorKind, Response, Status, StubEngineFactory};
use atrium_server::startup::spawn_server;
use atrium_server::state::AppState;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

fn settings(ping_interval_secs: u64, ping_timeout_secs: u64) -> ServerSettings {
    ServerSettings {
        host: String::from("127.0.0.1"),
        port: 0,
        ping_interval_secs,
        ping_timeout_secs,
    }
}

async fn serve(
    factory: StubEngineFactory,
    settings: ServerSettings,
) -> (SocketAddr, Arc<AppState<StubEngineFactory>>) {
    let state = Arc::new(AppState::new(Arc::new(factory), settings));
    let (addr, _handle) = spawn_server(Arc::clone(&state)).await.unwrap();
    (addr, state)
}

fn stub() -> StubEngineFactory {
    StubEngineFactory::new(["X", "Y"]).with_frame_size(2, 2)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    client
}

async fn send(client: &mut Client, id: u64, command: &str, args: Value) {
    let frame = json!({ "id": id, "command": command, "args": args });
    client.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next text frame, skipping keepalive traffic.
async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = timeout(WAIT, client.next()).await.unwrap();
        match frame {
            Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn call(client: &mut Client, id: u64, command: &str, args: Value) -> Response {
    send(client, id, command, args).await;
    Response::from_json(&next_text(client).await).unwrap()
}

async fn wait_for_no_connections(state: &AppState<StubEngineFactory>) {
    timeout(WAIT, async {
        while state.status().active_connections > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_full_session_over_socket() {
    let (addr, _state) = serve(stub(), settings(25, 300)).await;
    let mut client = connect(addr).await;

    let init = call(&mut client, 1, "init", json!({})).await;
    assert_eq!(init.id, Some(1));
    assert_eq!(init.message.as_deref(), Some("initialized"));

    let start = call(&mut client, 2, "start", json!({ "scene": "X" })).await;
    assert!(start.is_ok(), "{start:?}");

    let step = call(&mut client, 3, "action", json!({ "name": "forward" })).await;
    assert!(step.is_ok());
    let data = step.data.unwrap().to_json().unwrap();
    let data: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(data["step"], 1);
    assert_eq!(data["sensors"]["color"]["datatype"], "uint8");

    let metadata = call(&mut client, 4, "get_observation_metadata", Value::Null).await;
    assert_eq!(metadata.id, Some(4));
    let metadata: Value =
        serde_json::from_str(&metadata.data.unwrap().to_json().unwrap()).unwrap();
    assert_eq!(metadata["sensors"]["color"]["shape"], json!([2, 2, 4]));
    assert_eq!(metadata["sensors"]["depth"]["datatype"], "float32");
    assert!(metadata["actions"].as_array().unwrap().contains(&json!("forward")));

    let close = call(&mut client, 5, "close", Value::Null).await;
    assert_eq!(close.message.as_deref(), Some("closed"));

    let after = call(&mut client, 6, "action", json!({ "name": "forward" })).await;
    assert_eq!(after.error, Some(ErrorKind::SessionClosedError));
}

#[tokio::test]
async fn test_malformed_frames_get_error_responses() {
    let (addr, _state) = serve(stub(), settings(25, 300)).await;
    let mut client = connect(addr).await;

    client.send(Message::text("{not json")).await.unwrap();
    let garbage = Response::from_json(&next_text(&mut client).await).unwrap();
    assert_eq!(garbage.id, None);
    assert_eq!(garbage.status, Status::Error);
    assert_eq!(garbage.error, Some(ErrorKind::UnknownCommandError));

    client
        .send(Message::text(r#"{"id":9,"args":{}}"#))
        .await
        .unwrap();
    let missing = Response::from_json(&next_text(&mut client).await).unwrap();
    assert_eq!(missing.id, Some(9));
    assert_eq!(missing.error, Some(ErrorKind::UnknownCommandError));

    client.send(Message::binary(vec![1_u8, 2, 3])).await.unwrap();
    let binary = Response::from_json(&next_text(&mut client).await).unwrap();
    assert_eq!(binary.error, Some(ErrorKind::UnknownCommandError));

    let unknown = call(&mut client, 10, "teleport", Value::Null).await;
    assert_eq!(unknown.id, Some(10));
    assert_eq!(unknown.error, Some(ErrorKind::UnknownCommandError));

    // The connection survives bad input.
    assert!(call(&mut client, 11, "init", Value::Null).await.is_ok());
}

#[tokio::test]
async fn test_overlapping_command_is_busy() {
    let slow = stub().with_build_delay(Duration::from_millis(300));
    let (addr, _state) = serve(slow, settings(25, 300)).await;
    let mut client = connect(addr).await;

    send(&mut client, 1, "start", json!({ "scene": "X" })).await;
    send(&mut client, 2, "action", json!({ "name": "idle" })).await;

    let mut responses = vec![
        Response::from_json(&next_text(&mut client).await).unwrap(),
        Response::from_json(&next_text(&mut client).await).unwrap(),
    ];
    responses.sort_by_key(|r| r.id);

    let [start, action] = responses.as_slice() else {
        panic!("expected two responses");
    };
    assert_eq!(start.id, Some(1));
    assert!(start.is_ok());
    assert_eq!(action.id, Some(2));
    assert_eq!(action.error, Some(ErrorKind::Busy));
}

#[tokio::test]
async fn test_sessions_are_isolated_per_connection() {
    let (addr, state) = serve(stub(), settings(25, 300)).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;

    assert!(call(&mut a, 1, "start", json!({ "scene": "X" })).await.is_ok());
    let b_action = call(&mut b, 1, "action", json!({ "name": "idle" })).await;
    assert_eq!(b_action.error, Some(ErrorKind::NotReadyError));
    assert_eq!(state.status().active_connections, 2);

    drop(a);
    drop(b);
    wait_for_no_connections(&state).await;
    assert_eq!(state.status().total_connections, 2);
}

#[tokio::test]
async fn test_idle_client_is_disconnected() {
    // Pings slower than the timeout so nothing provokes a pong.
    let (addr, state) = serve(stub(), settings(60, 1)).await;
    let mut client = connect(addr).await;
    assert!(call(&mut client, 1, "start", json!({ "scene": "Y" })).await.is_ok());

    let event: Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(event, json!({ "event": "disconnect", "reason": "idle_timeout" }));

    let closing = timeout(WAIT, client.next()).await.unwrap();
    assert!(matches!(closing, Some(Ok(Message::Close(_))) | None));

    wait_for_no_connections(&state).await;
}
