//! `WebSocket` session handler.
//!
//! Each connection to `GET /ws` gets its own [`Dispatcher`] and therefore
//! its own session and engine. Text frames carry JSON requests; every
//! request produces exactly one JSON response frame with the same `id`.
//!
//! Commands run on tasks in a per-connection [`JoinSet`] so the read loop
//! keeps draining the socket while an engine operation is in flight. The
//! dispatcher answers overlapping commands with `Busy`, which keeps
//! responses one-to-one. A task that panics is still answered with an
//! `EngineError`, and once [`MAX_IN_FLIGHT`] commands are pending new
//! frames are answered `Busy` without spawning anything.
//!
//! The server pings every `ping_interval`. Any inbound frame counts as
//! keepalive; after `ping_timeout` of silence the server sends a
//! `disconnect` event, closes the socket, and closes the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use atrium_core::command::FrameError;
use atrium_core::{
    Dispatcher, EngineFactory, ErrorKind, Request, Response, SessionError, Status,
};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{Instant, interval_at, sleep_until};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Capacity of the per-connection outbound frame queue.
const OUTBOUND_CAPACITY: usize = 64;

/// Commands a connection may have pending before frames are refused.
pub const MAX_IN_FLIGHT: usize = 16;

/// Cap for deadlines that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Why the server ended a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// No inbound frame within `ping_timeout`.
    IdleTimeout,
    /// The socket failed.
    TransportError,
}

impl DisconnectReason {
    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::IdleTimeout => "idle_timeout",
            Self::TransportError => "transport_error",
        }
    }
}

/// Server-initiated notice sent before closing a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectEvent {
    /// Always `"disconnect"`.
    pub event: String,
    /// Why the connection is closing.
    pub reason: DisconnectReason,
}

impl DisconnectEvent {
    /// Notice for `reason`.
    pub fn new(reason: DisconnectReason) -> Self {
        Self {
            event: String::from("disconnect"),
            reason,
        }
    }
}

/// Upgrade an HTTP request to a session connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_session<F: EngineFactory>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<F>>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let connection = Uuid::now_v7();
        handle_connection(socket, state).instrument(info_span!("connection", %connection))
    })
}

/// Run one connection until the client leaves or goes idle, then close
/// its session.
async fn handle_connection<F: EngineFactory>(
    socket: WebSocket,
    state: Arc<AppState<F>>,
) {
    let _guard = state.open_connection();
    info!("client connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    // Single writer: responses from command tasks, pings, and the final
    // close all go through the queue.
    let writer = tokio::spawn(
        async move {
            while let Some(frame) = rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if sink.send(frame).await.is_err() {
                    debug!("client disconnected (send failed)");
                    return;
                }
                if closing {
                    return;
                }
            }
            let _ = sink.close().await;
        }
        .in_current_span(),
    );

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&state.factory)));
    let mut tasks = CommandTasks::default();
    let timeout = state.ping_timeout();
    let period = state.ping_interval();
    let mut ping = interval_at(deadline(period), period);
    let idle = sleep_until(deadline(timeout));
    tokio::pin!(idle);

    let reason = loop {
        tokio::select! {
            frame = stream.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket error");
                        break DisconnectReason::TransportError;
                    }
                    None => break DisconnectReason::ClientClosed,
                };
                idle.as_mut().reset(deadline(timeout));
                let request = match frame {
                    Message::Text(text) => Request::from_json(text.as_str()),
                    Message::Binary(_) => Err(FrameError {
                        id: None,
                        reason: String::from("binary frames are not accepted"),
                    }),
                    Message::Ping(data) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break DisconnectReason::TransportError;
                        }
                        continue;
                    }
                    Message::Pong(_) => continue,
                    Message::Close(_) => break DisconnectReason::ClientClosed,
                };
                if let Some(refused) = tasks.submit(&dispatcher, &tx, request) {
                    if tx.send(response_frame(&refused)).await.is_err() {
                        break DisconnectReason::TransportError;
                    }
                }
            }
            Some(joined) = tasks.join_next() => {
                if let Some(response) = tasks.finished(joined) {
                    if tx.send(response_frame(&response)).await.is_err() {
                        break DisconnectReason::TransportError;
                    }
                }
            }
            _ = ping.tick() => {
                if tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break DisconnectReason::TransportError;
                }
            }
            () = &mut idle => {
                warn!(timeout_secs = timeout.as_secs(), "client idle, disconnecting");
                if let Ok(json) = serde_json::to_string(&DisconnectEvent::new(DisconnectReason::IdleTimeout)) {
                    let _ = tx.send(Message::Text(json.into())).await;
                }
                let _ = tx.send(Message::Close(None)).await;
                break DisconnectReason::IdleTimeout;
            }
        }
    };

    // Waits for an in-flight command, then releases the engine. Every
    // command task is reaped before the writer goes away.
    dispatcher.shutdown().await;
    while let Some(joined) = tasks.join_next().await {
        if let Some(response) = tasks.finished(joined) {
            let _ = tx.send(response_frame(&response)).await;
        }
    }
    drop(tx);
    let _ = writer.await;
    info!(reason = reason.as_str(), "client disconnected");
}

fn deadline(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Command tasks of one connection, each mapped to the request id it owes
/// a response to.
#[derive(Default)]
struct CommandTasks {
    set: JoinSet<()>,
    owed: HashMap<task::Id, Option<u64>>,
}

impl CommandTasks {
    /// Dispatch one parsed frame on its own task, which queues the response.
    ///
    /// Returns the `Busy` response to send instead when the connection
    /// already has [`MAX_IN_FLIGHT`] commands pending.
    fn submit<F: EngineFactory>(
        &mut self,
        dispatcher: &Arc<Dispatcher<F>>,
        tx: &mpsc::Sender<Message>,
        request: Result<Request, FrameError>,
    ) -> Option<Response> {
        let (id, command) = match &request {
            Ok(request) => (request.id, request.command.clone()),
            Err(err) => (err.id, String::from("frame")),
        };
        if self.set.len() >= MAX_IN_FLIGHT {
            warn!(id, pending = self.set.len(), "too many commands in flight");
            return Some(Response::error(id, &SessionError::Busy { command }));
        }

        let dispatcher = Arc::clone(dispatcher);
        let tx = tx.clone();
        self.track(id, async move {
            let response = match request {
                Ok(request) => dispatcher.dispatch(request).await,
                Err(err) => {
                    warn!(id = err.id, reason = %err.reason, "malformed frame");
                    err.to_response()
                }
            };
            if tx.send(response_frame(&response)).await.is_err() {
                debug!(id = response.id, "response dropped, client gone");
            }
        });
        None
    }

    fn track<T>(&mut self, id: Option<u64>, command: T)
    where
        T: Future<Output = ()> + Send + 'static,
    {
        let handle = self.set.spawn(command.in_current_span());
        self.owed.insert(handle.id(), id);
    }

    async fn join_next(&mut self) -> Option<Result<(task::Id, ()), JoinError>> {
        self.set.join_next_with_id().await
    }

    /// Forget a finished task. A task that died before answering yields the
    /// error response its request is still owed.
    fn finished(&mut self, joined: Result<(task::Id, ()), JoinError>) -> Option<Response> {
        match joined {
            Ok((task, ())) => {
                self.owed.remove(&task);
                None
            }
            Err(err) => {
                let id = self.owed.remove(&err.id()).flatten();
                warn!(id, error = %err, "command task failed");
                Some(Response {
                    id,
                    status: Status::Error,
                    data: None,
                    message: Some(format!("command failed: {err}")),
                    error: Some(ErrorKind::EngineError),
                })
            }
        }
    }
}

/// Encode a response, falling back to a bare `SerializationError` so the
/// client still gets exactly one reply.
fn response_frame(response: &Response) -> Message {
    let json = response.to_json().or_else(|e| {
        warn!(id = response.id, error = %e, "failed to encode response");
        Response {
            id: response.id,
            status: Status::Error,
            data: None,
            message: Some(format!("response encoding failed: {e}")),
            error: Some(ErrorKind::SerializationError),
        }
        .to_json()
    });
    match json {
        Ok(json) => Message::Text(json.into()),
        Err(_) => Message::Text(
            r#"{"id":null,"status":"error","error":"SerializationError"}"#.into(),
        ),
    }
}
