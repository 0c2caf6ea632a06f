//! Command dispatch: one request in, exactly one response out.
//!
//! The [`Dispatcher`] owns a session behind an async mutex. A command that
//! arrives while another is still running on the same session is rejected
//! with `Busy` instead of waiting, because the engine handle cannot be used
//! concurrently and a queued command would silently reorder with respect to
//! the client's view. `close` is the exception: it waits for the in-flight
//! command and then tears the session down.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use atrium_wire::{Value, WireValue, decode, encode, encode_lossy};

use crate::command::{Command, Request, Response};
use crate::engine::EngineFactory;
use crate::error::SessionError;
use crate::session::{Session, SessionState};

/// Serializes commands onto one [`Session`].
#[derive(Debug)]
pub struct Dispatcher<F: EngineFactory> {
    session: Mutex<Session<F>>,
}

impl<F: EngineFactory> Dispatcher<F> {
    /// Dispatcher over a fresh session.
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            session: Mutex::new(Session::new(factory)),
        }
    }

    /// Handle one request. Never fails: every error becomes an error
    /// response carrying the request's correlation id.
    pub async fn dispatch(&self, request: Request) -> Response {
        let id = request.id;
        let command = match Command::parse(&request.command, decode(&request.args)) {
            Ok(command) => command,
            Err(err) => {
                warn!(id, command = %request.command, error = %err, "rejected request");
                return Response::error(id, &err);
            }
        };
        let name = command.name();
        debug!(id, command = name, "dispatching");

        let result = if matches!(command, Command::Close) {
            let mut session = self.session.lock().await;
            Ok(Reply::acknowledged(session.close(), "closed"))
        } else {
            match self.session.try_lock() {
                Ok(mut session) => execute(&mut session, command).await,
                Err(_) => Err(SessionError::Busy {
                    command: name.to_owned(),
                }),
            }
        };

        match result.and_then(Reply::into_wire) {
            Ok((data, message)) => {
                let response = Response::ok(id, data);
                match message {
                    Some(message) => response.with_message(message),
                    None => response,
                }
            }
            Err(err) => {
                warn!(id, command = name, kind = %err.kind(), error = %err, "command failed");
                Response::error(id, &err)
            }
        }
    }

    /// Current session state. Waits for an in-flight command.
    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// Close the session, releasing the engine. Waits for an in-flight
    /// command. Used when the connection goes away without a `close`.
    pub async fn shutdown(&self) {
        self.session.lock().await.close();
    }
}

/// Successful command output before encoding.
struct Reply {
    data: Value,
    lossy: bool,
    message: Option<&'static str>,
}

impl Reply {
    const fn data(data: Value) -> Self {
        Self {
            data,
            lossy: false,
            message: None,
        }
    }

    const fn acknowledged(data: Value, message: &'static str) -> Self {
        Self {
            data,
            lossy: false,
            message: Some(message),
        }
    }

    fn into_wire(self) -> Result<(WireValue, Option<&'static str>), SessionError> {
        let data = if self.lossy {
            encode_lossy(&self.data)?
        } else {
            encode(&self.data)?
        };
        Ok((data, self.message))
    }
}

async fn execute<F: EngineFactory>(
    session: &mut Session<F>,
    command: Command,
) -> Result<Reply, SessionError> {
    let reply = match command {
        Command::Init(params) => Reply::acknowledged(session.init(&params)?, "initialized"),
        Command::Start(params) => Reply::data(session.start(&params).await?),
        Command::Reset(params) => Reply::data(session.reset(&params).await?),
        Command::Configure(options) => Reply {
            data: session.configure(&options)?,
            lossy: true,
            message: None,
        },
        Command::Action(request) => Reply::data(session.action(&request).await?),
        Command::MoveTo(pose) => Reply::data(session.move_to(&pose)?),
        Command::SetGoal(goal) => Reply::data(session.set_goal(&goal)?),
        Command::GetSceneData => Reply::data(session.scene_data().await?),
        Command::GetObservationMetadata => Reply::data(session.observation_metadata()?),
        Command::GetActionTrace => Reply::data(session.action_trace()?),
        Command::Seed(seed) => Reply::data(session.seed(seed)?),
        Command::Close => Reply::acknowledged(session.close(), "closed"),
    };
    Ok(reply)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::Status;
    use crate::error::ErrorKind;
    use crate::stub::StubEngineFactory;
    use atrium_wire::Map;

    fn dispatcher() -> Dispatcher<StubEngineFactory> {
        Dispatcher::new(Arc::new(
            StubEngineFactory::new(["X"]).with_frame_size(2, 2),
        ))
    }

    fn request(id: u64, command: &str, args: Value) -> Request {
        Request::new(id, command, encode(&args).unwrap())
    }

    #[tokio::test]
    async fn response_echoes_id() {
        let d = dispatcher();
        let response = d.dispatch(request(41, "init", Value::Null)).await;
        assert_eq!(response.id, Some(41));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.message.as_deref(), Some("initialized"));
    }

    #[tokio::test]
    async fn unknown_command_keeps_session_usable() {
        let d = dispatcher();
        let response = d.dispatch(request(1, "fly", Value::Null)).await;
        assert_eq!(response.error, Some(ErrorKind::UnknownCommandError));
        assert!(d.dispatch(request(2, "init", Value::Null)).await.is_ok());
    }

    #[tokio::test]
    async fn configure_hides_engine_handles() {
        let d = dispatcher();
        d.dispatch(request(1, "init", Value::Null)).await;
        let response = d
            .dispatch(request(
                2,
                "configure",
                Value::Map(Map::new().with("fov", 90_i64)),
            ))
            .await;
        assert!(response.is_ok());
        let data = response.data.unwrap();
        assert_eq!(data.get("fov"), Some(&WireValue::Int(90)));
        assert!(data.get("renderer").is_none());
    }

    #[tokio::test]
    async fn observation_metadata_over_dispatch() {
        let d = dispatcher();
        let early = d
            .dispatch(request(1, "get_observation_metadata", Value::Null))
            .await;
        assert_eq!(early.error, Some(ErrorKind::NotReadyError));

        d.dispatch(request(2, "start", Value::Map(Map::new().with("scene", "X"))))
            .await;
        let response = d
            .dispatch(request(3, "get_observation_metadata", Value::Null))
            .await;
        assert!(response.is_ok());
        let data = response.data.unwrap();
        let depth = data.get("sensors").and_then(|s| s.get("depth")).unwrap();
        assert_eq!(
            depth.get("datatype"),
            Some(&WireValue::String("float32".to_owned()))
        );
    }

    #[tokio::test]
    async fn configure_with_bad_frame_size_is_an_engine_error() {
        let d = dispatcher();
        d.dispatch(request(1, "init", Value::Null)).await;
        let response = d
            .dispatch(request(
                2,
                "configure",
                Value::Map(Map::new().with("width", 0_i64)),
            ))
            .await;
        assert_eq!(response.error, Some(ErrorKind::EngineError));
    }

    #[tokio::test]
    async fn busy_while_command_in_flight() {
        let d = dispatcher();
        let guard = d.session.lock().await;
        let response = d
            .dispatch(request(
                5,
                "action",
                Value::Map(Map::new().with("name", "forward")),
            ))
            .await;
        assert_eq!(response.error, Some(ErrorKind::Busy));
        assert_eq!(response.id, Some(5));
        drop(guard);
    }

    #[tokio::test]
    async fn close_then_commands_fail_closed() {
        let d = dispatcher();
        let closed = d.dispatch(request(1, "close", Value::Null)).await;
        assert!(closed.is_ok());
        assert_eq!(d.state().await, SessionState::Closed);

        let response = d.dispatch(request(2, "get_scene_data", Value::Null)).await;
        assert_eq!(response.error, Some(ErrorKind::SessionClosedError));
    }

    #[tokio::test]
    async fn shutdown_releases_session() {
        let d = dispatcher();
        d.dispatch(request(1, "start", Value::Map(Map::new().with("scene", "X"))))
            .await;
        d.shutdown().await;
        assert_eq!(d.state().await, SessionState::Closed);
    }
}
