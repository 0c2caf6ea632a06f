//! The per-connection session state machine.
//!
//! A [`Session`] owns at most one simulator handle and walks the lifecycle
//!
//! ```text
//! UNINITIALIZED --init--> CONFIGURED --start/reset--> RUNNING
//!       |                     |                          |
//!       +------------------close-------------------------+--> CLOSED
//! ```
//!
//! `start` and `reset` are all-or-nothing: on engine failure the partial
//! resources are rolled back and the session keeps its prior state, scene
//! and configuration, so a client can retry with corrected parameters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use atrium_wire::{Map, Value};

use crate::engine::{ActionRequest, EngineError, EngineFactory, SceneInfo, SimulationEngine};
use crate::error::SessionError;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No simulator handle exists yet.
    Uninitialized,
    /// A handle exists but no episode has started.
    Configured,
    /// A scene is loaded and accepts actions.
    Running,
    /// Terminal; the handle has been released.
    Closed,
}

impl SessionState {
    /// Upper-case state name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Configured => "CONFIGURED",
            Self::Running => "RUNNING",
            Self::Closed => "CLOSED",
        }
    }
}

impl core::fmt::Display for SessionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulator session.
///
/// Not internally synchronized: callers serialize access, which
/// [`Dispatcher`](crate::dispatch::Dispatcher) does with a mutex.
pub struct Session<F: EngineFactory> {
    factory: Arc<F>,
    state: SessionState,
    handle: Option<F::Engine>,
    current_scene_id: Option<String>,
    configuration: Map,
    episode_count: u64,
}

impl<F: EngineFactory> core::fmt::Debug for Session<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("has_handle", &self.handle.is_some())
            .field("current_scene_id", &self.current_scene_id)
            .field("episode_count", &self.episode_count)
            .finish_non_exhaustive()
    }
}

impl<F: EngineFactory> Session<F> {
    /// A fresh, uninitialized session that creates handles with `factory`.
    pub const fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            state: SessionState::Uninitialized,
            handle: None,
            current_scene_id: None,
            configuration: Map::new(),
            episode_count: 0,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the scene loaded by the last successful `start` or `reset`.
    pub fn scene_id(&self) -> Option<&str> {
        self.current_scene_id.as_deref()
    }

    /// Options accumulated from `init`, `start`, `reset`, `configure` and
    /// `seed`.
    pub const fn configuration(&self) -> &Map {
        &self.configuration
    }

    /// Number of episodes successfully started.
    pub const fn episode_count(&self) -> u64 {
        self.episode_count
    }

    /// Whether a simulator handle currently exists.
    pub const fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// The simulator handle, if one exists.
    pub const fn engine(&self) -> Option<&F::Engine> {
        self.handle.as_ref()
    }

    /// `{state, scene_id, episode_count}` summary.
    pub fn status(&self) -> Value {
        Value::Map(
            Map::new()
                .with("state", self.state.as_str())
                .with("scene_id", self.current_scene_id.clone())
                .with("episode_count", self.episode_count),
        )
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create the simulator handle. Idempotent once a handle exists.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] after `close`, or the engine error
    /// from handle creation.
    pub fn init(&mut self, params: &Map) -> Result<Value, SessionError> {
        self.ensure_open("init")?;
        if self.handle.is_some() {
            debug!(state = %self.state, "init on existing handle");
            return Ok(self.status());
        }

        let mut candidate = self.configuration.clone();
        candidate.merge(params);
        let engine = self.factory.create(&candidate)?;
        self.handle = Some(engine);
        self.configuration = candidate;
        self.state = SessionState::Configured;
        info!(state = %self.state, "simulator handle created");
        Ok(self.status())
    }

    /// Build the configured scene and begin its first episode.
    ///
    /// Creates the handle if `init` was skipped. Accepted from
    /// `UNINITIALIZED`, `CONFIGURED` and, as a full rebuild, `RUNNING`.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] after `close`, or the engine error.
    /// On error the session keeps its prior state, scene and configuration;
    /// a handle created by this call is released again.
    pub async fn start(&mut self, params: &Map) -> Result<Value, SessionError> {
        self.ensure_open("start")?;

        let mut candidate = self.configuration.clone();
        candidate.merge(params);

        let created = self.handle.is_none();
        if created {
            self.handle = Some(self.factory.create(&candidate)?);
        }
        let Some(engine) = self.handle.as_mut() else {
            return Err(EngineError::Released.into());
        };

        match build_episode(engine, &candidate).await {
            Ok((info, summary)) => {
                self.commit_episode(candidate, info);
                Ok(summary)
            }
            Err(err) => {
                engine.rollback();
                if created {
                    engine.release();
                    self.handle = None;
                }
                warn!(state = %self.state, error = %err, "start failed");
                Err(err.into())
            }
        }
    }

    /// Begin a new episode in the loaded scene.
    ///
    /// From `CONFIGURED` with no scene loaded yet, this builds the
    /// configured scene like `start`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] without a handle,
    /// [`SessionError::SessionClosed`] after `close`, or the engine error.
    /// On error the session keeps its prior state.
    pub async fn reset(&mut self, params: &Map) -> Result<Value, SessionError> {
        self.ensure_open("reset")?;
        let state = self.state;
        let has_scene = self.current_scene_id.is_some();
        let Some(engine) = self.handle.as_mut() else {
            return Err(not_ready("reset", state));
        };

        let mut candidate = self.configuration.clone();
        candidate.merge(params);

        let outcome = if has_scene {
            reset_episode(engine, &candidate).await
        } else {
            build_episode(engine, &candidate).await
        };
        match outcome {
            Ok((info, summary)) => {
                self.commit_episode(candidate, info);
                Ok(summary)
            }
            Err(err) => {
                engine.rollback();
                warn!(state = %self.state, error = %err, "reset failed");
                Err(err.into())
            }
        }
    }

    /// Release the handle and every engine-owned resource. Idempotent.
    pub fn close(&mut self) -> Value {
        if self.state != SessionState::Closed {
            if let Some(mut engine) = self.handle.take() {
                engine.release();
            }
            self.current_scene_id = None;
            self.state = SessionState::Closed;
            info!(episodes = self.episode_count, "session closed");
        }
        Value::Bool(true)
    }

    // -----------------------------------------------------------------------
    // Commands on an existing handle
    // -----------------------------------------------------------------------

    /// Merge `options` into the configuration and return the engine's
    /// effective configuration.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] without a handle,
    /// [`SessionError::SessionClosed`] after `close`, or the engine error
    /// when it rejects an option. A rejected call changes nothing.
    pub fn configure(&mut self, options: &Map) -> Result<Value, SessionError> {
        let engine = self.engine_mut("configure")?;
        let effective = engine.configure(options)?;
        self.configuration.merge(options);
        Ok(effective)
    }

    /// Forward one action request and return the observation.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] unless `RUNNING`,
    /// [`SessionError::SessionClosed`] after `close`, or the engine error.
    pub async fn action(&mut self, request: &ActionRequest) -> Result<Value, SessionError> {
        self.ensure_open("action")?;
        let state = self.state;
        match self.handle.as_mut() {
            Some(engine) if state == SessionState::Running => Ok(engine.step(request).await?),
            _ => Err(not_ready("action", state)),
        }
    }

    /// Teleport the agent.
    ///
    /// # Errors
    ///
    /// As [`configure`](Self::configure), plus the engine error.
    pub fn move_to(&mut self, pose: &Map) -> Result<Value, SessionError> {
        Ok(self.engine_mut("move_to")?.move_to(pose)?)
    }

    /// Replace the episode goal.
    ///
    /// # Errors
    ///
    /// As [`configure`](Self::configure), plus the engine error.
    pub fn set_goal(&mut self, goal: &Map) -> Result<Value, SessionError> {
        Ok(self.engine_mut("set_goal")?.set_goal(goal)?)
    }

    /// Summary of the current episode.
    ///
    /// # Errors
    ///
    /// As [`configure`](Self::configure), plus the engine error.
    pub async fn scene_data(&mut self) -> Result<Value, SessionError> {
        Ok(self.engine_mut("get_scene_data")?.episode_info().await?)
    }

    /// Sensor and output schema.
    ///
    /// # Errors
    ///
    /// As [`configure`](Self::configure).
    pub fn observation_metadata(&mut self) -> Result<Value, SessionError> {
        Ok(self
            .engine_mut("get_observation_metadata")?
            .observation_metadata())
    }

    /// Recorded step history of the current episode.
    ///
    /// # Errors
    ///
    /// As [`configure`](Self::configure).
    pub fn action_trace(&mut self) -> Result<Value, SessionError> {
        Ok(self.engine_mut("get_action_trace")?.action_trace())
    }

    /// Reseed the engine and remember the seed in the configuration.
    ///
    /// # Errors
    ///
    /// As [`configure`](Self::configure).
    pub fn seed(&mut self, seed: u64) -> Result<Value, SessionError> {
        self.engine_mut("seed")?.seed(seed);
        self.configuration.insert("seed", seed);
        Ok(Value::Bool(true))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn ensure_open(&self, command: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            Err(SessionError::SessionClosed {
                command: command.to_owned(),
            })
        } else {
            Ok(())
        }
    }

    fn engine_mut(&mut self, command: &str) -> Result<&mut F::Engine, SessionError> {
        self.ensure_open(command)?;
        let state = self.state;
        self.handle.as_mut().ok_or_else(|| not_ready(command, state))
    }

    fn commit_episode(&mut self, configuration: Map, info: SceneInfo) {
        self.configuration = configuration;
        self.episode_count = self.episode_count.saturating_add(1);
        self.state = SessionState::Running;
        info!(
            scene_id = %info.scene_id,
            episode = self.episode_count,
            "episode started"
        );
        self.current_scene_id = Some(info.scene_id);
    }
}

impl<F: EngineFactory> Drop for Session<F> {
    fn drop(&mut self) {
        if let Some(mut engine) = self.handle.take() {
            engine.release();
        }
    }
}

fn not_ready(command: &str, state: SessionState) -> SessionError {
    SessionError::NotReady {
        command: command.to_owned(),
        state,
    }
}

/// Build, wait for resources, then summarize.
async fn build_episode<E: SimulationEngine>(
    engine: &mut E,
    config: &Map,
) -> Result<(SceneInfo, Value), EngineError> {
    let info = engine.build(config).await?;
    engine.wait_for_resources().await?;
    let summary = engine.episode_info().await?;
    Ok((info, summary))
}

async fn reset_episode<E: SimulationEngine>(
    engine: &mut E,
    config: &Map,
) -> Result<(SceneInfo, Value), EngineError> {
    let info = engine.reset(config).await?;
    engine.wait_for_resources().await?;
    let summary = engine.episode_info().await?;
    Ok((info, summary))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stub::StubEngineFactory;

    fn session() -> Session<StubEngineFactory> {
        Session::new(Arc::new(StubEngineFactory::new(["X", "Y"]).with_frame_size(2, 2)))
    }

    fn scene(id: &str) -> Map {
        Map::new().with("scene", id)
    }

    fn forward() -> ActionRequest {
        ActionRequest {
            name: "forward".to_owned(),
            params: Map::new().with("distance", 1_i64),
            repeat: 1,
        }
    }

    #[test]
    fn init_is_idempotent() {
        let mut s = session();
        let first = s.init(&Map::new()).unwrap();
        let second = s.init(&Map::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(s.state(), SessionState::Configured);
        assert!(s.has_handle());
    }

    #[tokio::test]
    async fn action_before_start_is_not_ready() {
        let mut s = session();
        let err = s.action(&forward()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReadyError);

        s.init(&Map::new()).unwrap();
        let err = s.action(&forward()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReadyError);
        assert_eq!(s.state(), SessionState::Configured);
    }

    #[tokio::test]
    async fn start_without_init_creates_handle() {
        let mut s = session();
        let summary = s.start(&scene("X")).await.unwrap();
        assert_eq!(summary.get("scene_id"), Some(&Value::from("X")));
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(s.scene_id(), Some("X"));
        assert_eq!(s.episode_count(), 1);
    }

    #[tokio::test]
    async fn failed_start_from_configured_stays_configured() {
        let mut s = session();
        s.init(&Map::new()).unwrap();
        let err = s.start(&scene("missing")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineError);
        assert_eq!(s.state(), SessionState::Configured);
        assert_eq!(s.scene_id(), None);
        assert!(s.configuration().get("scene").is_none());
        assert!(!s.engine().unwrap().is_loading());

        s.start(&scene("X")).await.unwrap();
        assert_eq!(s.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn failed_lazy_start_releases_handle() {
        let mut s = session();
        s.start(&scene("missing")).await.unwrap_err();
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert!(!s.has_handle());
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_running_scene() {
        let mut s = session();
        s.start(&scene("X")).await.unwrap();
        s.start(&scene("nowhere")).await.unwrap_err();
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(s.scene_id(), Some("X"));
        assert_eq!(s.engine().unwrap().loaded_scene(), Some("X"));
        assert!(s.action(&forward()).await.is_ok());
    }

    #[tokio::test]
    async fn reset_requires_handle_and_counts_episodes() {
        let mut s = session();
        let err = s.reset(&Map::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReadyError);

        s.start(&scene("Y")).await.unwrap();
        let summary = s.reset(&Map::new()).await.unwrap();
        assert_eq!(summary.get("scene_id"), Some(&Value::from("Y")));
        assert_eq!(summary.get("episode"), Some(&Value::Int(2)));
        assert_eq!(s.episode_count(), 2);
    }

    #[tokio::test]
    async fn reset_from_configured_builds_scene() {
        let mut s = session();
        s.init(&scene("X")).unwrap();
        s.reset(&Map::new()).await.unwrap();
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(s.scene_id(), Some("X"));
    }

    #[tokio::test]
    async fn failed_reset_keeps_episode() {
        let mut s = session();
        s.start(&scene("X")).await.unwrap();
        let bad_goal = Map::new().with(
            "goal",
            atrium_wire::Vector::Vec3([100.0, 0.0, 0.0]),
        );
        let err = s.reset(&bad_goal).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineError);
        assert_eq!(s.episode_count(), 1);
        assert!(s.configuration().get("goal").is_none());
    }

    #[test]
    fn configure_accumulates_without_erasing() {
        let mut s = session();
        assert_eq!(
            s.configure(&Map::new()).unwrap_err().kind(),
            ErrorKind::NotReadyError
        );
        s.init(&Map::new()).unwrap();
        s.configure(&Map::new().with("a", 1_i64).with("b", 2_i64)).unwrap();
        s.configure(&Map::new().with("b", 3_i64)).unwrap();
        assert_eq!(s.configuration().get("a"), Some(&Value::Int(1)));
        assert_eq!(s.configuration().get("b"), Some(&Value::Int(3)));
    }

    #[test]
    fn rejected_configure_leaves_configuration_alone() {
        let mut s = session();
        s.init(&Map::new()).unwrap();
        let err = s
            .configure(&Map::new().with("height", -3_i64).with("a", 1_i64))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineError);
        assert!(s.configuration().get("height").is_none());
        assert!(s.configuration().get("a").is_none());
    }

    #[tokio::test]
    async fn observation_metadata_needs_a_handle() {
        let mut s = session();
        assert_eq!(
            s.observation_metadata().unwrap_err().kind(),
            ErrorKind::NotReadyError
        );

        s.start(&scene("X")).await.unwrap();
        let metadata = s.observation_metadata().unwrap();
        let color = metadata.get("sensors").and_then(|v| v.get("color")).unwrap();
        assert_eq!(color.get("datatype").and_then(Value::as_str), Some("uint8"));
        assert_eq!(
            color.get("shape"),
            Some(&Value::List(vec![Value::Int(2), Value::Int(2), Value::Int(4)]))
        );
        let depth = metadata.get("sensors").and_then(|v| v.get("depth")).unwrap();
        assert_eq!(depth.get("datatype").and_then(Value::as_str), Some("float32"));
        assert!(matches!(
            metadata.get("actions"),
            Some(Value::Set(actions)) if actions.contains(&Value::from("forward"))
        ));
    }

    #[test]
    fn seed_is_recorded_in_configuration() {
        let mut s = session();
        s.init(&Map::new()).unwrap();
        assert_eq!(s.seed(11).unwrap(), Value::Bool(true));
        assert_eq!(s.configuration().get("seed"), Some(&Value::Int(11)));
    }

    #[tokio::test]
    async fn close_is_terminal_and_idempotent() {
        let mut s = session();
        s.start(&scene("X")).await.unwrap();
        s.close();
        assert_eq!(s.state(), SessionState::Closed);
        assert!(!s.has_handle());
        assert_eq!(s.close(), Value::Bool(true));

        let err = s.action(&forward()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosedError);
        let err = s.init(&Map::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosedError);
    }

    #[test]
    fn status_reports_state() {
        let s = session();
        let status = s.status();
        assert_eq!(status.get("state"), Some(&Value::from("UNINITIALIZED")));
        assert_eq!(status.get("scene_id"), Some(&Value::Null));
        assert_eq!(status.get("episode_count"), Some(&Value::Int(0)));
    }
}
