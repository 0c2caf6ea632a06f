//! The contract a simulation engine must satisfy.
//!
//! The session layer never looks inside an engine. It drives one through
//! [`SimulationEngine`] and creates handles through an [`EngineFactory`],
//! so a real renderer-backed engine and the deterministic
//! [`StubEngine`](crate::stub::StubEngine) are interchangeable.
//!
//! Long-running operations (scene build, resource loading, reset, stepping)
//! are `async`: the command that triggered them is suspended, not the
//! server. The futures are required to be `Send` so sessions can run on a
//! multi-threaded runtime. Dispatch is generic rather than through trait
//! objects, since async trait methods are not dyn-compatible.

use atrium_wire::{Map, Value};

/// Errors reported by a simulation engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The requested scene id is not known to the engine.
    #[error("scene not found: {scene_id}")]
    SceneNotFound {
        /// The unknown scene id.
        scene_id: String,
    },

    /// The configuration does not name a scene to build.
    #[error("no scene specified in configuration")]
    NoSceneRequested,

    /// The operation needs a loaded scene and none is loaded.
    #[error("no scene loaded")]
    NoSceneLoaded,

    /// The action name is not supported.
    #[error("unknown action: {name}")]
    UnknownAction {
        /// The rejected action name.
        name: String,
    },

    /// A start or goal position cannot be reached.
    #[error("unreachable: {reason}")]
    Unreachable {
        /// Why the position is unreachable.
        reason: String,
    },

    /// A construction or action parameter has the wrong shape or range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The engine handle has already been released.
    #[error("engine handle released")]
    Released,

    /// Any other engine failure.
    #[error("engine failure: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

/// Result of a successful scene build or episode reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    /// Id of the scene that is now loaded.
    pub scene_id: String,
}

/// One step request forwarded to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// Action name, e.g. `forward` or `turn_left`.
    pub name: String,
    /// Action parameters, e.g. `distance` or `angle`.
    pub params: Map,
    /// How many times to apply the action. Always at least 1.
    pub repeat: u32,
}

/// A simulator handle owned exclusively by one session.
///
/// Handles are not safe for concurrent use; the session layer guarantees
/// that at most one method runs at a time.
pub trait SimulationEngine: Send + 'static {
    /// Build or load the scene named in `config` and place the agent for a
    /// first episode.
    ///
    /// On failure any previously loaded scene must remain intact; partial
    /// resources are discarded by [`rollback`](Self::rollback).
    fn build(
        &mut self,
        config: &Map,
    ) -> impl Future<Output = Result<SceneInfo, EngineError>> + Send;

    /// Wait until all scene-dependent resources (textures, assets) finish
    /// loading.
    fn wait_for_resources(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Discard resources left behind by a failed build or reset.
    fn rollback(&mut self);

    /// Start a new episode in the loaded scene with a new start and goal.
    fn reset(
        &mut self,
        config: &Map,
    ) -> impl Future<Output = Result<SceneInfo, EngineError>> + Send;

    /// Apply one action request and return the resulting observation.
    fn step(
        &mut self,
        action: &ActionRequest,
    ) -> impl Future<Output = Result<Value, EngineError>> + Send;

    /// Merge `options` into the engine's settings and return the effective
    /// configuration. The result may contain opaque engine handles.
    ///
    /// Options the engine cannot apply are rejected and nothing is merged.
    fn configure(&mut self, options: &Map) -> Result<Value, EngineError>;

    /// Summary of the current episode.
    fn episode_info(&mut self) -> impl Future<Output = Result<Value, EngineError>> + Send;

    /// Teleport the agent to `pose` and return the resulting agent state.
    fn move_to(&mut self, pose: &Map) -> Result<Value, EngineError>;

    /// Replace the episode goal and return the updated goal state.
    fn set_goal(&mut self, goal: &Map) -> Result<Value, EngineError>;

    /// Schema of the sensor outputs.
    fn observation_metadata(&self) -> Value;

    /// Recorded step history of the current episode.
    fn action_trace(&self) -> Value;

    /// Reseed the engine's random source.
    fn seed(&mut self, seed: u64);

    /// Release every engine-owned resource. The handle is unusable after.
    fn release(&mut self);
}

/// Creates simulator handles for new sessions.
pub trait EngineFactory: Send + Sync + 'static {
    /// The handle type this factory produces.
    type Engine: SimulationEngine;

    /// Create a handle from engine construction parameters.
    ///
    /// `params` may carry a `seed`; the factory must thread it into the
    /// handle's random source.
    fn create(&self, params: &Map) -> Result<Self::Engine, EngineError>;
}
