//! Deterministic in-process simulation engine.
//!
//! [`StubEngine`] stands in for a renderer-backed simulator. It keeps a
//! catalog of buildable scene ids, places the agent inside a fixed
//! 10 x 3 x 10 box, integrates simple kinematic actions and produces colour
//! and depth frames as typed buffers. Start and goal positions that are not
//! given explicitly are sampled from a seeded [`StdRng`], so two handles
//! created with the same seed behave identically.

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use atrium_wire::{BBox, Map, TypedBuffer, Value, Vector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::command::MAX_REPEAT;
use crate::config::EngineConfig;
use crate::engine::{ActionRequest, EngineError, EngineFactory, SceneInfo, SimulationEngine};

/// Walkable volume of every stub scene.
pub const SCENE_BOUNDS: BBox = BBox::new([0.0, 0.0, 0.0], [10.0, 3.0, 10.0]);

/// Distance at which the goal counts as reached.
pub const SUCCESS_RADIUS: f64 = 0.5;

/// Action names understood by the stub engine.
pub const ACTIONS: [&str; 7] = [
    "forward",
    "backward",
    "strafe_left",
    "strafe_right",
    "turn_left",
    "turn_right",
    "idle",
];

const DEFAULT_DISTANCE: f64 = 0.25;
const DEFAULT_TURN: f64 = PI / 12.0;
const STEP_PENALTY: f64 = -0.01;
const SUCCESS_REWARD: f64 = 1.0;
const MAX_FRAME_SIDE: u32 = 4096;
const SPAWN_MARGIN: f64 = 0.5;

/// Creates [`StubEngine`] handles that share one scene catalog.
#[derive(Debug, Clone)]
pub struct StubEngineFactory {
    catalog: Arc<BTreeSet<String>>,
    width: u32,
    height: u32,
    build_delay: Duration,
}

impl StubEngineFactory {
    /// Factory that can build the given scene ids, with 64 x 64 frames and
    /// no build delay.
    pub fn new<I, S>(scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            catalog: Arc::new(scenes.into_iter().map(Into::into).collect()),
            width: 64,
            height: 64,
            build_delay: Duration::ZERO,
        }
    }

    /// Factory configured from the `engine` section of `atrium.yaml`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.scenes.iter().cloned())
            .with_frame_size(config.width, config.height)
            .with_build_delay(config.build_delay())
    }

    /// Set the default sensor frame size.
    #[must_use]
    pub const fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Make every scene build take at least `delay`.
    #[must_use]
    pub const fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    /// Scene ids this factory's engines can build.
    pub fn scenes(&self) -> impl Iterator<Item = &str> {
        self.catalog.iter().map(String::as_str)
    }
}

impl EngineFactory for StubEngineFactory {
    type Engine = StubEngine;

    fn create(&self, params: &Map) -> Result<StubEngine, EngineError> {
        let seed = match params.get("seed") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_i64()
                .and_then(|s| u64::try_from(s).ok())
                .ok_or_else(|| invalid("seed", "expected a non-negative integer"))?,
        };
        let width = frame_side(params, "width", self.width)?;
        let height = frame_side(params, "height", self.height)?;

        Ok(StubEngine {
            catalog: Arc::clone(&self.catalog),
            build_delay: self.build_delay,
            rng: StdRng::seed_from_u64(seed),
            options: Map::new(),
            width,
            height,
            scene: None,
            pending: None,
            episode: 0,
            step: 0,
            position: [0.0; 3],
            angle: 0.0,
            start: [0.0; 3],
            goal: [0.0; 3],
            trace: Vec::new(),
            released: false,
        })
    }
}

/// A single stub simulator handle.
#[derive(Debug)]
pub struct StubEngine {
    catalog: Arc<BTreeSet<String>>,
    build_delay: Duration,
    rng: StdRng,
    options: Map,
    width: u32,
    height: u32,
    scene: Option<String>,
    pending: Option<String>,
    episode: u64,
    step: u64,
    position: [f64; 3],
    angle: f64,
    start: [f64; 3],
    goal: [f64; 3],
    trace: Vec<Value>,
    released: bool,
}

impl StubEngine {
    /// Whether a build has begun and not yet committed or rolled back.
    pub const fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Id of the currently loaded scene.
    pub fn loaded_scene(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    /// Whether [`release`](SimulationEngine::release) has been called.
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Current agent position.
    pub const fn position(&self) -> [f64; 3] {
        self.position
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.released {
            Err(EngineError::Released)
        } else {
            Ok(())
        }
    }

    fn loaded(&self) -> Result<&str, EngineError> {
        self.ensure_live()?;
        self.scene.as_deref().ok_or(EngineError::NoSceneLoaded)
    }

    /// Pick start and goal for a new episode without touching the current
    /// one, so a failed placement leaves it intact.
    fn place_episode(&mut self, config: &Map) -> Result<([f64; 3], [f64; 3]), EngineError> {
        let start = match config.get("start") {
            Some(v) if !v.is_null() => reachable("start", position_of("start", v)?)?,
            _ => self.sample_position(),
        };
        let goal = match config.get("goal") {
            Some(v) if !v.is_null() => reachable("goal", position_of("goal", v)?)?,
            _ => self.sample_position(),
        };
        Ok((start, goal))
    }

    fn sample_position(&mut self) -> [f64; 3] {
        let [min_x, _, min_z] = SCENE_BOUNDS.min;
        let [max_x, _, max_z] = SCENE_BOUNDS.max;
        [
            self.rng
                .random_range((min_x + SPAWN_MARGIN)..(max_x - SPAWN_MARGIN)),
            0.0,
            self.rng
                .random_range((min_z + SPAWN_MARGIN)..(max_z - SPAWN_MARGIN)),
        ]
    }

    fn begin_episode(&mut self, start: [f64; 3], goal: [f64; 3]) {
        self.episode = self.episode.saturating_add(1);
        self.step = 0;
        self.start = start;
        self.goal = goal;
        self.position = start;
        self.angle = 0.0;
        self.trace.clear();
    }

    fn goal_distance(&self) -> f64 {
        distance(self.position, self.goal)
    }

    fn apply(&mut self, action: &ActionRequest) -> Result<(), EngineError> {
        let distance = number_param(&action.params, "distance", DEFAULT_DISTANCE)?;
        let turn = number_param(&action.params, "angle", DEFAULT_TURN)?;
        let (sin, cos) = self.angle.sin_cos();
        match action.name.as_str() {
            "forward" => self.translate(distance * sin, distance * cos),
            "backward" => self.translate(-distance * sin, -distance * cos),
            "strafe_left" => self.translate(distance * cos, -distance * sin),
            "strafe_right" => self.translate(-distance * cos, distance * sin),
            "turn_left" => self.angle = (self.angle + turn).rem_euclid(2.0 * PI),
            "turn_right" => self.angle = (self.angle - turn).rem_euclid(2.0 * PI),
            "idle" => {}
            other => {
                return Err(EngineError::UnknownAction {
                    name: other.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Move in the horizontal plane, stopping at the scene walls.
    fn translate(&mut self, dx: f64, dz: f64) {
        let [x, y, z] = self.position;
        self.position = [
            (x + dx).clamp(SCENE_BOUNDS.min[0], SCENE_BOUNDS.max[0]),
            y,
            (z + dz).clamp(SCENE_BOUNDS.min[2], SCENE_BOUNDS.max[2]),
        ];
    }

    fn agent_state(&self) -> Map {
        Map::new()
            .with("position", Vector::Vec3(self.position))
            .with("angle", self.angle)
    }

    fn observation(&self, action: &str) -> Value {
        let goal_distance = self.goal_distance();
        let done = goal_distance <= SUCCESS_RADIUS;
        let reward = if done {
            SUCCESS_REWARD
        } else {
            STEP_PENALTY
        };
        let sensors = Map::new()
            .with("color", self.color_frame())
            .with("depth", self.depth_frame(goal_distance));

        Value::Map(
            Map::new()
                .with("step", self.step)
                .with("episode", self.episode)
                .with("action", action)
                .with("reward", reward)
                .with("done", done)
                .with("goal_distance", goal_distance)
                .with("agent", self.agent_state())
                .with("sensors", sensors),
        )
    }

    fn pixels(&self) -> usize {
        let w = usize::try_from(self.width).unwrap_or(0);
        let h = usize::try_from(self.height).unwrap_or(0);
        w.saturating_mul(h)
    }

    /// RGBA frame whose pattern shifts with the step counter.
    fn color_frame(&self) -> TypedBuffer {
        let shift = self.step.to_le_bytes().first().copied().unwrap_or(0);
        let bytes = (0..self.pixels().saturating_mul(4))
            .map(|i| i.to_le_bytes().first().copied().unwrap_or(0).wrapping_add(shift))
            .collect();
        TypedBuffer::Uint8(bytes)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn depth_frame(&self, goal_distance: f64) -> TypedBuffer {
        TypedBuffer::Float32(vec![goal_distance as f32; self.pixels()])
    }
}

impl SimulationEngine for StubEngine {
    async fn build(&mut self, config: &Map) -> Result<SceneInfo, EngineError> {
        self.ensure_live()?;
        let scene_id = scene_of(config)?;
        self.pending = Some(scene_id.clone());

        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }
        if !self.catalog.contains(&scene_id) {
            return Err(EngineError::SceneNotFound { scene_id });
        }
        let (start, goal) = self.place_episode(config)?;

        self.pending = None;
        self.scene = Some(scene_id.clone());
        self.episode = 0;
        self.begin_episode(start, goal);
        tracing::debug!(scene_id = %scene_id, "stub scene built");
        Ok(SceneInfo { scene_id })
    }

    async fn wait_for_resources(&mut self) -> Result<(), EngineError> {
        self.loaded()?;
        tokio::task::yield_now().await;
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some(scene_id) = self.pending.take() {
            tracing::debug!(scene_id = %scene_id, "discarding partial scene build");
        }
    }

    async fn reset(&mut self, config: &Map) -> Result<SceneInfo, EngineError> {
        let scene_id = self.loaded()?.to_owned();
        let (start, goal) = self.place_episode(config)?;
        self.begin_episode(start, goal);
        Ok(SceneInfo { scene_id })
    }

    async fn step(&mut self, action: &ActionRequest) -> Result<Value, EngineError> {
        self.loaded()?;
        for _ in 0..action.repeat.clamp(1, MAX_REPEAT) {
            self.apply(action)?;
            self.step = self.step.saturating_add(1);
            self.trace.push(Value::Map(
                Map::new()
                    .with("step", self.step)
                    .with("action", action.name.as_str())
                    .with("position", Vector::Vec3(self.position))
                    .with("angle", self.angle),
            ));
        }
        Ok(self.observation(&action.name))
    }

    fn configure(&mut self, options: &Map) -> Result<Value, EngineError> {
        let width = frame_side(options, "width", self.width)?;
        let height = frame_side(options, "height", self.height)?;
        self.options.merge(options);
        self.width = width;
        self.height = height;

        let mut effective = self.options.clone();
        effective.insert("width", self.width);
        effective.insert("height", self.height);
        effective.insert("renderer", Value::Opaque("renderer".to_owned()));
        Ok(Value::Map(effective))
    }

    async fn episode_info(&mut self) -> Result<Value, EngineError> {
        let scene_id = self.loaded()?.to_owned();
        Ok(Value::Map(
            Map::new()
                .with("scene_id", scene_id)
                .with("episode", self.episode)
                .with("step", self.step)
                .with("start", Vector::Vec3(self.start))
                .with("goal", Vector::Vec3(self.goal))
                .with("bbox", SCENE_BOUNDS)
                .with("goal_distance", self.goal_distance()),
        ))
    }

    fn move_to(&mut self, pose: &Map) -> Result<Value, EngineError> {
        self.loaded()?;
        let target = pose
            .get("position")
            .ok_or_else(|| invalid("position", "missing"))
            .and_then(|v| position_of("position", v))?;
        self.position = reachable("position", target)?;
        if let Some(angle) = pose.get("angle") {
            self.angle = angle
                .as_f64()
                .filter(|a| a.is_finite())
                .ok_or_else(|| invalid("angle", "expected a finite number"))?
                .rem_euclid(2.0 * PI);
        }

        let mut state = self.agent_state();
        state.insert("goal_distance", self.goal_distance());
        Ok(Value::Map(state))
    }

    fn set_goal(&mut self, goal: &Map) -> Result<Value, EngineError> {
        self.loaded()?;
        let target = goal
            .get("position")
            .ok_or_else(|| invalid("position", "missing"))
            .and_then(|v| position_of("position", v))?;
        self.goal = reachable("goal", target)?;
        Ok(Value::Map(
            Map::new()
                .with("goal", Vector::Vec3(self.goal))
                .with("goal_distance", self.goal_distance()),
        ))
    }

    fn observation_metadata(&self) -> Value {
        let color = Map::new().with("datatype", "uint8").with(
            "shape",
            vec![Value::from(self.height), Value::from(self.width), Value::Int(4)],
        );
        let depth = Map::new().with("datatype", "float32").with(
            "shape",
            vec![Value::from(self.height), Value::from(self.width)],
        );
        Value::Map(
            Map::new()
                .with("sensors", Map::new().with("color", color).with("depth", depth))
                .with(
                    "actions",
                    Value::Set(ACTIONS.iter().map(|a| Value::from(*a)).collect()),
                ),
        )
    }

    fn action_trace(&self) -> Value {
        Value::List(self.trace.clone())
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn release(&mut self) {
        self.released = true;
        self.scene = None;
        self.pending = None;
        self.trace.clear();
    }
}

fn invalid(name: &str, reason: &str) -> EngineError {
    EngineError::InvalidParameter {
        name: name.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Scene id from `scene` (a string, or a map with `fullId`/`id`) or `scene_id`.
fn scene_of(config: &Map) -> Result<String, EngineError> {
    let named = match config.get("scene") {
        Some(Value::String(id)) => Some(id.as_str()),
        Some(Value::Map(scene)) => scene
            .get("fullId")
            .or_else(|| scene.get("id"))
            .and_then(Value::as_str),
        _ => config.get("scene_id").and_then(Value::as_str),
    };
    named
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .ok_or(EngineError::NoSceneRequested)
}

/// A position given as a 3-vector or as a map with a `position` 3-vector.
fn position_of(name: &str, value: &Value) -> Result<[f64; 3], EngineError> {
    let vector = match value {
        Value::Map(m) => m.get("position").and_then(Value::as_vector),
        other => other.as_vector(),
    };
    match vector {
        Some(Vector::Vec3(p)) if p.iter().all(|c| c.is_finite()) => Ok(p),
        _ => Err(invalid(name, "expected a finite 3-component position")),
    }
}

fn reachable(name: &str, position: [f64; 3]) -> Result<[f64; 3], EngineError> {
    if SCENE_BOUNDS.contains(position) {
        Ok(position)
    } else {
        Err(EngineError::Unreachable {
            reason: format!("{name} {position:?} lies outside the scene bounds"),
        })
    }
}

fn number_param(params: &Map, name: &str, default: f64) -> Result<f64, EngineError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| invalid(name, "expected a finite number")),
    }
}

fn frame_side(params: &Map, name: &str, default: u32) -> Result<u32, EngineError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_i64()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| (1..=MAX_FRAME_SIDE).contains(n))
            .ok_or_else(|| invalid(name, "expected an integer between 1 and 4096")),
    }
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn factory() -> StubEngineFactory {
        StubEngineFactory::new(["lobby", "garage"]).with_frame_size(4, 2)
    }

    fn scene(id: &str) -> Map {
        Map::new().with("scene", id)
    }

    fn forward(distance: f64, repeat: u32) -> ActionRequest {
        ActionRequest {
            name: "forward".to_owned(),
            params: Map::new().with("distance", distance),
            repeat,
        }
    }

    #[tokio::test]
    async fn build_known_scene_commits() {
        let mut engine = factory().create(&Map::new()).unwrap();
        let info = engine.build(&scene("lobby")).await.unwrap();
        assert_eq!(info.scene_id, "lobby");
        assert_eq!(engine.loaded_scene(), Some("lobby"));
        assert!(!engine.is_loading());
    }

    #[tokio::test]
    async fn failed_build_keeps_previous_scene() {
        let mut engine = factory().create(&Map::new()).unwrap();
        engine.build(&scene("lobby")).await.unwrap();

        let err = engine.build(&scene("attic")).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::SceneNotFound {
                scene_id: "attic".to_owned()
            }
        );
        assert!(engine.is_loading());
        engine.rollback();
        assert!(!engine.is_loading());
        assert_eq!(engine.loaded_scene(), Some("lobby"));
    }

    #[tokio::test]
    async fn scene_accepts_map_form() {
        let mut engine = factory().create(&Map::new()).unwrap();
        let config = Map::new().with("scene", Map::new().with("fullId", "garage"));
        assert_eq!(engine.build(&config).await.unwrap().scene_id, "garage");

        let err = engine.build(&Map::new()).await.unwrap_err();
        assert_eq!(err, EngineError::NoSceneRequested);
    }

    #[tokio::test]
    async fn same_seed_same_episode() {
        let params = Map::new().with("seed", 7_i64);
        let mut a = factory().create(&params).unwrap();
        let mut b = factory().create(&params).unwrap();
        a.build(&scene("lobby")).await.unwrap();
        b.build(&scene("lobby")).await.unwrap();
        assert_eq!(a.episode_info().await.unwrap(), b.episode_info().await.unwrap());

        a.seed(99);
        b.seed(99);
        a.reset(&Map::new()).await.unwrap();
        b.reset(&Map::new()).await.unwrap();
        assert_eq!(a.episode_info().await.unwrap(), b.episode_info().await.unwrap());
    }

    #[tokio::test]
    async fn step_moves_agent_and_counts() {
        let mut engine = factory().create(&Map::new()).unwrap();
        let config = scene("lobby")
            .with("start", Vector::Vec3([5.0, 0.0, 5.0]))
            .with("goal", Vector::Vec3([5.0, 0.0, 8.0]));
        engine.build(&config).await.unwrap();

        let obs = engine.step(&forward(1.0, 2)).await.unwrap();
        assert_eq!(obs.get("step"), Some(&Value::Int(2)));
        assert_eq!(engine.position(), [5.0, 0.0, 7.0]);
        assert_eq!(obs.get("goal_distance").and_then(Value::as_f64), Some(1.0));

        let color = obs.get("sensors").and_then(|s| s.get("color")).unwrap();
        assert_eq!(color.as_buffer().map(TypedBuffer::len), Some(4 * 2 * 4));

        let trace = engine.action_trace();
        assert!(matches!(trace, Value::List(ref steps) if steps.len() == 2));
    }

    #[tokio::test]
    async fn reaching_goal_sets_done() {
        let mut engine = factory().create(&Map::new()).unwrap();
        let config = scene("lobby")
            .with("start", Vector::Vec3([5.0, 0.0, 5.0]))
            .with("goal", Vector::Vec3([5.0, 0.0, 6.0]));
        engine.build(&config).await.unwrap();

        let obs = engine.step(&forward(1.0, 1)).await.unwrap();
        assert_eq!(obs.get("done"), Some(&Value::Bool(true)));
        assert_eq!(obs.get("reward"), Some(&Value::Float(SUCCESS_REWARD)));
    }

    #[tokio::test]
    async fn walls_stop_the_agent() {
        let mut engine = factory().create(&Map::new()).unwrap();
        let config = scene("lobby").with("start", Vector::Vec3([5.0, 0.0, 9.5]));
        engine.build(&config).await.unwrap();
        engine.step(&forward(5.0, 1)).await.unwrap();
        assert_eq!(engine.position(), [5.0, 0.0, 10.0]);
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let mut engine = factory().create(&Map::new()).unwrap();
        engine.build(&scene("lobby")).await.unwrap();
        let request = ActionRequest {
            name: "jump".to_owned(),
            params: Map::new(),
            repeat: 1,
        };
        assert!(matches!(
            engine.step(&request).await,
            Err(EngineError::UnknownAction { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_start_fails_build() {
        let mut engine = factory().create(&Map::new()).unwrap();
        let config = scene("lobby").with("start", Vector::Vec3([50.0, 0.0, 5.0]));
        assert!(matches!(
            engine.build(&config).await,
            Err(EngineError::Unreachable { .. })
        ));
        engine.rollback();
        assert_eq!(engine.loaded_scene(), None);
    }

    #[tokio::test]
    async fn move_to_and_set_goal() {
        let mut engine = factory().create(&Map::new()).unwrap();
        engine.build(&scene("lobby")).await.unwrap();

        let pose = Map::new().with("position", Vector::Vec3([1.0, 0.0, 1.0]));
        let state = engine.move_to(&pose).unwrap();
        assert_eq!(
            state.get("position").and_then(Value::as_vector),
            Some(Vector::Vec3([1.0, 0.0, 1.0]))
        );

        let goal = Map::new().with("position", Vector::Vec3([1.0, 0.0, 4.0]));
        let updated = engine.set_goal(&goal).unwrap();
        assert_eq!(updated.get("goal_distance").and_then(Value::as_f64), Some(3.0));

        let outside = Map::new().with("position", Vector::Vec3([1.0, 9.0, 1.0]));
        assert!(engine.move_to(&outside).is_err());
    }

    #[test]
    fn configure_merges_and_exposes_renderer() {
        let mut engine = factory().create(&Map::new()).unwrap();
        engine.configure(&Map::new().with("depth_noise", 0.1)).unwrap();
        let effective = engine.configure(&Map::new().with("width", 8_i64)).unwrap();
        assert_eq!(effective.get("depth_noise"), Some(&Value::Float(0.1)));
        assert_eq!(effective.get("width"), Some(&Value::Int(8)));
        assert!(matches!(effective.get("renderer"), Some(Value::Opaque(_))));
    }

    #[test]
    fn configure_rejects_bad_frame_size_without_merging() {
        let mut engine = factory().create(&Map::new()).unwrap();
        for bad in [Value::Int(0), Value::Int(5000), Value::from("wide")] {
            let options = Map::new().with("width", bad).with("depth_noise", 0.2);
            assert!(matches!(
                engine.configure(&options),
                Err(EngineError::InvalidParameter { ref name, .. }) if name == "width"
            ));
        }
        let effective = engine.configure(&Map::new()).unwrap();
        assert_eq!(effective.get("width"), Some(&Value::Int(4)));
        assert!(effective.get("depth_noise").is_none());
    }

    #[test]
    fn create_rejects_bad_params() {
        assert!(factory().create(&Map::new().with("seed", -1_i64)).is_err());
        assert!(factory().create(&Map::new().with("width", 0_i64)).is_err());
    }

    #[tokio::test]
    async fn released_engine_refuses_work() {
        let mut engine = factory().create(&Map::new()).unwrap();
        engine.build(&scene("lobby")).await.unwrap();
        engine.release();
        assert!(engine.is_released());
        assert_eq!(
            engine.build(&scene("lobby")).await.unwrap_err(),
            EngineError::Released
        );
        assert_eq!(engine.episode_info().await.unwrap_err(), EngineError::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn build_delay_is_honoured() {
        let mut engine = factory()
            .with_build_delay(Duration::from_secs(2))
            .create(&Map::new())
            .unwrap();
        let before = tokio::time::Instant::now();
        engine.build(&scene("lobby")).await.unwrap();
        assert!(before.elapsed() >= Duration::from_secs(2));
    }
}
