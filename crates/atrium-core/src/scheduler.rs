//! Episode scheduling over a set of scenes.
//!
//! A `fixed` schedule walks the scenes in order and, within each scene,
//! the first `min(available, episodes_per_scene)` episodes before moving
//! on, wrapping around at the end. A `random` schedule picks a random scene
//! every `episodes_per_scene` episodes. All randomness comes from a seeded
//! [`StdRng`] owned by the scheduler.

use core::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::batch::EpisodeRecord;

/// Errors constructing a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// Schedule name other than `fixed` or `random`.
    #[error("invalid schedule type: {0}")]
    UnknownSchedule(String),

    /// No scenes to schedule.
    #[error("no scenes to schedule")]
    NoScenes,

    /// `episodes_per_scene` must be at least one.
    #[error("episodes per scene must be positive")]
    ZeroEpisodesPerScene,
}

/// Scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Scenes in order, episodes in order.
    Fixed,
    /// Random scene every `episodes_per_scene` episodes.
    Random,
}

impl FromStr for Schedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "random" => Ok(Self::Random),
            other => Err(SchedulerError::UnknownSchedule(other.to_owned())),
        }
    }
}

/// The episodes available in one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEpisodes {
    /// Scene id.
    pub scene_id: String,
    /// Episodes in that scene, in file order.
    pub episodes: Vec<EpisodeRecord>,
}

impl SceneEpisodes {
    /// Group `episodes` under `scene_id`.
    pub fn new(scene_id: impl Into<String>, episodes: Vec<EpisodeRecord>) -> Self {
        Self {
            scene_id: scene_id.into(),
            episodes,
        }
    }
}

/// Produces the next episode to run.
#[derive(Debug, Clone)]
pub struct EpisodeScheduler {
    scenes: Vec<SceneEpisodes>,
    schedule: Schedule,
    rng: StdRng,
    episodes_per_scene: usize,
    episodes_this_scene: usize,
    scene_index: Option<usize>,
    state_index: usize,
}

impl EpisodeScheduler {
    /// Create a scheduler.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NoScenes`] for an empty scene list,
    /// [`SchedulerError::ZeroEpisodesPerScene`] for a zero window.
    pub fn new(
        scenes: Vec<SceneEpisodes>,
        schedule: Schedule,
        seed: u64,
        episodes_per_scene: usize,
    ) -> Result<Self, SchedulerError> {
        if scenes.is_empty() {
            return Err(SchedulerError::NoScenes);
        }
        if episodes_per_scene == 0 {
            return Err(SchedulerError::ZeroEpisodesPerScene);
        }
        Ok(Self {
            scenes,
            schedule,
            rng: StdRng::seed_from_u64(seed),
            episodes_per_scene,
            episodes_this_scene: 0,
            scene_index: None,
            state_index: 0,
        })
    }

    /// Reseed the random source.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Rewind to the first episode. The random source is not reseeded.
    pub const fn reset(&mut self) {
        self.episodes_this_scene = 0;
        self.scene_index = None;
        self.state_index = 0;
    }

    /// Scene ids in schedule order.
    pub fn scene_ids(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().map(|s| s.scene_id.as_str())
    }

    /// Length of one pass of a `fixed` schedule; `None` for `random`, which
    /// never ends.
    pub fn num_states(&self) -> Option<usize> {
        match self.schedule {
            Schedule::Random => None,
            Schedule::Fixed => Some(
                self.scenes
                    .iter()
                    .map(|s| self.window(s))
                    .fold(0_usize, usize::saturating_add),
            ),
        }
    }

    /// The next episode, or `None` if no scene has any episodes.
    pub fn next_episode(&mut self) -> Option<EpisodeRecord> {
        match self.schedule {
            Schedule::Fixed => self.next_fixed(),
            Schedule::Random => self.next_random(),
        }
    }

    fn window(&self, scene: &SceneEpisodes) -> usize {
        scene.episodes.len().min(self.episodes_per_scene)
    }

    fn next_fixed(&mut self) -> Option<EpisodeRecord> {
        let current_done = self
            .scene_index
            .and_then(|i| self.scenes.get(i))
            .is_none_or(|s| self.state_index >= self.window(s));

        if current_done {
            // Advance to the next scene that has episodes, at most one lap.
            let start = self.scene_index.map_or(0, |i| i.saturating_add(1));
            let count = self.scenes.len();
            let next = (0..count)
                .map(|offset| start.saturating_add(offset) % count)
                .find(|&i| self.scenes.get(i).is_some_and(|s| self.window(s) > 0))?;
            self.scene_index = Some(next);
            self.state_index = 0;
        }

        let record = self
            .scene_index
            .and_then(|i| self.scenes.get(i))
            .and_then(|s| s.episodes.get(self.state_index))
            .cloned()?;
        self.state_index = self.state_index.saturating_add(1);
        Some(record)
    }

    fn next_random(&mut self) -> Option<EpisodeRecord> {
        if self.episodes_this_scene % self.episodes_per_scene == 0 || self.scene_index.is_none() {
            self.scene_index = Some(self.rng.random_range(0..self.scenes.len()));
        }
        self.episodes_this_scene = self.episodes_this_scene.wrapping_add(1);

        let scene = self.scene_index.and_then(|i| self.scenes.get(i))?;
        if scene.episodes.is_empty() {
            return Some(EpisodeRecord::new(scene.scene_id.clone()));
        }
        let pick = self.rng.random_range(0..scene.episodes.len());
        scene.episodes.get(pick).cloned()
    }
}
