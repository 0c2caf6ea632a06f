//! Scene-reuse planning for batch drivers.
//!
//! Building a scene dominates batch latency, so consecutive episodes in the
//! same scene reuse the loaded geometry and only move start and goal.

use serde::{Deserialize, Serialize};

/// How to bring up the next episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenePlan {
    /// Full `start`: rebuild the scene.
    Rebuild,
    /// Cheap `reset`: keep the loaded scene, new start and goal.
    Reconfigure,
}

impl ScenePlan {
    /// Upper-case plan name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rebuild => "REBUILD",
            Self::Reconfigure => "RECONFIGURE",
        }
    }
}

impl core::fmt::Display for ScenePlan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide between rebuilding and reconfiguring.
///
/// Reconfigure only when a handle exists and `previous` names the same
/// scene as `next`.
pub fn plan(previous: Option<&str>, next: &str, has_handle: bool) -> ScenePlan {
    match previous {
        Some(prev) if has_handle && prev == next => ScenePlan::Reconfigure,
        _ => ScenePlan::Rebuild,
    }
}
