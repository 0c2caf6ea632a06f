//! In-process batch driving of a session.
//!
//! [`EpisodeRunner`] feeds a sequence of [`EpisodeRecord`]s through one
//! [`Session`], letting the scene-reuse planner pick `start` or `reset`
//! for each, and writes one summary line per record:
//!
//! ```text
//! index,scene_id,plan,status,episode,detail
//! ```
//!
//! The sink is flushed after every line, and [`open_summary_log`] appends,
//! so a long run that dies part-way keeps the lines it already produced.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use atrium_wire::{Map, Value, Vector};

use crate::engine::EngineFactory;
use crate::error::SessionError;
use crate::planner::{ScenePlan, plan};
use crate::scheduler::EpisodeScheduler;
use crate::session::Session;

/// Header line written to a fresh summary log.
pub const SUMMARY_HEADER: &str = "index,scene_id,plan,status,episode,detail";

/// Errors that abort a batch run.
///
/// Per-record engine failures do not abort the run; they are written to
/// the summary and reported in [`EpisodeOutcome::result`].
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Writing the summary failed.
    #[error("summary log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Session setup failed before any record ran.
    #[error("session setup failed: {0}")]
    Session(#[from] SessionError),
}

/// One episode to run.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    /// Scene to run the episode in.
    pub scene_id: String,
    /// Task label, e.g. `pointgoal`.
    pub task: Option<String>,
    /// Agent start position; sampled by the engine when absent.
    pub start: Option<Vector>,
    /// Goal position; sampled by the engine when absent.
    pub goal: Option<Vector>,
    /// Additional configuration merged into the session.
    pub extra: Map,
}

impl EpisodeRecord {
    /// A record that only names its scene.
    pub fn new(scene_id: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            task: None,
            start: None,
            goal: None,
            extra: Map::new(),
        }
    }

    /// Fix the start position.
    #[must_use]
    pub const fn with_start(mut self, start: [f64; 3]) -> Self {
        self.start = Some(Vector::Vec3(start));
        self
    }

    /// Fix the goal position.
    #[must_use]
    pub const fn with_goal(mut self, goal: [f64; 3]) -> Self {
        self.goal = Some(Vector::Vec3(goal));
        self
    }

    /// Session configuration for this episode.
    ///
    /// `start` and `goal` are always present (possibly null) so a value
    /// left over from the previous record never leaks into this one.
    pub fn to_config(&self) -> Map {
        let mut config = self.extra.clone();
        config.insert("scene", self.scene_id.as_str());
        config.insert("start", self.start);
        config.insert("goal", self.goal);
        if let Some(task) = &self.task {
            config.insert("task", task.as_str());
        }
        config
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutcome {
    /// Position of the record in the run.
    pub index: u64,
    /// Scene the record asked for.
    pub scene_id: String,
    /// Whether the scene was rebuilt or reused.
    pub plan: ScenePlan,
    /// Episode summary, or why the episode could not start.
    pub result: Result<Value, SessionError>,
}

/// Totals for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Records processed.
    pub processed: u64,
    /// Records whose episode failed to start.
    pub failed: u64,
    /// Records that rebuilt their scene.
    pub rebuilds: u64,
    /// Records that reused the loaded scene.
    pub reconfigures: u64,
}

impl BatchSummary {
    fn record(&mut self, outcome: &EpisodeOutcome) {
        self.processed = self.processed.saturating_add(1);
        if outcome.result.is_err() {
            self.failed = self.failed.saturating_add(1);
        }
        match outcome.plan {
            ScenePlan::Rebuild => self.rebuilds = self.rebuilds.saturating_add(1),
            ScenePlan::Reconfigure => self.reconfigures = self.reconfigures.saturating_add(1),
        }
    }
}

/// Drives one session through a sequence of episodes.
pub struct EpisodeRunner<F: EngineFactory, W: Write> {
    session: Session<F>,
    sink: W,
    next_index: u64,
}

impl<F: EngineFactory, W: Write> EpisodeRunner<F, W> {
    /// Create the runner and its simulator handle from `params`.
    ///
    /// # Errors
    ///
    /// [`BatchError::Session`] if the handle cannot be created.
    pub fn new(factory: Arc<F>, params: &Map, sink: W) -> Result<Self, BatchError> {
        let mut session = Session::new(factory);
        session.init(params)?;
        Ok(Self {
            session,
            sink,
            next_index: 0,
        })
    }

    /// The underlying session.
    pub const fn session(&self) -> &Session<F> {
        &self.session
    }

    /// Run one record and append its summary line.
    ///
    /// # Errors
    ///
    /// [`BatchError::Io`] if the summary line cannot be written.
    pub async fn run_record(&mut self, record: &EpisodeRecord) -> Result<EpisodeOutcome, BatchError> {
        let plan = plan(
            self.session.scene_id(),
            &record.scene_id,
            self.session.has_handle(),
        );
        let config = record.to_config();
        let result = match plan {
            ScenePlan::Rebuild => self.session.start(&config).await,
            ScenePlan::Reconfigure => self.session.reset(&config).await,
        };

        let index = self.next_index;
        self.next_index = self.next_index.saturating_add(1);
        let outcome = EpisodeOutcome {
            index,
            scene_id: record.scene_id.clone(),
            plan,
            result,
        };
        self.write_line(&outcome)?;

        match &outcome.result {
            Ok(_) => info!(index, scene_id = %record.scene_id, plan = %plan, "episode ready"),
            Err(err) => warn!(index, scene_id = %record.scene_id, plan = %plan, error = %err, "episode failed"),
        }
        Ok(outcome)
    }

    /// Run every record in order.
    ///
    /// # Errors
    ///
    /// [`BatchError::Io`] on the first summary write failure.
    pub async fn run_all<'a, I>(&mut self, records: I) -> Result<BatchSummary, BatchError>
    where
        I: IntoIterator<Item = &'a EpisodeRecord>,
    {
        let mut summary = BatchSummary::default();
        for record in records {
            let outcome = self.run_record(record).await?;
            summary.record(&outcome);
        }
        Ok(summary)
    }

    /// Run up to `limit` episodes drawn from `scheduler`.
    ///
    /// Stops early if the scheduler has no episodes to offer.
    ///
    /// # Errors
    ///
    /// [`BatchError::Io`] on the first summary write failure.
    pub async fn run_scheduled(
        &mut self,
        scheduler: &mut EpisodeScheduler,
        limit: usize,
    ) -> Result<BatchSummary, BatchError> {
        let mut summary = BatchSummary::default();
        for _ in 0..limit {
            let Some(record) = scheduler.next_episode() else {
                break;
            };
            let outcome = self.run_record(&record).await?;
            summary.record(&outcome);
        }
        Ok(summary)
    }

    /// Close the session and hand back the flushed sink.
    ///
    /// # Errors
    ///
    /// [`BatchError::Io`] if the final flush fails.
    pub fn finish(self) -> Result<W, BatchError> {
        let Self {
            mut session,
            mut sink,
            ..
        } = self;
        session.close();
        sink.flush()?;
        Ok(sink)
    }

    fn write_line(&mut self, outcome: &EpisodeOutcome) -> Result<(), BatchError> {
        let (status, detail) = match &outcome.result {
            Ok(summary) => ("OK", describe(summary)),
            Err(err) => ("error", err.to_string()),
        };
        writeln!(
            self.sink,
            "{},{},{},{},{},{}",
            outcome.index,
            field(&outcome.scene_id),
            outcome.plan,
            status,
            self.session.episode_count(),
            field(&detail),
        )?;
        self.sink.flush()?;
        Ok(())
    }
}

/// Open `path` for appending summary lines, writing the header if the file
/// is new or empty.
///
/// # Errors
///
/// [`BatchError::Io`] if the file cannot be opened or written.
pub fn open_summary_log(path: &Path) -> Result<BufWriter<File>, BatchError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let fresh = file.metadata()?.len() == 0;
    let mut writer = BufWriter::new(file);
    if fresh {
        writeln!(writer, "{SUMMARY_HEADER}")?;
        writer.flush()?;
    }
    Ok(writer)
}

/// Short description of an episode summary for the detail column.
fn describe(summary: &Value) -> String {
    summary
        .get("goal_distance")
        .and_then(Value::as_f64)
        .map(|d| format!("goal_distance={d:.3}"))
        .unwrap_or_default()
}

/// Keep a free-text value on one line and inside one column.
fn field(text: &str) -> String {
    text.replace([',', '\n', '\r'], ";")
}
