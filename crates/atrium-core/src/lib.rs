//! Session control for the Atrium embodied-agent simulator server.
//!
//! A client drives one opaque simulation engine through a small command
//! protocol: `init`, `start`, `reset`, `configure`, `action`, queries, and
//! `close`. This crate owns everything between the transport and the
//! engine.
//!
//! # Modules
//!
//! - [`engine`] -- [`SimulationEngine`] and [`EngineFactory`], the contract
//!   an engine must satisfy.
//! - [`stub`] -- [`StubEngine`], a deterministic in-process engine.
//! - [`session`] -- the per-connection [`Session`] state machine.
//! - [`command`] -- parsed [`Command`]s and the request/response envelopes.
//! - [`dispatch`] -- [`Dispatcher`], which serializes commands onto a
//!   session and guarantees one response per request.
//! - [`error`] -- [`SessionError`] and the wire error kinds.
//! - [`planner`] -- the scene-reuse planner for batch drivers.
//! - [`scheduler`] -- fixed and random episode schedules.
//! - [`batch`] -- [`EpisodeRunner`], an in-process batch driver.
//! - [`config`] -- `atrium.yaml` loading.
//!
//! [`SimulationEngine`]: engine::SimulationEngine
//! [`EngineFactory`]: engine::EngineFactory
//! [`StubEngine`]: stub::StubEngine
//! [`Session`]: session::Session
//! [`Command`]: command::Command
//! [`Dispatcher`]: dispatch::Dispatcher
//! [`SessionError`]: error::SessionError
//! [`EpisodeRunner`]: batch::EpisodeRunner

pub mod batch;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod planner;
pub mod scheduler;
pub mod session;
pub mod stub;

pub use command::{Command, Request, Response, Status};
pub use dispatch::Dispatcher;
pub use engine::{ActionRequest, EngineError, EngineFactory, SceneInfo, SimulationEngine};
pub use error::{ErrorKind, SessionError};
pub use planner::{ScenePlan, plan};
pub use session::{Session, SessionState};
pub use stub::{StubEngine, StubEngineFactory};
