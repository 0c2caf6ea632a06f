//! Session-level errors and their wire error kinds.

use serde::{Deserialize, Serialize};

use atrium_wire::SerializationError;

use crate::engine::EngineError;
use crate::session::SessionState;

/// Error kind names carried in the `error` field of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Command issued before the state it requires was reached.
    NotReadyError,
    /// Command issued after `close`.
    SessionClosedError,
    /// Command name not recognised, or the frame was not a command.
    UnknownCommandError,
    /// Arguments failed the shape checks for the command.
    InvalidArgumentError,
    /// The engine result could not be encoded.
    SerializationError,
    /// The engine reported a failure.
    EngineError,
    /// Another command is still in flight on this session.
    Busy,
}

impl ErrorKind {
    /// The kind's wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotReadyError => "NotReadyError",
            Self::SessionClosedError => "SessionClosedError",
            Self::UnknownCommandError => "UnknownCommandError",
            Self::InvalidArgumentError => "InvalidArgumentError",
            Self::SerializationError => "SerializationError",
            Self::EngineError => "EngineError",
            Self::Busy => "Busy",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while handling one command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// The session is not in a state that accepts the command.
    #[error("`{command}` not allowed in state {state}")]
    NotReady {
        /// The rejected command.
        command: String,
        /// The state the session was in.
        state: SessionState,
    },

    /// The session has been closed.
    #[error("session is closed, `{command}` rejected")]
    SessionClosed {
        /// The rejected command.
        command: String,
    },

    /// The command name is not part of the protocol.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The arguments do not have the shape the command requires.
    #[error("invalid arguments for `{command}`: {reason}")]
    InvalidArgument {
        /// The rejected command.
        command: String,
        /// What was wrong.
        reason: String,
    },

    /// The engine result could not be encoded for the wire.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The simulation engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A previous command on this session has not completed.
    #[error("session busy, `{command}` rejected")]
    Busy {
        /// The rejected command.
        command: String,
    },
}

impl SessionError {
    /// The wire error kind for this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady { .. } => ErrorKind::NotReadyError,
            Self::SessionClosed { .. } => ErrorKind::SessionClosedError,
            Self::UnknownCommand(_) => ErrorKind::UnknownCommandError,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgumentError,
            Self::Serialization(_) => ErrorKind::SerializationError,
            Self::Engine(_) => ErrorKind::EngineError,
            Self::Busy { .. } => ErrorKind::Busy,
        }
    }
}
