//! Error types for the dialogue engine

use std::sync::PoisonError;
use thiserror::Error;

use crate::value_objects::find_unknown_kind;

/// Result alias used throughout the crate
pub type DialogueResult<T> = Result<T, DialogueError>;

/// Errors raised by the dialogue engine
#[derive(Debug, Error)]
pub enum DialogueError {
    /// A slot value carried a type tag this engine does not know
    #[error("unknown slot value type: {0}")]
    UnknownSlotValueType(String),

    /// A required field was absent from a decoded payload
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A JSON payload could not be decoded or encoded
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A structured payload could not be decoded
    #[error("structured codec error: {0}")]
    Structured(#[from] prost::DecodeError),

    /// The transport refused a message
    #[error("failed to publish on `{topic}`: {cause}")]
    Publish { topic: String, cause: String },

    /// The broker could not be reached or refused the connection
    #[error("connection failed: {0}")]
    Connection(String),

    /// A request referenced a session the engine does not know (or that already ended)
    #[error("unknown session `{0}`")]
    UnknownSession(String),

    /// A required request field was empty
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    /// A request was structurally invalid
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A session was asked to move to a state it cannot reach
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// The event loop is already running for this connection
    #[error("event loop already running")]
    LoopAlreadyRunning,

    /// The event loop is not running for this connection
    #[error("event loop not running")]
    LoopNotRunning,

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// The event loop thread or its runtime could not be created
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock was poisoned by a panicking thread
    #[error("can't lock engine state")]
    PoisonedLock,
}

impl<T> From<PoisonError<T>> for DialogueError {
    fn from(_: PoisonError<T>) -> Self {
        DialogueError::PoisonedLock
    }
}

impl From<figment::Error> for DialogueError {
    fn from(err: figment::Error) -> Self {
        DialogueError::Config(err.to_string())
    }
}

impl DialogueError {
    /// Build a publish error for `topic`
    pub fn publish(topic: impl Into<String>, cause: impl Into<String>) -> Self {
        DialogueError::Publish {
            topic: topic.into(),
            cause: cause.into(),
        }
    }

    /// Whether this error came from decoding an inbound payload
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            DialogueError::UnknownSlotValueType(_)
                | DialogueError::MissingField(_)
                | DialogueError::Json(_)
                | DialogueError::Structured(_)
        )
    }

    /// Map a serde_json error on `payload`, surfacing unknown slot value kinds
    /// as their own variant
    pub(crate) fn from_json(err: serde_json::Error, payload: &[u8]) -> Self {
        serde_json::from_slice::<serde_json::Value>(payload)
            .ok()
            .and_then(|document| find_unknown_kind(&document))
            .map_or(DialogueError::Json(err), DialogueError::UnknownSlotValueType)
    }
}
