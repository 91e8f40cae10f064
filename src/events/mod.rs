//! Dialogue protocol messages and the events the engine emits

mod configuration;
mod intent;
mod platform;
mod session;

pub use configuration::DialogueConfiguration;
pub use intent::{IntentMessage, IntentNotRecognizedMessage};
pub use platform::{
    ErrorMessage, RegisterSoundMessage, SayFinishedMessage, SayMessage, SessionTimeoutMessage,
    SiteMessage,
};
pub use session::{
    ContinueSessionMessage, DialogueConfigureIntent, DialogueConfigureMessage,
    EndSessionMessage, SessionEndedMessage, SessionInit, SessionQueuedMessage,
    SessionStartedMessage, StartSessionMessage,
};

use serde::{Deserialize, Serialize};

/// Outbound event produced by the session state machine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DialogueEvent {
    SessionStarted(SessionStartedMessage),
    SessionQueued(SessionQueuedMessage),
    SessionEnded(SessionEndedMessage),
    /// Intent accepted for the active session, dispatched on its intent topic
    IntentParsed(IntentMessage),
    IntentNotRecognized(IntentNotRecognizedMessage),
    /// Text to be spoken on the session's site
    Say(SayMessage),
    Error(ErrorMessage),
}

impl DialogueEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DialogueEvent::SessionStarted(_) => "SessionStarted",
            DialogueEvent::SessionQueued(_) => "SessionQueued",
            DialogueEvent::SessionEnded(_) => "SessionEnded",
            DialogueEvent::IntentParsed(_) => "IntentParsed",
            DialogueEvent::IntentNotRecognized(_) => "IntentNotRecognized",
            DialogueEvent::Say(_) => "Say",
            DialogueEvent::Error(_) => "Error",
        }
    }

    /// Session the event is about
    pub fn session_id(&self) -> Option<&str> {
        match self {
            DialogueEvent::SessionStarted(m) => Some(&m.session_id),
            DialogueEvent::SessionQueued(m) => Some(&m.session_id),
            DialogueEvent::SessionEnded(m) => Some(&m.session_id),
            DialogueEvent::IntentParsed(m) => Some(&m.session_id),
            DialogueEvent::IntentNotRecognized(m) => Some(&m.session_id),
            DialogueEvent::Say(m) => m.session_id.as_deref(),
            DialogueEvent::Error(m) => m.session_id.as_deref(),
        }
    }
}
