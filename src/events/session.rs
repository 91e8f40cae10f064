//! Session lifecycle messages

use serde::{Deserialize, Serialize};

use crate::value_objects::SessionTermination;

fn enqueue_by_default() -> bool {
    true
}

/// How a session should be initialised
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionInit {
    /// The session expects a response from the user
    #[serde(rename_all = "camelCase")]
    Action {
        /// Text said to the user when the session starts
        text: Option<String>,
        /// Intents allowed for the first turn, `None` allows every intent
        intent_filter: Option<Vec<String>>,
        /// Whether the session may wait for a busy site
        #[serde(default = "enqueue_by_default")]
        can_be_enqueued: bool,
        /// Report unrecognized input instead of ending the session
        #[serde(default)]
        send_intent_not_recognized: bool,
    },
    /// Fire-and-forget session that only says `text`
    Notification { text: String },
}

impl SessionInit {
    /// An action session with default settings
    pub fn action() -> Self {
        SessionInit::Action {
            text: None,
            intent_filter: None,
            can_be_enqueued: true,
            send_intent_not_recognized: false,
        }
    }

    pub fn notification(text: impl Into<String>) -> Self {
        SessionInit::Notification { text: text.into() }
    }

    /// Notifications are always allowed to wait for their site
    pub fn can_be_enqueued(&self) -> bool {
        match self {
            SessionInit::Action { can_be_enqueued, .. } => *can_be_enqueued,
            SessionInit::Notification { .. } => true,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            SessionInit::Action { text, .. } => text.as_deref(),
            SessionInit::Notification { text } => Some(text),
        }
    }
}

/// Request to start a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionMessage {
    /// Session kind and first-turn settings
    pub init: SessionInit,
    /// Opaque payload echoed on every event of the session
    pub custom_data: Option<String>,
    /// Site to start on, the engine default when absent
    pub site_id: Option<String>,
}

impl StartSessionMessage {
    pub fn new(init: SessionInit) -> Self {
        Self {
            init,
            custom_data: None,
            site_id: None,
        }
    }

    pub fn on_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    pub fn with_custom_data(mut self, custom_data: impl Into<String>) -> Self {
        self.custom_data = Some(custom_data.into());
        self
    }
}

/// Request to continue an active session for one more turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContinueSessionMessage {
    /// Session to continue
    pub session_id: String,
    /// Text said to the user
    pub text: String,
    /// Intents allowed for the next turn only
    pub intent_filter: Option<Vec<String>>,
    /// Replaces the custom data of the session when present
    pub custom_data: Option<String>,
    /// Report unrecognized input instead of ending the session
    #[serde(default)]
    pub send_intent_not_recognized: bool,
    /// Slot to fill on the next turn, requires a single-intent filter
    pub slot: Option<String>,
}

impl ContinueSessionMessage {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            intent_filter: None,
            custom_data: None,
            send_intent_not_recognized: false,
            slot: None,
        }
    }

    pub fn with_intent_filter<I, S>(mut self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intent_filter = Some(intents.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    pub fn sending_intent_not_recognized(mut self) -> Self {
        self.send_intent_not_recognized = true;
        self
    }
}

/// Request to end a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionMessage {
    pub session_id: String,
    /// Text said to the user before ending
    pub text: Option<String>,
}

/// A session became active
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedMessage {
    pub session_id: String,
    pub custom_data: Option<String>,
    pub site_id: String,
    /// Session this one resumes; session reactivation is not supported so this is never set
    pub reactivated_from_session_id: Option<String>,
}

/// A session is waiting for its site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionQueuedMessage {
    pub session_id: String,
    pub custom_data: Option<String>,
    pub site_id: String,
}

/// A session ended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedMessage {
    pub session_id: String,
    pub custom_data: Option<String>,
    /// How the session ended
    pub termination: SessionTermination,
    pub site_id: String,
}

/// Enable or disable intents on a site, or on every site when `site_id` is absent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DialogueConfigureMessage {
    pub site_id: Option<String>,
    pub intents: Option<Vec<DialogueConfigureIntent>>,
}

/// Setting for one intent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DialogueConfigureIntent {
    pub intent_id: String,
    /// `None` leaves the current setting untouched
    pub enable: Option<bool>,
}
