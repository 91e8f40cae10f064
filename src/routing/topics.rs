//! Topic names of the dialogue protocol

use std::fmt;

use crate::codec::WireFormat;
use crate::value_objects::Component;

const ROOT: &str = "hermes";
const JSON_SUFFIX: &str = "_json";

/// A protocol topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    StartSession,
    ContinueSession,
    EndSession,
    SessionStarted,
    SessionQueued,
    SessionEnded,
    IntentNotRecognized,
    Configure,
    DialogueToggleOn,
    DialogueToggleOff,
    SessionTimeout,
    /// The user aborted the dialogue on a site
    AbortSession,
    /// Recognized intent, dispatched to skills
    Intent(String),
    NluIntentParsed,
    NluIntentNotRecognized,
    Say,
    SayFinished,
    RegisterSound,
    SoundToggleOn,
    SoundToggleOff,
    InjectionPerform,
    InjectionComplete,
    InjectionResetPerform,
    InjectionResetComplete,
    InjectionStatusRequest,
    InjectionStatus,
    /// Errors reported by a component
    Error(Component),
}

impl Topic {
    const FIXED: [Topic; 25] = [
        Topic::StartSession,
        Topic::ContinueSession,
        Topic::EndSession,
        Topic::SessionStarted,
        Topic::SessionQueued,
        Topic::SessionEnded,
        Topic::IntentNotRecognized,
        Topic::Configure,
        Topic::DialogueToggleOn,
        Topic::DialogueToggleOff,
        Topic::SessionTimeout,
        Topic::AbortSession,
        Topic::NluIntentParsed,
        Topic::NluIntentNotRecognized,
        Topic::Say,
        Topic::SayFinished,
        Topic::RegisterSound,
        Topic::SoundToggleOn,
        Topic::SoundToggleOff,
        Topic::InjectionPerform,
        Topic::InjectionComplete,
        Topic::InjectionResetPerform,
        Topic::InjectionResetComplete,
        Topic::InjectionStatusRequest,
        Topic::InjectionStatus,
    ];

    fn fixed_path(&self) -> Option<&'static str> {
        let path = match self {
            Topic::StartSession => "dialogueManager/startSession",
            Topic::ContinueSession => "dialogueManager/continueSession",
            Topic::EndSession => "dialogueManager/endSession",
            Topic::SessionStarted => "dialogueManager/sessionStarted",
            Topic::SessionQueued => "dialogueManager/sessionQueued",
            Topic::SessionEnded => "dialogueManager/sessionEnded",
            Topic::IntentNotRecognized => "dialogueManager/intentNotRecognized",
            Topic::Configure => "dialogueManager/configure",
            Topic::DialogueToggleOn => "dialogueManager/toggleOn",
            Topic::DialogueToggleOff => "dialogueManager/toggleOff",
            Topic::SessionTimeout => "dialogueManager/sessionTimeout",
            Topic::AbortSession => "dialogueManager/abortSession",
            Topic::NluIntentParsed => "nlu/intentParsed",
            Topic::NluIntentNotRecognized => "nlu/intentNotRecognized",
            Topic::Say => "tts/say",
            Topic::SayFinished => "tts/sayFinished",
            Topic::RegisterSound => "tts/registerSound",
            Topic::SoundToggleOn => "feedback/sound/toggleOn",
            Topic::SoundToggleOff => "feedback/sound/toggleOff",
            Topic::InjectionPerform => "injection/perform",
            Topic::InjectionComplete => "injection/complete",
            Topic::InjectionResetPerform => "injection/reset/perform",
            Topic::InjectionResetComplete => "injection/reset/complete",
            Topic::InjectionStatusRequest => "injection/statusRequest",
            Topic::InjectionStatus => "injection/status",
            Topic::Intent(_) | Topic::Error(_) => return None,
        };
        Some(path)
    }

    /// Topics an engine consumes; the session-managing ones only when it runs sessions
    fn inbound(manage_sessions: bool) -> Vec<Topic> {
        let mut topics = vec![
            Topic::SessionStarted,
            Topic::SessionQueued,
            Topic::SessionEnded,
            Topic::IntentNotRecognized,
            Topic::InjectionComplete,
            Topic::InjectionResetComplete,
            Topic::InjectionStatus,
        ];
        if manage_sessions {
            topics.extend([
                Topic::StartSession,
                Topic::ContinueSession,
                Topic::EndSession,
                Topic::Configure,
                Topic::DialogueToggleOn,
                Topic::DialogueToggleOff,
                Topic::SessionTimeout,
                Topic::AbortSession,
                Topic::NluIntentParsed,
                Topic::NluIntentNotRecognized,
            ]);
        }
        topics
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Intent(name) => write!(f, "{ROOT}/intent/{name}"),
            Topic::Error(component) => write!(f, "{ROOT}/error/{component}"),
            fixed => write!(f, "{ROOT}/{}", fixed.fixed_path().unwrap_or_default()),
        }
    }
}

/// Maps topics to paths of one topic family and back
///
/// The family follows the connection's wire format: JSON topics carry a
/// `_json` suffix, structured ones don't. A router never yields a path of the
/// other family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicRouter {
    format: WireFormat,
}

impl TopicRouter {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn path(&self, topic: &Topic) -> String {
        match self.format {
            WireFormat::Structured => topic.to_string(),
            WireFormat::Json => format!("{topic}{JSON_SUFFIX}"),
        }
    }

    /// Resolve a received path, `None` for foreign paths
    ///
    /// In the structured family a `_json` ending is only foreign on fixed and
    /// error topics: an intent may itself be named `something_json`.
    pub fn classify(&self, path: &str) -> Option<Topic> {
        let path = match self.format {
            WireFormat::Structured => path,
            WireFormat::Json => path.strip_suffix(JSON_SUFFIX)?,
        };
        let relative = path.strip_prefix(ROOT)?.strip_prefix('/')?;

        if let Some(name) = relative.strip_prefix("intent/") {
            return valid_level(name).then(|| Topic::Intent(name.to_string()));
        }
        if let Some(component) = relative.strip_prefix("error/") {
            return component.parse().ok().map(Topic::Error);
        }
        Topic::FIXED
            .into_iter()
            .find(|topic| topic.fixed_path() == Some(relative))
    }

    /// Topic filters an engine subscribes to
    pub fn subscriptions(&self, manage_sessions: bool) -> Vec<String> {
        let mut filters: Vec<String> = Topic::inbound(manage_sessions)
            .iter()
            .map(|topic| self.path(topic))
            .collect();
        // suffixed intent and error topics can only be matched with a multi-level wildcard
        filters.push(format!("{ROOT}/intent/#"));
        filters.push(format!("{ROOT}/error/#"));
        filters
    }
}

fn valid_level(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '+', '#'])
}
