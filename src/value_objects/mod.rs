//! Value objects for the dialogue domain
//!
//! Slots and their typed values, intent classification results, ASR tokens,
//! platform components and the reasons a session can end.

mod asr;
mod slot;

pub use asr::{AsrDecodingDuration, AsrToken, AsrTokenMatrix};
pub(crate) use slot::find_unknown_kind;
pub use slot::{
    AmountOfMoneyValue, DurationValue, Grain, InstantTimeValue, Precision, Slot, SlotMap,
    SlotValue, SlotValueType, SlotsList, TemperatureValue, TimeIntervalValue,
    UNKNOWN_CONFIDENCE,
};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Result of the intent classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntentClassifierResult {
    /// Name of the recognized intent
    pub intent_name: String,
    /// Classifier confidence
    pub confidence_score: f32,
}

impl IntentClassifierResult {
    pub fn new(intent_name: impl Into<String>, confidence_score: f32) -> Self {
        Self {
            intent_name: intent_name.into(),
            confidence_score,
        }
    }
}

/// Another interpretation of the same input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntentAlternative {
    /// Alternative intent, `None` for "no intent"
    pub intent_name: Option<String>,
    /// Confidence of this interpretation
    pub confidence_score: f32,
    /// Slots detected under this interpretation
    #[serde(default)]
    pub slots: SlotMap,
}

/// A component of the voice platform
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, AsRefStr, EnumString,
    EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Component {
    AudioServer,
    Hotword,
    Asr,
    Nlu,
    DialogueManager,
    Tts,
    Injection,
    ClientApp,
}

/// Why a session ended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "terminationType", rename_all = "camelCase")]
pub enum SessionTermination {
    /// The session ended as expected
    Nominal,
    /// Dialogue was deactivated on the site of the session
    SiteUnavailable,
    /// The user aborted the session
    AbortedByUser,
    /// The platform could not understand what the user said
    IntentNotRecognized,
    /// A component did not answer in time
    Timeout {
        #[serde(default)]
        component: Option<Component>,
    },
    /// A generic error occurred
    Error { error: String },
}

impl SessionTermination {
    /// Variant-specific free text
    pub fn data(&self) -> Option<String> {
        match self {
            SessionTermination::Timeout { component } => component.map(|c| c.to_string()),
            SessionTermination::Error { error } => Some(error.clone()),
            _ => None,
        }
    }

    /// Stable name of the variant, as found on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            SessionTermination::Nominal => "nominal",
            SessionTermination::SiteUnavailable => "siteUnavailable",
            SessionTermination::AbortedByUser => "abortedByUser",
            SessionTermination::IntentNotRecognized => "intentNotRecognized",
            SessionTermination::Timeout { .. } => "timeout",
            SessionTermination::Error { .. } => "error",
        }
    }
}
