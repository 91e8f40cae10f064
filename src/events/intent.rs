//! Intent messages produced by the NLU and dispatched to skills

use serde::{Deserialize, Serialize};

use crate::value_objects::{
    AsrTokenMatrix, IntentAlternative, IntentClassifierResult, SlotMap,
};

/// A recognized intent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntentMessage {
    /// Session the intent belongs to
    pub session_id: String,
    /// Custom data of the session
    pub custom_data: Option<String>,
    /// Site the user spoke on
    pub site_id: String,
    /// Text the intent was parsed from
    pub input: String,
    /// Classifier result
    pub intent: IntentClassifierResult,
    /// Detected slots keyed by name
    #[serde(default)]
    pub slots: SlotMap,
    /// Other interpretations of the input
    pub alternatives: Option<Vec<IntentAlternative>>,
    /// ASR decoding passes the input came from
    pub asr_tokens: Option<AsrTokenMatrix>,
    /// Overall ASR confidence
    pub asr_confidence: Option<f32>,
}

impl IntentMessage {
    pub fn new(
        session_id: impl Into<String>,
        site_id: impl Into<String>,
        input: impl Into<String>,
        intent: IntentClassifierResult,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            custom_data: None,
            site_id: site_id.into(),
            input: input.into(),
            intent,
            slots: SlotMap::new(),
            alternatives: None,
            asr_tokens: None,
            asr_confidence: None,
        }
    }

    pub fn with_slots(mut self, slots: SlotMap) -> Self {
        self.slots = slots;
        self
    }

    pub fn intent_name(&self) -> &str {
        &self.intent.intent_name
    }
}

/// The input of a session turn could not be matched to an allowed intent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntentNotRecognizedMessage {
    pub session_id: String,
    pub custom_data: Option<String>,
    pub site_id: String,
    /// What the user said, when the ASR understood anything
    pub input: Option<String>,
    /// Confidence of the "no intent" classification
    pub confidence_score: f32,
}

impl IntentNotRecognizedMessage {
    /// Build the not-recognized counterpart of an intent
    pub fn from_intent(intent: &IntentMessage) -> Self {
        Self {
            session_id: intent.session_id.clone(),
            custom_data: intent.custom_data.clone(),
            site_id: intent.site_id.clone(),
            input: Some(intent.input.clone()),
            confidence_score: intent.intent.confidence_score,
        }
    }
}
