//! ASR decoding output carried alongside intents

use serde::{Deserialize, Serialize};

/// Time span of a decoded token, in seconds from the start of the utterance
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AsrDecodingDuration {
    pub start: f32,
    pub end: f32,
}

/// A single token produced by one ASR decoding pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AsrToken {
    /// Decoded text
    pub value: String,
    /// Confidence of the token
    pub confidence: f32,
    /// Character range of the token in the decoded text
    pub range_start: i32,
    pub range_end: i32,
    /// When the token was spoken
    pub time: AsrDecodingDuration,
}

/// Independent decoding passes, each a sequence of timed tokens
pub type AsrTokenMatrix = Vec<Vec<AsrToken>>;

impl AsrToken {
    pub fn new(value: impl Into<String>, confidence: f32, range_start: i32, range_end: i32) -> Self {
        Self {
            value: value.into(),
            confidence,
            range_start,
            range_end,
            time: AsrDecodingDuration::default(),
        }
    }

    /// Set the time span of the token
    pub fn spoken_between(mut self, start: f32, end: f32) -> Self {
        self.time = AsrDecodingDuration { start, end };
        self
    }
}
