//! Messages exchanged with the rest of the voice platform

use serde::{Deserialize, Serialize};

use crate::value_objects::Component;

/// Targets a site, used to toggle dialogue and sound feedback
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteMessage {
    pub site_id: String,
    pub session_id: Option<String>,
}

impl SiteMessage {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            session_id: None,
        }
    }
}

/// A component stopped answering for a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeoutMessage {
    pub session_id: String,
    /// The component that timed out
    pub component: Component,
}

/// A request could not be honoured
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    /// Session concerned, if any
    pub session_id: Option<String>,
    /// Human readable cause
    pub error: String,
    /// What was being processed when the error occurred
    pub context: Option<String>,
}

/// Ask the TTS to speak
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SayMessage {
    pub text: String,
    pub lang: Option<String>,
    /// Correlates the matching `SayFinishedMessage`
    pub id: Option<String>,
    pub site_id: String,
    pub session_id: Option<String>,
}

/// The TTS finished speaking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SayFinishedMessage {
    pub id: Option<String>,
    pub session_id: Option<String>,
}

/// Register a sound the TTS can play with `[[sound:<sound_id>]]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSoundMessage {
    pub sound_id: String,
    /// Raw wav bytes, base64 in JSON
    #[serde(with = "base64_bytes")]
    pub wav_sound: Vec<u8>,
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_sound_is_base64() {
        let msg = RegisterSoundMessage {
            sound_id: "ding".to_string(),
            wav_sound: b"RIFF".to_vec(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["wavSound"], "UklGRg==");
        assert_eq!(json["soundId"], "ding");

        let back: RegisterSoundMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let err = serde_json::from_str::<RegisterSoundMessage>(
            r#"{"soundId":"ding","wavSound":"not base64!"}"#,
        );
        assert!(err.is_err());
    }
}
