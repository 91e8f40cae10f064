//! Message codec
//!
//! Every protocol message has two encodings: JSON with camelCase field names,
//! and a compact structured encoding built from protobuf records. A connection
//! picks one with [`WireFormat`] and sticks to it.

pub mod structured;

use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{DialogueError, DialogueResult};

/// Wire encoding used by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormat {
    #[default]
    Structured,
    Json,
}

impl WireFormat {
    /// Format selected by the `use_json_api` connection flag
    pub fn from_json_flag(use_json_api: bool) -> Self {
        if use_json_api {
            WireFormat::Json
        } else {
            WireFormat::Structured
        }
    }

    pub fn encode<M: WireMessage>(self, message: &M) -> DialogueResult<Vec<u8>> {
        let payload = match self {
            WireFormat::Json => serde_json::to_vec(message)?,
            WireFormat::Structured => message.to_structured().encode_to_vec(),
        };
        trace!(message = M::NAME, format = ?self, size = payload.len(), "encoded");
        Ok(payload)
    }

    pub fn decode<M: WireMessage>(self, payload: &[u8]) -> DialogueResult<M> {
        match self {
            WireFormat::Json => serde_json::from_slice(payload)
                .map_err(|err| DialogueError::from_json(err, payload)),
            WireFormat::Structured => {
                let record = M::Structured::decode(payload)?;
                M::from_structured(record)
            }
        }
    }
}

/// A protocol message with both wire encodings
pub trait WireMessage: Serialize + DeserializeOwned + Sized {
    /// Name used in logs
    const NAME: &'static str;

    /// Structured record mirroring the message
    type Structured: Message + Default;

    fn to_structured(&self) -> Self::Structured;

    fn from_structured(record: Self::Structured) -> DialogueResult<Self>;
}
