//! Dialogue session engine
//!
//! Speaks the dialogue protocol of a voice assistant platform over a
//! publish/subscribe bus. It provides:
//! - Typed protocol messages with a JSON and a structured wire encoding
//! - The topic layout of the protocol, in both topic families
//! - A per-site session state machine with FIFO queuing
//! - Typed slot values for the entities recognized in an utterance
//! - Handler registration and dispatch for intents and session events
//! - Vocabulary injection requests and their completions
//!
//! An application opens a [`DialogueEngine`] on a [`routing::Connector`],
//! registers handlers, and drives the connection with
//! [`DialogueEngine::process_pending`] or in loop mode.

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod injection;
pub mod logging;
pub mod queries;
pub mod routing;
pub mod value_objects;

// Re-export main types
pub use aggregate::{Session, SessionKind, SessionState, TurnSettings};

pub use codec::{WireFormat, WireMessage};
pub use config::{EngineConfig, MqttOptions};
pub use engine::{DialogueEngine, LoopStopper, Publisher};
pub use error::{DialogueError, DialogueResult};

pub use events::{
    ContinueSessionMessage, DialogueConfiguration, DialogueConfigureIntent,
    DialogueConfigureMessage, DialogueEvent, EndSessionMessage, ErrorMessage, IntentMessage,
    IntentNotRecognizedMessage, RegisterSoundMessage, SayFinishedMessage, SayMessage,
    SessionEndedMessage, SessionInit, SessionQueuedMessage, SessionStartedMessage,
    SessionTimeoutMessage, SiteMessage, StartSessionMessage,
};

pub use handlers::{CallbackRegistry, HandlerId, SessionCommandHandler};

pub use injection::{
    EntityValue, InjectionCompleteMessage, InjectionKind, InjectionOperation,
    InjectionRequestBuilder, InjectionRequestMessage, InjectionResetCompleteMessage,
    InjectionResetRequestMessage, InjectionStatusMessage,
};

pub use queries::{SessionQuery, SessionQueryHandler, SessionQueryResult, SessionSnapshot};
pub use routing::{InProcessBroker, MqttConnector, Topic, TopicRouter};

pub use value_objects::{
    AmountOfMoneyValue, AsrDecodingDuration, AsrToken, AsrTokenMatrix, Component, DurationValue,
    Grain, InstantTimeValue, IntentAlternative, IntentClassifierResult, Precision,
    SessionTermination, Slot, SlotMap, SlotValue, SlotValueType, SlotsList, TemperatureValue,
    TimeIntervalValue,
};
