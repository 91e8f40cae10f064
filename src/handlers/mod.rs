//! Session command handling and user callbacks

pub mod command_handler;
pub mod registry;

pub use command_handler::{IntentConfiguration, SessionCommandHandler};
pub use registry::{Callback, CallbackRegistry, HandlerId, dispatch};
