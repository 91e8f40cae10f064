//! Outbound side of a connection

use std::sync::Arc;
use tracing::debug;

use super::EngineState;
use crate::codec::{WireFormat, WireMessage};
use crate::error::{DialogueError, DialogueResult};
use crate::events::{
    ContinueSessionMessage, DialogueConfiguration, DialogueConfigureMessage, DialogueEvent,
    EndSessionMessage, ErrorMessage, IntentMessage, IntentNotRecognizedMessage,
    RegisterSoundMessage, SessionTimeoutMessage, SiteMessage, StartSessionMessage,
};
use crate::injection::{
    InjectionCompleteMessage, InjectionRequestMessage, InjectionResetCompleteMessage,
    InjectionResetRequestMessage, InjectionStatusMessage,
};
use crate::routing::{Topic, TopicRouter, Transport};
use crate::value_objects::Component;

/// Publishes protocol messages on the connection of an engine
///
/// Cheap to clone, and handed to every handler. Publishing is a single-writer
/// operation: calls from several threads at once must be serialized by the
/// caller.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    router: TopicRouter,
    state: Arc<EngineState>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        router: TopicRouter,
        state: Arc<EngineState>,
    ) -> Self {
        Self {
            transport,
            router,
            state,
        }
    }

    pub(crate) fn state(&self) -> &EngineState {
        &self.state
    }

    pub(crate) fn router(&self) -> TopicRouter {
        self.router
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn format(&self) -> WireFormat {
        self.router.format()
    }

    fn send<M: WireMessage>(&self, topic: &Topic, message: &M) -> DialogueResult<()> {
        let payload = self.format().encode(message)?;
        self.send_raw(topic, payload)
    }

    fn send_raw(&self, topic: &Topic, payload: Vec<u8>) -> DialogueResult<()> {
        let path = self.router.path(topic);
        debug!(topic = %path, size = payload.len(), "publishing");
        self.transport.publish(&path, payload)
    }

    /// Reject requests naming a session this engine doesn't run
    fn check_session(&self, session_id: &str) -> DialogueResult<()> {
        if session_id.is_empty() {
            return Err(DialogueError::EmptyField("session_id"));
        }
        if self.state.manage_sessions && !self.state.sessions.lock()?.is_live(session_id) {
            return Err(DialogueError::UnknownSession(session_id.to_string()));
        }
        Ok(())
    }

    /// Ask the dialogue manager to start a session
    pub fn publish_start_session(&self, message: &StartSessionMessage) -> DialogueResult<()> {
        if message.site_id.as_deref() == Some("") {
            return Err(DialogueError::EmptyField("site_id"));
        }
        self.send(&Topic::StartSession, message)
    }

    /// Set how the next turn of a session is handled
    pub fn publish_continue_session(
        &self,
        message: &ContinueSessionMessage,
    ) -> DialogueResult<()> {
        self.check_session(&message.session_id)?;
        if message.slot.is_some()
            && message.intent_filter.as_ref().is_none_or(|f| f.len() != 1)
        {
            return Err(DialogueError::MalformedRequest(
                "slot filling requires an intent filter with exactly one intent".to_string(),
            ));
        }
        self.send(&Topic::ContinueSession, message)
    }

    pub fn publish_end_session(&self, message: &EndSessionMessage) -> DialogueResult<()> {
        self.check_session(&message.session_id)?;
        self.send(&Topic::EndSession, message)
    }

    /// Publish every message of a configuration, in order
    pub fn publish_configure(&self, configuration: &DialogueConfiguration) -> DialogueResult<()> {
        for message in configuration.build() {
            self.publish_configure_message(&message)?;
        }
        Ok(())
    }

    pub fn publish_configure_message(
        &self,
        message: &DialogueConfigureMessage,
    ) -> DialogueResult<()> {
        self.send(&Topic::Configure, message)
    }

    pub fn publish_sound_feedback_on(&self, message: &SiteMessage) -> DialogueResult<()> {
        self.send(&Topic::SoundToggleOn, message)
    }

    pub fn publish_sound_feedback_off(&self, message: &SiteMessage) -> DialogueResult<()> {
        self.send(&Topic::SoundToggleOff, message)
    }

    pub fn publish_register_sound(&self, message: &RegisterSoundMessage) -> DialogueResult<()> {
        if message.sound_id.is_empty() {
            return Err(DialogueError::EmptyField("sound_id"));
        }
        self.send(&Topic::RegisterSound, message)
    }

    /// Publish an injection request; its `id` comes back on the completion
    pub fn publish_injection_request(
        &self,
        message: &InjectionRequestMessage,
    ) -> DialogueResult<()> {
        self.send(&Topic::InjectionPerform, message)
    }

    pub fn publish_injection_reset(
        &self,
        message: &InjectionResetRequestMessage,
    ) -> DialogueResult<()> {
        self.send(&Topic::InjectionResetPerform, message)
    }

    /// Ask the injection component for its status
    pub fn publish_injection_status_request(&self) -> DialogueResult<()> {
        self.send_raw(&Topic::InjectionStatusRequest, Vec::new())
    }

    /// Intent parsed by the NLU, for the dialogue manager
    pub fn publish_nlu_intent(&self, message: &IntentMessage) -> DialogueResult<()> {
        self.send(&Topic::NluIntentParsed, message)
    }

    pub fn publish_nlu_intent_not_recognized(
        &self,
        message: &IntentNotRecognizedMessage,
    ) -> DialogueResult<()> {
        self.send(&Topic::NluIntentNotRecognized, message)
    }

    /// Make a site available for dialogue again
    pub fn publish_dialogue_toggle_on(&self, message: &SiteMessage) -> DialogueResult<()> {
        self.send(&Topic::DialogueToggleOn, message)
    }

    /// Make a site unavailable, ending its sessions
    pub fn publish_dialogue_toggle_off(&self, message: &SiteMessage) -> DialogueResult<()> {
        self.send(&Topic::DialogueToggleOff, message)
    }

    pub fn publish_session_timeout(&self, message: &SessionTimeoutMessage) -> DialogueResult<()> {
        self.send(&Topic::SessionTimeout, message)
    }

    /// End a session on behalf of the user: the one named, else the site's active one
    pub fn publish_abort_session(&self, message: &SiteMessage) -> DialogueResult<()> {
        if message.site_id.is_empty() {
            return Err(DialogueError::EmptyField("site_id"));
        }
        self.send(&Topic::AbortSession, message)
    }

    pub fn publish_injection_complete(
        &self,
        message: &InjectionCompleteMessage,
    ) -> DialogueResult<()> {
        self.send(&Topic::InjectionComplete, message)
    }

    pub fn publish_injection_reset_complete(
        &self,
        message: &InjectionResetCompleteMessage,
    ) -> DialogueResult<()> {
        self.send(&Topic::InjectionResetComplete, message)
    }

    pub fn publish_injection_status(&self, message: &InjectionStatusMessage) -> DialogueResult<()> {
        self.send(&Topic::InjectionStatus, message)
    }

    /// Report an error on behalf of `component`
    pub fn publish_error(&self, component: Component, message: &ErrorMessage) -> DialogueResult<()> {
        self.send(&Topic::Error(component), message)
    }

    /// Publish an event of the session state machine on its topic
    pub(crate) fn publish_event(&self, event: &DialogueEvent) -> DialogueResult<()> {
        match event {
            DialogueEvent::SessionStarted(m) => self.send(&Topic::SessionStarted, m),
            DialogueEvent::SessionQueued(m) => self.send(&Topic::SessionQueued, m),
            DialogueEvent::SessionEnded(m) => self.send(&Topic::SessionEnded, m),
            DialogueEvent::IntentParsed(m) => {
                self.send(&Topic::Intent(m.intent_name().to_string()), m)
            }
            DialogueEvent::IntentNotRecognized(m) => self.send(&Topic::IntentNotRecognized, m),
            DialogueEvent::Say(m) => self.send(&Topic::Say, m),
            DialogueEvent::Error(m) => self.send(&Topic::Error(Component::DialogueManager), m),
        }
    }
}

#[cfg(test)]
impl Publisher {
    /// A publisher whose messages go nowhere
    pub(crate) fn detached() -> Self {
        struct Discard;

        impl Transport for Discard {
            fn publish(&self, _: &str, _: Vec<u8>) -> DialogueResult<()> {
                Ok(())
            }

            fn subscribe(&self, _: &str) -> DialogueResult<()> {
                Ok(())
            }

            fn disconnect(&self) {}
        }

        Self::new(
            Arc::new(Discard),
            TopicRouter::new(WireFormat::Structured),
            Arc::new(EngineState::new("default", 8, true, true)),
        )
    }
}
