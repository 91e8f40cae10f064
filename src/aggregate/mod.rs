//! Session aggregate - one conversation between a site and the skills
//!
//! A session moves through `Idle -> (Queued) -> Active -> Ended`. `Ended` is
//! terminal. Transitions produce the protocol events announcing them; every
//! invalid transition is rejected without touching the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{DialogueError, DialogueResult};
use crate::events::{
    DialogueEvent, SessionEndedMessage, SessionInit, SessionQueuedMessage,
    SessionStartedMessage, StartSessionMessage,
};
use crate::value_objects::SessionTermination;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, not yet placed on its site
    Idle,
    /// Waiting for the active session of its site to end
    Queued,
    /// Exchanging turns with the user
    Active,
    /// Terminal
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Kind of session requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    /// Expects a response from the user
    Action,
    /// Says something and ends
    Notification,
}

/// How the next user turn is handled
///
/// Set at start and by each continue request, consumed by the next turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSettings {
    /// Intents accepted for the turn, `None` accepts every intent
    pub intent_filter: Option<Vec<String>>,
    /// Slot the turn fills
    pub slot_to_fill: Option<String>,
    /// Report unrecognized input instead of ending the session
    pub send_intent_not_recognized: bool,
}

impl TurnSettings {
    pub fn allows(&self, intent_name: &str) -> bool {
        self.intent_filter
            .as_ref()
            .is_none_or(|filter| filter.iter().any(|i| i == intent_name))
    }

    /// Whether an intent filter restricts the turn
    pub fn is_filtered(&self) -> bool {
        self.intent_filter.is_some()
    }
}

/// Session aggregate root
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    site_id: String,
    custom_data: Option<String>,
    kind: SessionKind,
    /// Said when the session becomes active
    start_text: Option<String>,
    state: SessionState,
    turn: TurnSettings,
    can_be_enqueued: bool,
    reactivated_from_session_id: Option<String>,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    termination: Option<SessionTermination>,
    /// Incremented on every change
    version: u64,
}

impl Session {
    /// Create an idle session for a start request
    pub fn new(request: &StartSessionMessage, default_site_id: &str) -> Self {
        let (kind, turn) = match &request.init {
            SessionInit::Action {
                intent_filter,
                send_intent_not_recognized,
                ..
            } => (
                SessionKind::Action,
                TurnSettings {
                    intent_filter: intent_filter.clone(),
                    slot_to_fill: None,
                    send_intent_not_recognized: *send_intent_not_recognized,
                },
            ),
            SessionInit::Notification { .. } => (SessionKind::Notification, TurnSettings::default()),
        };

        Self {
            id: Uuid::new_v4().to_string(),
            site_id: request
                .site_id
                .clone()
                .unwrap_or_else(|| default_site_id.to_string()),
            custom_data: request.custom_data.clone(),
            kind,
            start_text: request.init.text().map(str::to_string),
            state: SessionState::Idle,
            turn,
            can_be_enqueued: request.init.can_be_enqueued(),
            reactivated_from_session_id: None,
            created_at: Utc::now(),
            ended_at: None,
            termination: None,
            version: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn custom_data(&self) -> Option<&str> {
        self.custom_data.as_deref()
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn start_text(&self) -> Option<&str> {
        self.start_text.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn turn(&self) -> &TurnSettings {
        &self.turn
    }

    pub fn can_be_enqueued(&self) -> bool {
        self.can_be_enqueued
    }

    pub fn reactivated_from_session_id(&self) -> Option<&str> {
        self.reactivated_from_session_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn termination(&self) -> Option<&SessionTermination> {
        self.termination.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }

    fn transition_error(&self, to: SessionState) -> DialogueError {
        DialogueError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    /// Make the session the active one of its site
    pub fn activate(&mut self) -> DialogueResult<Vec<DialogueEvent>> {
        if !matches!(self.state, SessionState::Idle | SessionState::Queued) {
            return Err(self.transition_error(SessionState::Active));
        }

        self.state = SessionState::Active;
        self.version += 1;

        Ok(vec![DialogueEvent::SessionStarted(SessionStartedMessage {
            session_id: self.id.clone(),
            custom_data: self.custom_data.clone(),
            site_id: self.site_id.clone(),
            reactivated_from_session_id: self.reactivated_from_session_id.clone(),
        })])
    }

    /// Put the session in its site's queue
    pub fn enqueue(&mut self) -> DialogueResult<Vec<DialogueEvent>> {
        if self.state != SessionState::Idle {
            return Err(self.transition_error(SessionState::Queued));
        }
        if !self.can_be_enqueued {
            return Err(DialogueError::MalformedRequest(format!(
                "session {} can't be enqueued",
                self.id
            )));
        }

        self.state = SessionState::Queued;
        self.version += 1;

        Ok(vec![DialogueEvent::SessionQueued(SessionQueuedMessage {
            session_id: self.id.clone(),
            custom_data: self.custom_data.clone(),
            site_id: self.site_id.clone(),
        })])
    }

    /// Set how the next turn is handled, and optionally replace the custom data
    pub fn continue_with(
        &mut self,
        turn: TurnSettings,
        custom_data: Option<String>,
    ) -> DialogueResult<()> {
        if self.state != SessionState::Active {
            return Err(self.transition_error(SessionState::Active));
        }

        self.turn = turn;
        if custom_data.is_some() {
            self.custom_data = custom_data;
        }
        self.version += 1;
        Ok(())
    }

    /// Consume the settings of the current turn, reverting to defaults
    pub fn take_turn(&mut self) -> TurnSettings {
        self.version += 1;
        std::mem::take(&mut self.turn)
    }

    /// End the session from any non-terminal state
    pub fn end(&mut self, termination: SessionTermination) -> DialogueResult<Vec<DialogueEvent>> {
        if self.state == SessionState::Ended {
            return Err(self.transition_error(SessionState::Ended));
        }

        self.state = SessionState::Ended;
        self.ended_at = Some(Utc::now());
        self.termination = Some(termination.clone());
        self.version += 1;

        Ok(vec![DialogueEvent::SessionEnded(SessionEndedMessage {
            session_id: self.id.clone(),
            custom_data: self.custom_data.clone(),
            termination,
            site_id: self.site_id.clone(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> Session {
        Session::new(
            &StartSessionMessage::new(SessionInit::action()).on_site("kitchen"),
            "default",
        )
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = action();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.site_id(), "kitchen");
        assert_eq!(session.kind(), SessionKind::Action);
        assert!(session.reactivated_from_session_id().is_none());

        let session = Session::new(
            &StartSessionMessage::new(SessionInit::notification("hi")),
            "default",
        );
        assert_eq!(session.site_id(), "default");
        assert!(session.can_be_enqueued());
    }

    #[test]
    fn test_activate_emits_started() {
        let mut session = action();
        let events = session.activate().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "SessionStarted");
        assert!(session.is_active());

        assert!(matches!(
            session.activate(),
            Err(DialogueError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_queue_then_activate() {
        let mut session = action();
        session.enqueue().unwrap();
        assert_eq!(session.state(), SessionState::Queued);
        session.activate().unwrap();
        assert!(session.is_active());
    }

    #[test]
    fn test_continue_requires_active() {
        let mut session = action();
        assert!(session.continue_with(TurnSettings::default(), None).is_err());

        session.activate().unwrap();
        let turn = TurnSettings {
            intent_filter: Some(vec!["order".into()]),
            ..Default::default()
        };
        session
            .continue_with(turn.clone(), Some("ctx".into()))
            .unwrap();
        assert_eq!(session.turn(), &turn);
        assert_eq!(session.custom_data(), Some("ctx"));

        assert_eq!(session.take_turn(), turn);
        assert_eq!(session.turn(), &TurnSettings::default());
    }

    #[test]
    fn test_end_is_terminal() {
        let mut session = action();
        session.activate().unwrap();
        let events = session.end(SessionTermination::Nominal).unwrap();
        assert!(matches!(
            &events[0],
            DialogueEvent::SessionEnded(m) if m.termination == SessionTermination::Nominal
        ));
        assert!(session.is_ended());
        assert!(session.ended_at().is_some());
        assert!(session.end(SessionTermination::Nominal).is_err());
        assert!(session.activate().is_err());
    }

    #[test]
    fn test_turn_filter() {
        let open = TurnSettings::default();
        assert!(open.allows("anything"));
        assert!(!open.is_filtered());

        let filtered = TurnSettings {
            intent_filter: Some(vec!["order".into()]),
            ..Default::default()
        };
        assert!(filtered.allows("order"));
        assert!(!filtered.allows("cancel"));
    }
}
