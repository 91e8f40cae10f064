//! Session command handler - the dialogue manager's state machine
//!
//! Owns every session, the per-site FIFO queues, site availability and the
//! intent configuration. Each `handle_*` method applies one inbound protocol
//! message and returns the events to publish, in order.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregate::{Session, SessionKind, SessionState, TurnSettings};
use crate::error::{DialogueError, DialogueResult};
use crate::events::{
    ContinueSessionMessage, DialogueConfigureMessage, DialogueEvent, EndSessionMessage,
    ErrorMessage, IntentMessage, IntentNotRecognizedMessage, SayMessage, SessionTimeoutMessage,
    SiteMessage, StartSessionMessage,
};
use crate::value_objects::{Component, SessionTermination};

/// Intents enabled or disabled through configure messages
#[derive(Debug, Clone, Default)]
pub struct IntentConfiguration {
    all_sites: HashMap<String, bool>,
    per_site: HashMap<String, HashMap<String, bool>>,
}

impl IntentConfiguration {
    /// Apply a configure message; intents without a setting are left untouched
    pub fn apply(&mut self, message: &DialogueConfigureMessage) {
        let target = match &message.site_id {
            Some(site_id) => self.per_site.entry(site_id.clone()).or_default(),
            None => &mut self.all_sites,
        };
        for intent in message.intents.iter().flatten() {
            if let Some(enable) = intent.enable {
                target.insert(intent.intent_id.clone(), enable);
            }
        }
    }

    /// Site settings win over all-sites settings; unknown intents are enabled
    pub fn is_enabled(&self, site_id: &str, intent_name: &str) -> bool {
        self.per_site
            .get(site_id)
            .and_then(|intents| intents.get(intent_name))
            .or_else(|| self.all_sites.get(intent_name))
            .copied()
            .unwrap_or(true)
    }
}

/// Handler for session commands
#[derive(Debug)]
pub struct SessionCommandHandler {
    default_site_id: String,
    /// Sessions that are not ended, by id
    sessions: HashMap<String, Session>,
    active_by_site: HashMap<String, String>,
    queues: HashMap<String, VecDeque<String>>,
    /// Most recently ended sessions, oldest first
    ended: VecDeque<Session>,
    ended_capacity: usize,
    unavailable_sites: HashSet<String>,
    intents: IntentConfiguration,
}

impl SessionCommandHandler {
    /// Create a handler starting sessions on `default_site_id` when none is given
    pub fn new(default_site_id: impl Into<String>, ended_capacity: usize) -> Self {
        Self {
            default_site_id: default_site_id.into(),
            sessions: HashMap::new(),
            active_by_site: HashMap::new(),
            queues: HashMap::new(),
            ended: VecDeque::new(),
            ended_capacity,
            unavailable_sites: HashSet::new(),
            intents: IntentConfiguration::default(),
        }
    }

    /// Handle a start request
    ///
    /// Starting a session that can't be enqueued on a busy site is dropped
    /// silently: no session is created and no event is emitted.
    pub fn handle_start_session(
        &mut self,
        request: StartSessionMessage,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        if request.site_id.as_deref() == Some("") {
            return Err(DialogueError::EmptyField("site_id"));
        }

        let mut session = Session::new(&request, &self.default_site_id);
        let site_id = session.site_id().to_string();

        if self.unavailable_sites.contains(&site_id) {
            debug!(session_id = session.id(), %site_id, "site unavailable, ending session");
            let events = session.end(SessionTermination::SiteUnavailable)?;
            self.archive(session);
            return Ok(events);
        }

        if self.active_by_site.contains_key(&site_id) {
            if !session.can_be_enqueued() {
                debug!(%site_id, "site busy and session can't be enqueued, dropping start request");
                return Ok(Vec::new());
            }
            let events = session.enqueue()?;
            self.queues
                .entry(site_id)
                .or_default()
                .push_back(session.id().to_string());
            self.sessions.insert(session.id().to_string(), session);
            return Ok(events);
        }

        self.activate_on_site(session)
    }

    /// Handle a continue request for an active session
    pub fn handle_continue_session(
        &mut self,
        request: ContinueSessionMessage,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        validate_continue(&request)?;

        let session = self.live_session_mut(&request.session_id)?;
        let turn = TurnSettings {
            intent_filter: request.intent_filter,
            slot_to_fill: request.slot,
            send_intent_not_recognized: request.send_intent_not_recognized,
        };
        session.continue_with(turn, request.custom_data)?;

        let mut events = Vec::new();
        if !request.text.is_empty() {
            events.push(say(session, request.text));
        }
        Ok(events)
    }

    /// Handle an end request
    pub fn handle_end_session(
        &mut self,
        request: EndSessionMessage,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        if request.session_id.is_empty() {
            return Err(DialogueError::EmptyField("session_id"));
        }

        let session = self.live_session_mut(&request.session_id)?;
        let mut events = Vec::new();
        if let Some(text) = request.text.filter(|text| !text.is_empty()) {
            events.push(say(session, text));
        }
        events.extend(self.end_session(&request.session_id, SessionTermination::Nominal)?);
        Ok(events)
    }

    /// Handle an intent parsed for an active session
    ///
    /// `has_handler` tells whether a skill would receive the (resolved)
    /// intent. Rejected intents are reported as not recognized when the turn
    /// asks for it; otherwise they end the session.
    pub fn handle_intent(
        &mut self,
        mut intent: IntentMessage,
        has_handler: &dyn Fn(&str) -> bool,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        let session = self.active_session_mut(&intent.session_id)?;
        let turn = session.take_turn();
        intent.custom_data = session.custom_data().map(str::to_string);
        intent.site_id = session.site_id().to_string();

        if let Some(slot_name) = &turn.slot_to_fill {
            if let Some([filled_intent]) = turn.intent_filter.as_deref() {
                intent.intent.intent_name = filled_intent.clone();
            }
            intent.slots.retain_only(slot_name);
        }

        let intent_name = intent.intent_name();
        let accepted = turn.allows(intent_name)
            && self.intents.is_enabled(&intent.site_id, intent_name)
            && has_handler(intent_name);

        if accepted {
            return Ok(vec![DialogueEvent::IntentParsed(intent)]);
        }

        debug!(
            session_id = %intent.session_id,
            intent = intent_name,
            "intent rejected for this turn"
        );
        if turn.send_intent_not_recognized {
            return Ok(vec![DialogueEvent::IntentNotRecognized(
                IntentNotRecognizedMessage::from_intent(&intent),
            )]);
        }
        self.end_session(&intent.session_id, SessionTermination::IntentNotRecognized)
    }

    /// Handle input the NLU could not match to any intent
    pub fn handle_intent_not_recognized(
        &mut self,
        mut message: IntentNotRecognizedMessage,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        let session = self.active_session_mut(&message.session_id)?;
        let turn = session.take_turn();
        message.custom_data = session.custom_data().map(str::to_string);
        message.site_id = session.site_id().to_string();

        if turn.send_intent_not_recognized {
            return Ok(vec![DialogueEvent::IntentNotRecognized(message)]);
        }
        self.end_session(&message.session_id, SessionTermination::IntentNotRecognized)
    }

    /// Dialogue was turned off on a site
    ///
    /// Ends the active session, then every queued one in FIFO order. The site
    /// rejects new sessions until [`Self::handle_site_available`].
    pub fn handle_site_unavailable(&mut self, site_id: &str) -> DialogueResult<Vec<DialogueEvent>> {
        info!(site_id, "site unavailable");
        self.unavailable_sites.insert(site_id.to_string());

        let mut events = Vec::new();
        if let Some(active) = self.active_by_site.get(site_id).cloned() {
            events.extend(self.end_session(&active, SessionTermination::SiteUnavailable)?);
        }
        let queued: Vec<String> = self
            .queues
            .get(site_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default();
        for session_id in queued {
            events.extend(self.end_session(&session_id, SessionTermination::SiteUnavailable)?);
        }
        Ok(events)
    }

    /// Dialogue was turned back on on a site
    pub fn handle_site_available(&mut self, site_id: &str) -> DialogueResult<Vec<DialogueEvent>> {
        if self.unavailable_sites.remove(site_id) {
            info!(site_id, "site available");
        }
        Ok(Vec::new())
    }

    /// A component timed out for a session
    pub fn handle_timeout(
        &mut self,
        message: SessionTimeoutMessage,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        self.live_session_mut(&message.session_id)?;
        self.end_session(
            &message.session_id,
            SessionTermination::Timeout {
                component: Some(message.component),
            },
        )
    }

    /// The user aborted the dialogue
    ///
    /// Ends the session named by the message, or else the active session of
    /// its site.
    pub fn handle_abort_session(
        &mut self,
        message: &SiteMessage,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        let session_id = match &message.session_id {
            Some(session_id) if session_id.is_empty() => {
                return Err(DialogueError::EmptyField("session_id"));
            }
            Some(session_id) => session_id.clone(),
            None => self
                .active_by_site
                .get(&message.site_id)
                .cloned()
                .ok_or_else(|| {
                    DialogueError::MalformedRequest(format!(
                        "no active session on site `{}`",
                        message.site_id
                    ))
                })?,
        };
        info!(%session_id, site_id = %message.site_id, "session aborted by user");
        self.end_session(&session_id, SessionTermination::AbortedByUser)
    }

    /// A component reported an error
    ///
    /// The session it names ends with the error. Errors naming no live
    /// session, and the dialogue manager's own errors, change nothing.
    pub fn handle_component_error(
        &mut self,
        component: Component,
        message: &ErrorMessage,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        if component == Component::DialogueManager {
            return Ok(Vec::new());
        }
        let Some(session_id) = message.session_id.as_deref().filter(|id| self.is_live(id)) else {
            return Ok(Vec::new());
        };
        info!(session_id, %component, error = %message.error, "component failed, ending session");
        self.end_session(
            session_id,
            SessionTermination::Error {
                error: message.error.clone(),
            },
        )
    }

    /// Apply a configure message
    pub fn handle_configure(
        &mut self,
        message: &DialogueConfigureMessage,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        self.intents.apply(message);
        Ok(Vec::new())
    }

    /// Whether an intent is enabled on a site
    pub fn is_intent_enabled(&self, site_id: &str, intent_name: &str) -> bool {
        self.intents.is_enabled(site_id, intent_name)
    }

    pub fn is_site_available(&self, site_id: &str) -> bool {
        !self.unavailable_sites.contains(site_id)
    }

    /// Whether `session_id` names a session that hasn't ended
    pub fn is_live(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Look up a session, ended ones included while they are in the history
    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions
            .get(session_id)
            .or_else(|| self.ended.iter().find(|s| s.id() == session_id))
    }

    pub fn active_session(&self, site_id: &str) -> Option<&Session> {
        self.active_by_site
            .get(site_id)
            .and_then(|id| self.sessions.get(id))
    }

    /// Sessions waiting on a site, in promotion order
    pub fn queued_sessions(&self, site_id: &str) -> Vec<&Session> {
        self.queues
            .get(site_id)
            .map(|queue| queue.iter().filter_map(|id| self.sessions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Number of sites with sessions waiting
    pub fn queued_site_count(&self) -> usize {
        self.queues.len()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().chain(self.ended.iter())
    }

    fn live_session_mut(&mut self, session_id: &str) -> DialogueResult<&mut Session> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| DialogueError::UnknownSession(session_id.to_string()))
    }

    fn active_session_mut(&mut self, session_id: &str) -> DialogueResult<&mut Session> {
        let session = self.live_session_mut(session_id)?;
        if session.state() != SessionState::Active {
            return Err(DialogueError::InvalidStateTransition {
                from: session.state().to_string(),
                to: SessionState::Active.to_string(),
            });
        }
        Ok(session)
    }

    /// Activate `session` on its free site, then keep promoting queued
    /// sessions for as long as activated sessions end on their own
    fn activate_on_site(&mut self, session: Session) -> DialogueResult<Vec<DialogueEvent>> {
        let mut events = Vec::new();
        let mut next = Some(session);

        while let Some(mut session) = next.take() {
            events.extend(session.activate()?);
            if let Some(text) = session.start_text().filter(|text| !text.is_empty()) {
                events.push(say(&session, text.to_string()));
            }

            let site_id = session.site_id().to_string();
            if session.kind() == SessionKind::Notification {
                events.extend(session.end(SessionTermination::Nominal)?);
                self.archive(session);
                next = self.pop_queued(&site_id);
            } else {
                self.active_by_site
                    .insert(site_id, session.id().to_string());
                self.sessions.insert(session.id().to_string(), session);
            }
        }
        Ok(events)
    }

    fn pop_queued(&mut self, site_id: &str) -> Option<Session> {
        let queue = self.queues.get_mut(site_id)?;
        let mut next = None;
        while let Some(session_id) = queue.pop_front() {
            if let Some(session) = self.sessions.remove(&session_id) {
                next = Some(session);
                break;
            }
        }
        if queue.is_empty() {
            self.queues.remove(site_id);
        }
        next
    }

    /// End a live session and promote the next queued session of its site
    fn end_session(
        &mut self,
        session_id: &str,
        termination: SessionTermination,
    ) -> DialogueResult<Vec<DialogueEvent>> {
        let mut session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| DialogueError::UnknownSession(session_id.to_string()))?;
        let site_id = session.site_id().to_string();

        let was_active = self.active_by_site.get(&site_id).map(String::as_str) == Some(session_id);
        if was_active {
            self.active_by_site.remove(&site_id);
        } else if let Some(queue) = self.queues.get_mut(&site_id) {
            queue.retain(|id| id != session_id);
            if queue.is_empty() {
                self.queues.remove(&site_id);
            }
        }

        let mut events = session.end(termination)?;
        self.archive(session);

        if was_active && self.is_site_available(&site_id) {
            if let Some(next) = self.pop_queued(&site_id) {
                events.extend(self.activate_on_site(next)?);
            }
        }
        Ok(events)
    }

    fn archive(&mut self, session: Session) {
        if self.ended_capacity == 0 {
            return;
        }
        while self.ended.len() >= self.ended_capacity {
            self.ended.pop_front();
        }
        self.ended.push_back(session);
    }
}

fn validate_continue(request: &ContinueSessionMessage) -> DialogueResult<()> {
    if request.session_id.is_empty() {
        return Err(DialogueError::EmptyField("session_id"));
    }
    if request.slot.is_some() && request.intent_filter.as_ref().is_none_or(|f| f.len() != 1) {
        return Err(DialogueError::MalformedRequest(
            "slot filling requires an intent filter with exactly one intent".to_string(),
        ));
    }
    Ok(())
}

fn say(session: &Session, text: String) -> DialogueEvent {
    DialogueEvent::Say(SayMessage {
        text,
        lang: None,
        id: Some(Uuid::new_v4().to_string()),
        site_id: session.site_id().to_string(),
        session_id: Some(session.id().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DialogueConfigureIntent, SessionInit};
    use crate::value_objects::{IntentClassifierResult, Slot, SlotMap, SlotValue};

    fn handler() -> SessionCommandHandler {
        SessionCommandHandler::new("default", 8)
    }

    fn start(handler: &mut SessionCommandHandler, site: &str, enqueue: bool) -> Vec<DialogueEvent> {
        let init = SessionInit::Action {
            text: None,
            intent_filter: None,
            can_be_enqueued: enqueue,
            send_intent_not_recognized: false,
        };
        handler
            .handle_start_session(StartSessionMessage::new(init).on_site(site))
            .unwrap()
    }

    fn session_id(events: &[DialogueEvent]) -> String {
        events[0].session_id().unwrap().to_string()
    }

    fn intent(session_id: &str, name: &str) -> IntentMessage {
        IntentMessage::new(
            session_id,
            "kitchen",
            "a large pizza",
            IntentClassifierResult::new(name, 0.9),
        )
    }

    #[test]
    fn test_intent_configuration_precedence() {
        let mut config = IntentConfiguration::default();
        config.apply(&DialogueConfigureMessage {
            site_id: None,
            intents: Some(vec![DialogueConfigureIntent {
                intent_id: "order".into(),
                enable: Some(false),
            }]),
        });
        config.apply(&DialogueConfigureMessage {
            site_id: Some("kitchen".into()),
            intents: Some(vec![DialogueConfigureIntent {
                intent_id: "order".into(),
                enable: Some(true),
            }]),
        });

        assert!(config.is_enabled("kitchen", "order"));
        assert!(!config.is_enabled("bedroom", "order"));
        assert!(config.is_enabled("bedroom", "lights"));
    }

    #[test]
    fn test_notification_ends_in_one_step() {
        let mut handler = handler();
        let events = handler
            .handle_start_session(
                StartSessionMessage::new(SessionInit::notification("dinner is ready"))
                    .on_site("kitchen"),
            )
            .unwrap();

        let kinds: Vec<_> = events.iter().map(DialogueEvent::event_type).collect();
        assert_eq!(kinds, ["SessionStarted", "Say", "SessionEnded"]);
        assert!(handler.active_session("kitchen").is_none());
    }

    #[test]
    fn test_slot_filling_resolves_intent() {
        let mut handler = handler();
        let id = session_id(&start(&mut handler, "kitchen", true));
        handler
            .handle_continue_session(
                ContinueSessionMessage::new(id.as_str(), "which size?")
                    .with_intent_filter(["order"])
                    .with_slot("size"),
            )
            .unwrap();

        let slots: SlotMap = vec![
            Slot::new("size", "size", "large", SlotValue::Custom("large".into())),
            Slot::new("topping", "topping", "ham", SlotValue::Custom("ham".into())),
        ]
        .into();
        let events = handler
            .handle_intent(intent(&id, "unrelated").with_slots(slots), &|_| true)
            .unwrap();

        match &events[..] {
            [DialogueEvent::IntentParsed(parsed)] => {
                assert_eq!(parsed.intent_name(), "order");
                assert!(parsed.slots.contains("size"));
                assert!(!parsed.slots.contains("topping"));
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_slot_without_single_intent_filter_is_malformed() {
        let mut handler = handler();
        let id = session_id(&start(&mut handler, "kitchen", true));
        let err = handler
            .handle_continue_session(ContinueSessionMessage::new(id, "").with_slot("size"))
            .unwrap_err();
        assert!(matches!(err, DialogueError::MalformedRequest(_)));
    }

    #[test]
    fn test_disabled_intent_is_not_recognized() {
        let mut handler = handler();
        handler
            .handle_configure(&DialogueConfigureMessage {
                site_id: Some("kitchen".into()),
                intents: Some(vec![DialogueConfigureIntent {
                    intent_id: "order".into(),
                    enable: Some(false),
                }]),
            })
            .unwrap();
        let id = session_id(&start(&mut handler, "kitchen", true));

        let events = handler.handle_intent(intent(&id, "order"), &|_| true).unwrap();
        assert!(matches!(
            &events[..],
            [DialogueEvent::SessionEnded(m)] if m.termination == SessionTermination::IntentNotRecognized
        ));
    }

    #[test]
    fn test_ended_history_is_bounded() {
        let mut handler = SessionCommandHandler::new("default", 2);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = session_id(&start(&mut handler, "kitchen", true));
            handler
                .handle_end_session(EndSessionMessage {
                    session_id: id.clone(),
                    text: None,
                })
                .unwrap();
            ids.push(id);
        }
        assert!(handler.session(&ids[0]).is_none());
        assert!(handler.session(&ids[2]).unwrap().is_ended());
    }
}
