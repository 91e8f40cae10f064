//! Tests for the session state machine

use dialogue_engine::{
    Component, ContinueSessionMessage, DialogueError, DialogueEvent, EndSessionMessage,
    ErrorMessage, IntentClassifierResult, IntentMessage, IntentNotRecognizedMessage,
    SessionCommandHandler, SessionInit, SessionState, SessionTermination, SessionTimeoutMessage,
    SiteMessage, StartSessionMessage,
};

fn action(can_be_enqueued: bool) -> SessionInit {
    SessionInit::Action {
        text: None,
        intent_filter: None,
        can_be_enqueued,
        send_intent_not_recognized: false,
    }
}

fn start_on(handler: &mut SessionCommandHandler, site: &str, can_be_enqueued: bool) -> Vec<DialogueEvent> {
    handler
        .handle_start_session(StartSessionMessage::new(action(can_be_enqueued)).on_site(site))
        .unwrap()
}

fn end(handler: &mut SessionCommandHandler, session_id: &str) -> Vec<DialogueEvent> {
    handler
        .handle_end_session(EndSessionMessage {
            session_id: session_id.to_string(),
            text: None,
        })
        .unwrap()
}

fn event_types(events: &[DialogueEvent]) -> Vec<&'static str> {
    events.iter().map(DialogueEvent::event_type).collect()
}

fn active_id(handler: &SessionCommandHandler, site: &str) -> Option<String> {
    handler.active_session(site).map(|s| s.id().to_string())
}

#[test]
fn test_start_continue_end() {
    // Setup
    let mut handler = SessionCommandHandler::new("default", 16);

    // Start
    let events = start_on(&mut handler, "kitchen", true);
    assert_eq!(event_types(&events), ["SessionStarted"]);
    let session_id = events[0].session_id().unwrap().to_string();
    assert_eq!(handler.session(&session_id).unwrap().state(), SessionState::Active);

    // Continue
    let events = handler
        .handle_continue_session(
            ContinueSessionMessage::new(session_id.as_str(), "")
                .with_intent_filter(["order"]),
        )
        .unwrap();
    assert!(events.is_empty());
    let session = handler.session(&session_id).unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(
        session.turn().intent_filter,
        Some(vec!["order".to_string()])
    );

    // End
    let events = handler
        .handle_end_session(EndSessionMessage {
            session_id: session_id.clone(),
            text: Some("bye".to_string()),
        })
        .unwrap();
    assert_eq!(event_types(&events), ["Say", "SessionEnded"]);
    match &events[0] {
        DialogueEvent::Say(say) => {
            assert_eq!(say.text, "bye");
            assert_eq!(say.site_id, "kitchen");
        }
        other => panic!("unexpected event {other:?}"),
    }

    let session = handler.session(&session_id).unwrap();
    assert_eq!(session.state(), SessionState::Ended);
    assert_eq!(session.termination(), Some(&SessionTermination::Nominal));
}

#[test]
fn test_queued_session_is_promoted() {
    let mut handler = SessionCommandHandler::new("default", 16);

    let first = start_on(&mut handler, "kitchen", false);
    let first_id = first[0].session_id().unwrap().to_string();

    let second = start_on(&mut handler, "kitchen", true);
    assert_eq!(event_types(&second), ["SessionQueued"]);
    let second_id = second[0].session_id().unwrap().to_string();
    assert_eq!(handler.session(&second_id).unwrap().state(), SessionState::Queued);

    let events = end(&mut handler, &first_id);
    assert_eq!(event_types(&events), ["SessionEnded", "SessionStarted"]);
    match &events[1] {
        DialogueEvent::SessionStarted(started) => {
            assert_eq!(started.session_id, second_id);
            assert!(started.reactivated_from_session_id.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(active_id(&handler, "kitchen"), Some(second_id));
}

#[test]
fn test_queue_is_fifo() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let active = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();

    let queued: Vec<String> = (0..3)
        .map(|_| {
            start_on(&mut handler, "kitchen", true)[0]
                .session_id()
                .unwrap()
                .to_string()
        })
        .collect();

    let mut current = active;
    for expected in &queued {
        end(&mut handler, &current);
        let promoted = active_id(&handler, "kitchen").unwrap();
        assert_eq!(&promoted, expected);
        current = promoted;
    }
    end(&mut handler, &current);
    assert!(handler.active_session("kitchen").is_none());
}

#[test]
fn test_at_most_one_active_session_per_site() {
    let mut handler = SessionCommandHandler::new("default", 16);
    for site in ["kitchen", "bedroom", "kitchen", "kitchen", "bedroom"] {
        start_on(&mut handler, site, true);
    }

    for site in ["kitchen", "bedroom"] {
        let active = handler
            .sessions()
            .filter(|s| s.site_id() == site && s.is_active())
            .count();
        assert_eq!(active, 1);
    }
    assert_eq!(handler.queued_sessions("kitchen").len(), 2);
    assert_eq!(handler.queued_sessions("bedroom").len(), 1);
}

#[test]
fn test_non_enqueueable_start_is_dropped() {
    let mut handler = SessionCommandHandler::new("default", 16);
    start_on(&mut handler, "kitchen", true);
    let before = handler.sessions().count();

    let events = start_on(&mut handler, "kitchen", false);

    assert!(events.is_empty());
    assert_eq!(handler.sessions().count(), before);
    assert!(handler.queued_sessions("kitchen").is_empty());
}

#[test]
fn test_sites_are_independent() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let kitchen = start_on(&mut handler, "kitchen", true);
    let bedroom = start_on(&mut handler, "bedroom", false);
    assert_eq!(event_types(&bedroom), ["SessionStarted"]);

    // a failing request leaves other sessions alone
    let err = handler
        .handle_end_session(EndSessionMessage {
            session_id: "unknown".to_string(),
            text: None,
        })
        .unwrap_err();
    assert!(matches!(err, DialogueError::UnknownSession(_)));

    let kitchen_id = kitchen[0].session_id().unwrap();
    assert!(handler.session(kitchen_id).unwrap().is_active());
    assert!(handler.active_session("bedroom").is_some());
}

#[test]
fn test_start_on_default_site() {
    let mut handler = SessionCommandHandler::new("living-room", 16);
    let events = handler
        .handle_start_session(StartSessionMessage::new(SessionInit::action()))
        .unwrap();
    match &events[0] {
        DialogueEvent::SessionStarted(started) => assert_eq!(started.site_id, "living-room"),
        other => panic!("unexpected event {other:?}"),
    }

    let err = handler
        .handle_start_session(StartSessionMessage::new(SessionInit::action()).on_site(""))
        .unwrap_err();
    assert!(matches!(err, DialogueError::EmptyField("site_id")));
}

#[test]
fn test_site_unavailable_ends_everything() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let active = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();
    let queued = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();

    let events = handler.handle_site_unavailable("kitchen").unwrap();
    let ended: Vec<(&str, &SessionTermination)> = events
        .iter()
        .map(|event| match event {
            DialogueEvent::SessionEnded(m) => (m.session_id.as_str(), &m.termination),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        ended,
        [
            (active.as_str(), &SessionTermination::SiteUnavailable),
            (queued.as_str(), &SessionTermination::SiteUnavailable),
        ]
    );
    assert!(handler.active_session("kitchen").is_none());

    // new sessions end right away until the site comes back
    let events = start_on(&mut handler, "kitchen", true);
    assert_eq!(event_types(&events), ["SessionEnded"]);

    handler.handle_site_available("kitchen").unwrap();
    let events = start_on(&mut handler, "kitchen", true);
    assert_eq!(event_types(&events), ["SessionStarted"]);
}

#[test]
fn test_notification_lets_queue_through() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let active = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();
    let events = handler
        .handle_start_session(
            StartSessionMessage::new(SessionInit::notification("timer done")).on_site("kitchen"),
        )
        .unwrap();
    assert_eq!(event_types(&events), ["SessionQueued"]);
    let waiting = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();

    let events = end(&mut handler, &active);
    assert_eq!(
        event_types(&events),
        ["SessionEnded", "SessionStarted", "Say", "SessionEnded", "SessionStarted"]
    );
    assert_eq!(active_id(&handler, "kitchen"), Some(waiting));
}

#[test]
fn test_timeout_ends_session() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let session_id = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();

    let events = handler
        .handle_timeout(SessionTimeoutMessage {
            session_id: session_id.clone(),
            component: Component::Asr,
        })
        .unwrap();

    match &events[..] {
        [DialogueEvent::SessionEnded(ended)] => assert_eq!(
            ended.termination,
            SessionTermination::Timeout {
                component: Some(Component::Asr)
            }
        ),
        other => panic!("unexpected events {other:?}"),
    }
}

#[test]
fn test_filtered_turn_rejects_other_intents() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let session_id = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();
    handler
        .handle_continue_session(
            ContinueSessionMessage::new(session_id.as_str(), "what do you want?")
                .with_intent_filter(["order"])
                .sending_intent_not_recognized(),
        )
        .unwrap();

    let intent = IntentMessage::new(
        session_id.as_str(),
        "kitchen",
        "cancel that",
        IntentClassifierResult::new("cancel", 0.7),
    );
    let events = handler.handle_intent(intent.clone(), &|_| true).unwrap();
    assert_eq!(event_types(&events), ["IntentNotRecognized"]);
    assert!(handler.session(&session_id).unwrap().is_active());

    // the setting only held for one turn
    let events = handler.handle_intent(intent, &|_| true).unwrap();
    assert_eq!(event_types(&events), ["IntentParsed"]);
}

#[test]
fn test_intent_without_handler_ends_session() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let session_id = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();

    let intent = IntentMessage::new(
        session_id.as_str(),
        "kitchen",
        "play some jazz",
        IntentClassifierResult::new("playMusic", 0.9),
    );
    let events = handler.handle_intent(intent, &|name| name == "order").unwrap();

    match &events[..] {
        [DialogueEvent::SessionEnded(ended)] => {
            assert_eq!(ended.termination, SessionTermination::IntentNotRecognized)
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[test]
fn test_unrecognized_input_reported_when_asked() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let init = SessionInit::Action {
        text: Some("what can I do for you?".to_string()),
        intent_filter: None,
        can_be_enqueued: true,
        send_intent_not_recognized: true,
    };
    let events = handler
        .handle_start_session(
            StartSessionMessage::new(init)
                .on_site("kitchen")
                .with_custom_data("ctx"),
        )
        .unwrap();
    assert_eq!(event_types(&events), ["SessionStarted", "Say"]);
    let session_id = events[0].session_id().unwrap().to_string();

    let events = handler
        .handle_intent_not_recognized(IntentNotRecognizedMessage {
            session_id: session_id.clone(),
            custom_data: None,
            site_id: "kitchen".to_string(),
            input: Some("blah".to_string()),
            confidence_score: 0.2,
        })
        .unwrap();
    match &events[..] {
        [DialogueEvent::IntentNotRecognized(m)] => {
            assert_eq!(m.custom_data.as_deref(), Some("ctx"));
            assert_eq!(m.input.as_deref(), Some("blah"));
        }
        other => panic!("unexpected events {other:?}"),
    }
    assert!(handler.session(&session_id).unwrap().is_active());
}

#[test]
fn test_user_abort_ends_session() {
    // Setup
    let mut handler = SessionCommandHandler::new("default", 16);
    let active = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();
    let queued = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();

    // Execute: abort whatever runs on the site
    let events = handler
        .handle_abort_session(&SiteMessage::new("kitchen"))
        .unwrap();

    // Verify
    assert_eq!(event_types(&events), ["SessionEnded", "SessionStarted"]);
    match &events[0] {
        DialogueEvent::SessionEnded(ended) => {
            assert_eq!(ended.session_id, active);
            assert_eq!(ended.termination, SessionTermination::AbortedByUser);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(active_id(&handler, "kitchen"), Some(queued.clone()));

    // a session can be named explicitly
    let events = handler
        .handle_abort_session(&SiteMessage {
            site_id: "kitchen".to_string(),
            session_id: Some(queued.clone()),
        })
        .unwrap();
    assert_eq!(event_types(&events), ["SessionEnded"]);
    assert_eq!(
        handler.session(&queued).unwrap().termination(),
        Some(&SessionTermination::AbortedByUser)
    );

    // nothing left to abort
    let err = handler
        .handle_abort_session(&SiteMessage::new("kitchen"))
        .unwrap_err();
    assert!(matches!(err, DialogueError::MalformedRequest(_)));
}

#[test]
fn test_component_error_ends_session() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let session_id = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();
    let error = |session_id: Option<&str>| ErrorMessage {
        session_id: session_id.map(str::to_string),
        error: "speaker unplugged".to_string(),
        context: Some("say".to_string()),
    };

    // the dialogue manager's own errors and errors without a live session change nothing
    assert!(handler
        .handle_component_error(Component::DialogueManager, &error(Some(&session_id)))
        .unwrap()
        .is_empty());
    assert!(handler
        .handle_component_error(Component::Tts, &error(None))
        .unwrap()
        .is_empty());
    assert!(handler
        .handle_component_error(Component::Tts, &error(Some("gone")))
        .unwrap()
        .is_empty());
    assert!(handler.session(&session_id).unwrap().is_active());

    let events = handler
        .handle_component_error(Component::Tts, &error(Some(&session_id)))
        .unwrap();
    match &events[..] {
        [DialogueEvent::SessionEnded(ended)] => assert_eq!(
            ended.termination,
            SessionTermination::Error {
                error: "speaker unplugged".to_string()
            }
        ),
        other => panic!("unexpected events {other:?}"),
    }
    assert!(handler.active_session("kitchen").is_none());
}

#[test]
fn test_drained_queues_are_released() {
    let mut handler = SessionCommandHandler::new("default", 16);
    let kitchen = start_on(&mut handler, "kitchen", true)[0]
        .session_id()
        .unwrap()
        .to_string();
    start_on(&mut handler, "kitchen", true);
    let bedroom = start_on(&mut handler, "bedroom", true)[0]
        .session_id()
        .unwrap()
        .to_string();
    let waiting = start_on(&mut handler, "bedroom", true)[0]
        .session_id()
        .unwrap()
        .to_string();
    assert_eq!(handler.queued_site_count(), 2);

    // promotion empties the kitchen queue
    end(&mut handler, &kitchen);
    assert_eq!(handler.queued_site_count(), 1);

    // ending the only queued session empties the bedroom queue
    end(&mut handler, &waiting);
    assert_eq!(handler.queued_site_count(), 0);
    assert!(handler.queued_sessions("bedroom").is_empty());
    assert_eq!(active_id(&handler, "bedroom"), Some(bedroom));
}
