//! Inbound side of a connection
//!
//! Messages are handled one at a time in arrival order. Session commands go
//! through the state machine and its events are published back on the bus;
//! client events are dispatched to the registered handlers. No lock is held
//! while a handler runs.

use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Publisher;
use crate::error::{DialogueError, DialogueResult};
use crate::events::{
    ContinueSessionMessage, DialogueConfigureMessage, DialogueEvent, EndSessionMessage,
    ErrorMessage, IntentMessage, IntentNotRecognizedMessage, SessionEndedMessage,
    SessionQueuedMessage, SessionStartedMessage, SessionTimeoutMessage, SiteMessage,
    StartSessionMessage,
};
use crate::injection::{
    InjectionCompleteMessage, InjectionResetCompleteMessage, InjectionStatusMessage,
};
use crate::handlers::{SessionCommandHandler, dispatch};
use crate::routing::{Envelope, Topic};

/// Handle one received message
pub(crate) fn handle_envelope(publisher: &Publisher, envelope: Envelope) {
    let Some(topic) = publisher.router().classify(&envelope.topic) else {
        debug!(topic = %envelope.topic, "ignoring message on unknown topic");
        return;
    };
    debug!(topic = %envelope.topic, size = envelope.payload.len(), "received");

    if let Err(err) = route(publisher, &topic, &envelope.payload) {
        if err.is_decode_error() {
            warn!(topic = %envelope.topic, error = %err, "dropping undecodable message");
        } else {
            warn!(topic = %envelope.topic, error = %err, "failed to handle message");
        }
    }
}

fn route(publisher: &Publisher, topic: &Topic, payload: &[u8]) -> DialogueResult<()> {
    let format = publisher.format();
    let manage = publisher.state().manage_sessions;
    let registry = &publisher.state().registry;

    match topic {
        Topic::StartSession if manage => {
            let request: StartSessionMessage = format.decode(payload)?;
            run_command(publisher, "startSession", None, |sessions| {
                sessions.handle_start_session(request)
            })
        }
        Topic::ContinueSession if manage => {
            let request: ContinueSessionMessage = format.decode(payload)?;
            let session_id = Some(request.session_id.clone());
            run_command(publisher, "continueSession", session_id, |sessions| {
                sessions.handle_continue_session(request)
            })
        }
        Topic::EndSession if manage => {
            let request: EndSessionMessage = format.decode(payload)?;
            let session_id = Some(request.session_id.clone());
            run_command(publisher, "endSession", session_id, |sessions| {
                sessions.handle_end_session(request)
            })
        }
        Topic::Configure if manage => {
            let message: DialogueConfigureMessage = format.decode(payload)?;
            run_command(publisher, "configure", None, |sessions| {
                sessions.handle_configure(&message)
            })
        }
        Topic::DialogueToggleOff if manage => {
            let message: SiteMessage = format.decode(payload)?;
            run_command(publisher, "toggleOff", None, |sessions| {
                sessions.handle_site_unavailable(&message.site_id)
            })
        }
        Topic::DialogueToggleOn if manage => {
            let message: SiteMessage = format.decode(payload)?;
            run_command(publisher, "toggleOn", None, |sessions| {
                sessions.handle_site_available(&message.site_id)
            })
        }
        Topic::SessionTimeout if manage => {
            let message: SessionTimeoutMessage = format.decode(payload)?;
            let session_id = Some(message.session_id.clone());
            run_command(publisher, "sessionTimeout", session_id, |sessions| {
                sessions.handle_timeout(message)
            })
        }
        Topic::NluIntentParsed if manage => {
            let intent: IntentMessage = format.decode(payload)?;
            let session_id = Some(intent.session_id.clone());
            let require_handler = publisher.state().require_intent_handler;
            let has_handler = |name: &str| {
                !require_handler
                    || registry
                        .lock()
                        .map(|registry| registry.has_intent_handler(name))
                        .unwrap_or(false)
            };
            run_command(publisher, "intentParsed", session_id, |sessions| {
                sessions.handle_intent(intent, &has_handler)
            })
        }
        Topic::NluIntentNotRecognized if manage => {
            let message: IntentNotRecognizedMessage = format.decode(payload)?;
            let session_id = Some(message.session_id.clone());
            run_command(publisher, "nluIntentNotRecognized", session_id, |sessions| {
                sessions.handle_intent_not_recognized(message)
            })
        }

        Topic::Intent(name) => {
            let handlers = registry.lock()?.intent_handlers(name);
            if handlers.is_empty() {
                debug!(intent = %name, "no handler for intent");
                return Ok(());
            }
            let intent: IntentMessage = format.decode(payload)?;
            dispatch(name, &handlers, publisher, &intent);
            Ok(())
        }
        Topic::SessionStarted => {
            let message: SessionStartedMessage = format.decode(payload)?;
            let handlers = registry.lock()?.session_started_handlers();
            dispatch("sessionStarted", &handlers, publisher, &message);
            Ok(())
        }
        Topic::SessionQueued => {
            let message: SessionQueuedMessage = format.decode(payload)?;
            let handlers = registry.lock()?.session_queued_handlers();
            dispatch("sessionQueued", &handlers, publisher, &message);
            Ok(())
        }
        Topic::SessionEnded => {
            let message: SessionEndedMessage = format.decode(payload)?;
            let handlers = registry.lock()?.session_ended_handlers();
            dispatch("sessionEnded", &handlers, publisher, &message);
            Ok(())
        }
        Topic::IntentNotRecognized => {
            let message: IntentNotRecognizedMessage = format.decode(payload)?;
            let handlers = registry.lock()?.intent_not_recognized_handlers();
            dispatch("intentNotRecognized", &handlers, publisher, &message);
            Ok(())
        }
        Topic::InjectionComplete => {
            let message: InjectionCompleteMessage = format.decode(payload)?;
            let handlers = registry.lock()?.injection_complete_handlers();
            dispatch("injectionComplete", &handlers, publisher, &message);
            Ok(())
        }
        Topic::InjectionResetComplete => {
            let message: InjectionResetCompleteMessage = format.decode(payload)?;
            let handlers = registry.lock()?.injection_reset_complete_handlers();
            dispatch("injectionResetComplete", &handlers, publisher, &message);
            Ok(())
        }
        Topic::InjectionStatus => {
            let message: InjectionStatusMessage = format.decode(payload)?;
            let handlers = registry.lock()?.injection_status_handlers();
            dispatch("injectionStatus", &handlers, publisher, &message);
            Ok(())
        }
        Topic::AbortSession if manage => {
            let message: SiteMessage = format.decode(payload)?;
            let session_id = message.session_id.clone();
            run_command(publisher, "abortSession", session_id, |sessions| {
                sessions.handle_abort_session(&message)
            })
        }
        Topic::Error(component) => {
            let message: ErrorMessage = format.decode(payload)?;
            let handlers = registry.lock()?.error_handlers();
            dispatch(component.as_ref(), &handlers, publisher, &message);
            if !manage {
                return Ok(());
            }
            run_command(publisher, "componentError", message.session_id.clone(), |sessions| {
                sessions.handle_component_error(*component, &message)
            })
        }
        other => {
            debug!(topic = %other, "no inbound handling for topic");
            Ok(())
        }
    }
}

/// Run a session command and publish its events
///
/// A rejected command is reported on the dialogue manager's error topic; it
/// leaves every other session untouched.
fn run_command(
    publisher: &Publisher,
    context: &str,
    session_id: Option<String>,
    command: impl FnOnce(&mut SessionCommandHandler) -> DialogueResult<Vec<DialogueEvent>>,
) -> DialogueResult<()> {
    let outcome = {
        let mut sessions = publisher.state().sessions.lock()?;
        command(&mut sessions)
    };

    match outcome {
        Ok(events) => {
            for event in &events {
                debug!(event = event.event_type(), session_id = ?event.session_id(), "session event");
                publisher.publish_event(event)?;
            }
            Ok(())
        }
        Err(err) => {
            warn!(context, error = %err, "rejected session command");
            publisher.publish_event(&DialogueEvent::Error(ErrorMessage {
                session_id,
                error: err.to_string(),
                context: Some(context.to_string()),
            }))
        }
    }
}

/// Inbound queue of a connection, shared between the engine and its loop thread
pub(crate) type Inbound = Arc<Mutex<Option<UnboundedReceiver<Envelope>>>>;

/// Drain every queued message on the calling thread
pub(crate) fn drain(publisher: &Publisher, inbound: &Inbound) -> DialogueResult<usize> {
    let mut guard = inbound.lock()?;
    let receiver = guard.as_mut().ok_or(DialogueError::LoopAlreadyRunning)?;
    let mut processed = 0;
    while let Ok(envelope) = receiver.try_recv() {
        handle_envelope(publisher, envelope);
        processed += 1;
    }
    Ok(processed)
}

/// Body of the loop thread
///
/// Runs until stopped or until the transport goes away, then hands the
/// inbound queue back to the engine.
pub(crate) fn run(
    runtime: Runtime,
    publisher: Publisher,
    inbound: Inbound,
    mut receiver: UnboundedReceiver<Envelope>,
    mut stop: watch::Receiver<bool>,
) {
    info!("event loop started");
    runtime.block_on(async {
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                envelope = receiver.recv() => match envelope {
                    Some(envelope) => handle_envelope(&publisher, envelope),
                    None => break,
                },
            }
        }
    });

    match inbound.lock() {
        Ok(mut slot) => *slot = Some(receiver),
        Err(_) => warn!("can't hand the inbound queue back"),
    }
    info!("event loop stopped");
}
