//! Callback registry - user handlers for the events of one connection
//!
//! Registration is additive: every handler registered for an event is called,
//! in registration order. Handler failures and panics are contained at the
//! dispatch boundary.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, error};

use crate::engine::Publisher;
use crate::events::{
    ErrorMessage, IntentMessage, IntentNotRecognizedMessage, SessionEndedMessage,
    SessionQueuedMessage, SessionStartedMessage,
};
use crate::injection::{
    InjectionCompleteMessage, InjectionResetCompleteMessage, InjectionStatusMessage,
};

/// Identifies one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// A user handler for messages of type `M`
pub type Callback<M> = Arc<dyn Fn(&Publisher, &M) -> anyhow::Result<()> + Send + Sync>;

struct Handlers<M> {
    entries: Vec<(HandlerId, Callback<M>)>,
}

impl<M> Default for Handlers<M> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<M> Handlers<M> {
    fn push(&mut self, id: HandlerId, callback: Callback<M>) {
        self.entries.push((id, callback));
    }

    fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    fn snapshot(&self) -> Vec<Callback<M>> {
        self.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handlers registered on a connection
#[derive(Default)]
pub struct CallbackRegistry {
    next_id: u64,
    intents: HashMap<String, Handlers<IntentMessage>>,
    any_intent: Handlers<IntentMessage>,
    session_started: Handlers<SessionStartedMessage>,
    session_queued: Handlers<SessionQueuedMessage>,
    session_ended: Handlers<SessionEndedMessage>,
    intent_not_recognized: Handlers<IntentNotRecognizedMessage>,
    injection_complete: Handlers<InjectionCompleteMessage>,
    injection_reset_complete: Handlers<InjectionResetCompleteMessage>,
    injection_status: Handlers<InjectionStatusMessage>,
    error: Handlers<ErrorMessage>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("intents", &self.intents.keys().collect::<Vec<_>>())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    /// Handle one intent by name
    pub fn on_intent(
        &mut self,
        intent_name: impl Into<String>,
        callback: impl Fn(&Publisher, &IntentMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        let intent_name = intent_name.into();
        debug!(intent = %intent_name, handler = id.0, "intent handler registered");
        self.intents.entry(intent_name).or_default().push(id, Arc::new(callback));
        id
    }

    /// Handle every intent
    pub fn on_any_intent(
        &mut self,
        callback: impl Fn(&Publisher, &IntentMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.any_intent.push(id, Arc::new(callback));
        id
    }

    pub fn on_session_started(
        &mut self,
        callback: impl Fn(&Publisher, &SessionStartedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.session_started.push(id, Arc::new(callback));
        id
    }

    pub fn on_session_queued(
        &mut self,
        callback: impl Fn(&Publisher, &SessionQueuedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.session_queued.push(id, Arc::new(callback));
        id
    }

    pub fn on_session_ended(
        &mut self,
        callback: impl Fn(&Publisher, &SessionEndedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.session_ended.push(id, Arc::new(callback));
        id
    }

    pub fn on_intent_not_recognized(
        &mut self,
        callback: impl Fn(&Publisher, &IntentNotRecognizedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.intent_not_recognized.push(id, Arc::new(callback));
        id
    }

    pub fn on_injection_complete(
        &mut self,
        callback: impl Fn(&Publisher, &InjectionCompleteMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.injection_complete.push(id, Arc::new(callback));
        id
    }

    pub fn on_injection_reset_complete(
        &mut self,
        callback: impl Fn(&Publisher, &InjectionResetCompleteMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.injection_reset_complete.push(id, Arc::new(callback));
        id
    }

    pub fn on_injection_status(
        &mut self,
        callback: impl Fn(&Publisher, &InjectionStatusMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.injection_status.push(id, Arc::new(callback));
        id
    }

    pub fn on_error(
        &mut self,
        callback: impl Fn(&Publisher, &ErrorMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.error.push(id, Arc::new(callback));
        id
    }

    /// Remove one handler, wherever it was registered
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let mut removed = false;
        for handlers in self.intents.values_mut() {
            removed |= handlers.remove(id);
        }
        self.intents.retain(|_, handlers| !handlers.is_empty());

        removed |= self.any_intent.remove(id);
        removed |= self.session_started.remove(id);
        removed |= self.session_queued.remove(id);
        removed |= self.session_ended.remove(id);
        removed |= self.intent_not_recognized.remove(id);
        removed |= self.injection_complete.remove(id);
        removed |= self.injection_reset_complete.remove(id);
        removed |= self.injection_status.remove(id);
        removed |= self.error.remove(id);
        removed
    }

    /// Whether an intent would reach at least one handler
    pub fn has_intent_handler(&self, intent_name: &str) -> bool {
        !self.any_intent.is_empty() || self.intents.contains_key(intent_name)
    }

    /// Handlers of an intent: the ones registered for its name, then the catch-all ones
    pub fn intent_handlers(&self, intent_name: &str) -> Vec<Callback<IntentMessage>> {
        let mut handlers = self
            .intents
            .get(intent_name)
            .map(Handlers::snapshot)
            .unwrap_or_default();
        handlers.extend(self.any_intent.snapshot());
        handlers
    }

    pub fn session_started_handlers(&self) -> Vec<Callback<SessionStartedMessage>> {
        self.session_started.snapshot()
    }

    pub fn session_queued_handlers(&self) -> Vec<Callback<SessionQueuedMessage>> {
        self.session_queued.snapshot()
    }

    pub fn session_ended_handlers(&self) -> Vec<Callback<SessionEndedMessage>> {
        self.session_ended.snapshot()
    }

    pub fn intent_not_recognized_handlers(&self) -> Vec<Callback<IntentNotRecognizedMessage>> {
        self.intent_not_recognized.snapshot()
    }

    pub fn injection_complete_handlers(&self) -> Vec<Callback<InjectionCompleteMessage>> {
        self.injection_complete.snapshot()
    }

    pub fn injection_reset_complete_handlers(
        &self,
    ) -> Vec<Callback<InjectionResetCompleteMessage>> {
        self.injection_reset_complete.snapshot()
    }

    pub fn injection_status_handlers(&self) -> Vec<Callback<InjectionStatusMessage>> {
        self.injection_status.snapshot()
    }

    pub fn error_handlers(&self) -> Vec<Callback<ErrorMessage>> {
        self.error.snapshot()
    }
}

/// Call every handler with `message`, returning how many succeeded
///
/// A failing or panicking handler is logged with `event` and doesn't prevent
/// the next ones from running.
pub fn dispatch<M>(
    event: &str,
    handlers: &[Callback<M>],
    publisher: &Publisher,
    message: &M,
) -> usize {
    let mut succeeded = 0;
    for handler in handlers {
        match catch_unwind(AssertUnwindSafe(|| handler(publisher, message))) {
            Ok(Ok(())) => succeeded += 1,
            Ok(Err(err)) => error!(event, error = %err, "handler failed"),
            Err(panic) => {
                let cause = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(event, %cause, "handler panicked");
            }
        }
    }
    succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::IntentClassifierResult;
    use std::sync::Mutex;

    fn noop(_: &Publisher, _: &IntentMessage) -> anyhow::Result<()> {
        Ok(())
    }

    fn callback<M>(
        f: impl Fn(&Publisher, &M) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Callback<M> {
        Arc::new(f)
    }

    #[test]
    fn test_registration_is_additive() {
        let mut registry = CallbackRegistry::new();
        let first = registry.on_intent("order", noop);
        let second = registry.on_intent("order", noop);
        assert_ne!(first, second);
        assert_eq!(registry.intent_handlers("order").len(), 2);
        assert!(registry.has_intent_handler("order"));
        assert!(!registry.has_intent_handler("cancel"));
    }

    #[test]
    fn test_catch_all_handlers_come_last() {
        let mut registry = CallbackRegistry::new();
        registry.on_any_intent(noop);
        registry.on_intent("order", noop);
        assert!(registry.has_intent_handler("cancel"));
        assert_eq!(registry.intent_handlers("order").len(), 2);
        assert_eq!(registry.intent_handlers("cancel").len(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_one_handler() {
        let mut registry = CallbackRegistry::new();
        let first = registry.on_intent("order", noop);
        registry.on_intent("order", noop);
        let ended = registry.on_session_ended(|_, _| Ok(()));

        assert!(registry.unsubscribe(first));
        assert!(!registry.unsubscribe(first));
        assert_eq!(registry.intent_handlers("order").len(), 1);

        assert!(registry.unsubscribe(ended));
        assert!(registry.session_ended_handlers().is_empty());
    }

    #[test]
    fn test_dispatch_contains_failures() {
        let publisher = Publisher::detached();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&calls), Arc::clone(&calls));
        let handlers: Vec<Callback<IntentMessage>> = vec![
            callback(|_, _| anyhow::bail!("boom")),
            callback(|_, _| panic!("handler bug")),
            callback(move |_, m: &IntentMessage| {
                a.lock().unwrap().push(m.intent_name().to_string());
                Ok(())
            }),
            callback(move |_, _| {
                b.lock().unwrap().push("last".to_string());
                Ok(())
            }),
        ];
        let message = IntentMessage::new(
            "session",
            "kitchen",
            "a pizza",
            IntentClassifierResult::new("order", 0.8),
        );

        let succeeded = dispatch("intent", &handlers, &publisher, &message);
        assert_eq!(succeeded, 2);
        assert_eq!(*calls.lock().unwrap(), ["order", "last"]);
    }
}
