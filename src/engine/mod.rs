//! Engine handle - one connection to the message bus
//!
//! A [`DialogueEngine`] is opened with [`DialogueEngine::connect`], used to
//! register handlers and publish, and closed with [`DialogueEngine::close`]
//! (or dropped). Several engines may live in the same process.

mod event_loop;
mod publisher;

pub use publisher::Publisher;

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::watch;
use tracing::{error, info};

use crate::codec::WireFormat;
use crate::config::EngineConfig;
use crate::error::{DialogueError, DialogueResult};
use crate::events::{
    ErrorMessage, IntentMessage, IntentNotRecognizedMessage, SessionEndedMessage,
    SessionQueuedMessage, SessionStartedMessage,
};
use crate::handlers::{CallbackRegistry, HandlerId, SessionCommandHandler};
use crate::injection::{
    InjectionCompleteMessage, InjectionResetCompleteMessage, InjectionStatusMessage,
};
use crate::logging::init_logging;
use crate::queries::{SessionQuery, SessionQueryHandler, SessionQueryResult};
use crate::routing::{Connector, MqttConnector, TopicRouter, Transport};
use event_loop::Inbound;

/// State shared by the engine, its publishers and its loop thread
pub(crate) struct EngineState {
    pub(crate) sessions: Mutex<SessionCommandHandler>,
    pub(crate) registry: Mutex<CallbackRegistry>,
    pub(crate) manage_sessions: bool,
    pub(crate) require_intent_handler: bool,
}

impl EngineState {
    pub(crate) fn new(
        default_site_id: &str,
        ended_session_history: usize,
        manage_sessions: bool,
        require_intent_handler: bool,
    ) -> Self {
        Self {
            sessions: Mutex::new(SessionCommandHandler::new(
                default_site_id,
                ended_session_history,
            )),
            registry: Mutex::new(CallbackRegistry::new()),
            manage_sessions,
            require_intent_handler,
        }
    }
}

/// Stops the event loop of an engine, usable from inside a handler
#[derive(Debug, Clone)]
pub struct LoopStopper {
    signal: Arc<watch::Sender<bool>>,
}

impl LoopStopper {
    /// Ask the loop to stop after the message being handled, without waiting
    pub fn stop(&self) {
        self.signal.send_replace(true);
    }
}

struct LoopWorker {
    handle: JoinHandle<()>,
}

/// A connection to the message bus and everything it runs
pub struct DialogueEngine {
    publisher: Publisher,
    inbound: Inbound,
    stop: Arc<watch::Sender<bool>>,
    worker: Mutex<Option<LoopWorker>>,
}

impl std::fmt::Debug for DialogueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueEngine")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl DialogueEngine {
    /// Connect to the bus and subscribe to the engine's topics
    ///
    /// Fails before any state exists when the broker can't be reached.
    pub fn connect(config: EngineConfig, connector: &dyn Connector) -> DialogueResult<Self> {
        config.validate()?;
        if config.logs_enabled {
            init_logging(&config.log_filter);
        }

        let router = TopicRouter::new(WireFormat::from_json_flag(config.use_json_api));
        let (sink, receiver) = unbounded_channel();
        let transport: Arc<dyn Transport> = Arc::from(connector.connect(&config.mqtt, sink)?);
        for filter in router.subscriptions(config.manage_sessions) {
            transport.subscribe(&filter)?;
        }

        let state = Arc::new(EngineState::new(
            &config.default_site_id,
            config.ended_session_history,
            config.manage_sessions,
            config.require_intent_handler,
        ));
        info!(
            broker = %config.mqtt.broker_address,
            format = ?router.format(),
            manage_sessions = config.manage_sessions,
            "dialogue engine connected"
        );

        Ok(Self {
            publisher: Publisher::new(transport, router, state),
            inbound: Arc::new(Mutex::new(Some(receiver))),
            stop: Arc::new(watch::channel(false).0),
            worker: Mutex::new(None),
        })
    }

    /// Connect to the MQTT broker named in the configuration
    pub fn connect_mqtt(config: EngineConfig) -> DialogueResult<Self> {
        Self::connect(config, &MqttConnector::default())
    }

    /// Stop the loop if it runs, then disconnect
    pub fn close(&self) {
        match self.loop_stop() {
            Ok(()) | Err(DialogueError::LoopNotRunning) => {}
            Err(err) => error!(error = %err, "failed to stop event loop"),
        }
        self.publisher.transport().disconnect();
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    fn registry(&self) -> DialogueResult<std::sync::MutexGuard<'_, CallbackRegistry>> {
        Ok(self.publisher.state().registry.lock()?)
    }

    /// Call `handler` for every intent named `intent_name`
    pub fn subscribe_intent(
        &self,
        intent_name: impl Into<String>,
        handler: impl Fn(&Publisher, &IntentMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_intent(intent_name, handler))
    }

    /// Call `handler` for every intent
    pub fn subscribe_intents(
        &self,
        handler: impl Fn(&Publisher, &IntentMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_any_intent(handler))
    }

    pub fn subscribe_session_started(
        &self,
        handler: impl Fn(&Publisher, &SessionStartedMessage) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_session_started(handler))
    }

    pub fn subscribe_session_queued(
        &self,
        handler: impl Fn(&Publisher, &SessionQueuedMessage) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_session_queued(handler))
    }

    pub fn subscribe_session_ended(
        &self,
        handler: impl Fn(&Publisher, &SessionEndedMessage) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_session_ended(handler))
    }

    pub fn subscribe_intent_not_recognized(
        &self,
        handler: impl Fn(&Publisher, &IntentNotRecognizedMessage) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_intent_not_recognized(handler))
    }

    pub fn subscribe_injection_complete(
        &self,
        handler: impl Fn(&Publisher, &InjectionCompleteMessage) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_injection_complete(handler))
    }

    pub fn subscribe_injection_reset_complete(
        &self,
        handler: impl Fn(&Publisher, &InjectionResetCompleteMessage) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_injection_reset_complete(handler))
    }

    pub fn subscribe_injection_status(
        &self,
        handler: impl Fn(&Publisher, &InjectionStatusMessage) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_injection_status(handler))
    }

    /// Errors reported by any component, the dialogue manager included
    pub fn subscribe_error(
        &self,
        handler: impl Fn(&Publisher, &ErrorMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> DialogueResult<HandlerId> {
        Ok(self.registry()?.on_error(handler))
    }

    /// Remove a handler; `false` if it was already gone
    pub fn unsubscribe(&self, id: HandlerId) -> DialogueResult<bool> {
        Ok(self.registry()?.unsubscribe(id))
    }

    /// Answer a query about the sessions this engine runs
    pub fn query(&self, query: SessionQuery) -> DialogueResult<SessionQueryResult> {
        let sessions = self.publisher.state().sessions.lock()?;
        Ok(SessionQueryHandler::new(&sessions).execute(query))
    }

    /// Handle every message received so far on the calling thread
    ///
    /// Messages published while draining are handled in the same call.
    /// Fails with [`DialogueError::LoopAlreadyRunning`] in loop mode.
    pub fn process_pending(&self) -> DialogueResult<usize> {
        event_loop::drain(&self.publisher, &self.inbound)
    }

    /// Handle messages on a dedicated thread until [`Self::loop_stop`]
    pub fn loop_start(&self) -> DialogueResult<()> {
        let mut worker = self.worker.lock()?;
        if let Some(running) = worker.as_ref() {
            if !running.handle.is_finished() {
                return Err(DialogueError::LoopAlreadyRunning);
            }
        }
        if let Some(finished) = worker.take() {
            let _ = finished.handle.join();
        }

        let receiver = self
            .inbound
            .lock()?
            .take()
            .ok_or(DialogueError::LoopAlreadyRunning)?;
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                *self.inbound.lock()? = Some(receiver);
                return Err(err.into());
            }
        };

        self.stop.send_replace(false);
        let stop = self.stop.subscribe();
        let publisher = self.publisher.clone();
        let inbound = Arc::clone(&self.inbound);
        let handle = thread::Builder::new()
            .name("dialogue-loop".to_string())
            .spawn(move || event_loop::run(runtime, publisher, inbound, receiver, stop))?;

        *worker = Some(LoopWorker { handle });
        Ok(())
    }

    /// Stop the loop thread
    ///
    /// Blocks until the thread has exited, so no handler is still running on
    /// return. Called from a handler, it only requests the stop.
    pub fn loop_stop(&self) -> DialogueResult<()> {
        let worker = self
            .worker
            .lock()?
            .take()
            .ok_or(DialogueError::LoopNotRunning)?;
        self.stop.send_replace(true);

        if worker.handle.thread().id() == thread::current().id() {
            info!("event loop stop requested from its own thread");
            return Ok(());
        }
        if worker.handle.join().is_err() {
            error!("event loop thread panicked");
        }
        Ok(())
    }

    /// Whether the loop thread is running
    pub fn is_looping(&self) -> bool {
        self.worker
            .lock()
            .map(|worker| worker.as_ref().is_some_and(|w| !w.handle.is_finished()))
            .unwrap_or(false)
    }

    /// A handle stopping the loop without waiting for it
    pub fn stop_handle(&self) -> LoopStopper {
        LoopStopper {
            signal: Arc::clone(&self.stop),
        }
    }
}

impl Drop for DialogueEngine {
    fn drop(&mut self) {
        self.close();
    }
}
