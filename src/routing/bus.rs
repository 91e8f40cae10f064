//! Publish/subscribe transport seam
//!
//! The engine only talks to a [`Transport`] obtained from a [`Connector`].
//! [`MqttConnector`](super::MqttConnector) reaches a network broker;
//! [`InProcessBroker`] lives in the current process with MQTT topic filter
//! semantics, used to wire several engines together in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info};

use crate::config::MqttOptions;
use crate::error::{DialogueError, DialogueResult};

/// A message as it travels on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// An open connection to the bus
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> DialogueResult<()>;

    /// Receive messages matching `filter` on the connection's inbound queue
    fn subscribe(&self, filter: &str) -> DialogueResult<()>;

    fn disconnect(&self);
}

/// Opens transports
pub trait Connector {
    /// Connect, delivering inbound messages to `inbound` in arrival order
    fn connect(
        &self,
        options: &MqttOptions,
        inbound: UnboundedSender<Envelope>,
    ) -> DialogueResult<Box<dyn Transport>>;
}

/// Whether `topic` matches the MQTT topic filter `filter`
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn valid_filter(filter: &str) -> bool {
    let levels: Vec<&str> = filter.split('/').collect();
    !filter.is_empty()
        && levels.iter().enumerate().all(|(i, level)| match *level {
            "#" => i == levels.len() - 1,
            "+" => true,
            other => !other.contains(['+', '#']),
        })
}

struct Client {
    id: u64,
    filters: Vec<String>,
    sink: UnboundedSender<Envelope>,
}

struct BrokerState {
    address: String,
    credentials: Option<(String, String)>,
    clients: Mutex<Vec<Client>>,
    next_id: AtomicU64,
}

impl BrokerState {
    fn route(&self, envelope: Envelope) -> DialogueResult<usize> {
        let mut clients = self.clients.lock()?;
        // clients whose inbound queue is gone are dropped
        clients.retain(|client| !client.sink.is_closed());
        let mut delivered = 0;
        for client in clients.iter() {
            if client.filters.iter().any(|f| topic_matches(f, &envelope.topic))
                && client.sink.send(envelope.clone()).is_ok()
            {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    fn register(&self, sink: UnboundedSender<Envelope>) -> DialogueResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock()?.push(Client {
            id,
            filters: Vec::new(),
            sink,
        });
        Ok(id)
    }
}

/// In-process broker with MQTT topic filter semantics
///
/// Each client receives a matching message once, however many of its filters
/// match. Cloning yields another handle on the same broker.
#[derive(Clone)]
pub struct InProcessBroker {
    state: Arc<BrokerState>,
}

impl InProcessBroker {
    /// A broker reachable at `address` (`host:port`)
    pub fn bind(address: impl Into<String>) -> Self {
        Self {
            state: Arc::new(BrokerState {
                address: address.into(),
                credentials: None,
                clients: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// A broker that only accepts the given credentials
    pub fn bind_with_credentials(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            state: Arc::new(BrokerState {
                address: address.into(),
                credentials: Some((username.into(), password.into())),
                clients: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.state.address
    }

    /// Observe every message matching `filter`
    pub fn tap(&self, filter: &str) -> DialogueResult<UnboundedReceiver<Envelope>> {
        if !valid_filter(filter) {
            return Err(DialogueError::Connection(format!(
                "invalid topic filter `{filter}`"
            )));
        }
        let (sink, receiver) = unbounded_channel();
        let id = self.state.register(sink)?;
        let mut clients = self.state.clients.lock()?;
        if let Some(client) = clients.iter_mut().find(|c| c.id == id) {
            client.filters.push(filter.to_string());
        }
        Ok(receiver)
    }

    /// Number of connected clients, taps included
    pub fn client_count(&self) -> usize {
        self.state
            .clients
            .lock()
            .map(|clients| clients.iter().filter(|c| !c.sink.is_closed()).count())
            .unwrap_or_default()
    }
}

impl Connector for InProcessBroker {
    fn connect(
        &self,
        options: &MqttOptions,
        inbound: UnboundedSender<Envelope>,
    ) -> DialogueResult<Box<dyn Transport>> {
        options
            .host_port()
            .map_err(|e| DialogueError::Connection(e.to_string()))?;
        if options.broker_address != self.state.address {
            return Err(DialogueError::Connection(format!(
                "no broker listening on {}",
                options.broker_address
            )));
        }
        if let Some((username, password)) = &self.state.credentials {
            let accepted = options.username.as_ref() == Some(username)
                && options.password.as_ref() == Some(password);
            if !accepted {
                return Err(DialogueError::Connection(
                    "bad username or password".to_string(),
                ));
            }
        }

        let id = self.state.register(inbound)?;
        info!(broker = %self.state.address, client = id, "connected");
        Ok(Box::new(InProcessTransport {
            state: Arc::clone(&self.state),
            id,
            connected: AtomicBool::new(true),
        }))
    }
}

struct InProcessTransport {
    state: Arc<BrokerState>,
    id: u64,
    connected: AtomicBool,
}

impl Transport for InProcessTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> DialogueResult<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(DialogueError::publish(topic, "not connected"));
        }
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(DialogueError::publish(topic, "invalid topic name"));
        }
        let size = payload.len();
        let delivered = self.state.route(Envelope {
            topic: topic.to_string(),
            payload,
        })?;
        debug!(topic, size, delivered, "published");
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> DialogueResult<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(DialogueError::Connection("not connected".to_string()));
        }
        if !valid_filter(filter) {
            return Err(DialogueError::Connection(format!(
                "invalid topic filter `{filter}`"
            )));
        }
        let mut clients = self.state.clients.lock()?;
        if let Some(client) = clients.iter_mut().find(|c| c.id == self.id) {
            if !client.filters.iter().any(|f| f == filter) {
                client.filters.push(filter.to_string());
            }
        }
        debug!(filter, client = self.id, "subscribed");
        Ok(())
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            if let Ok(mut clients) = self.state.clients.lock() {
                clients.retain(|c| c.id != self.id);
            }
            info!(broker = %self.state.address, client = self.id, "disconnected");
        }
    }
}

impl Drop for InProcessTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
