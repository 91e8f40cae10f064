//! Connection to a network MQTT broker
//!
//! [`MqttConnector`] dials the broker named by [`MqttOptions`], waits for the
//! broker to accept the session and then hands received publications to the
//! engine from a dedicated network thread. TLS is enabled by the presence of
//! a TLS hostname.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rumqttc::{Client, Connection, Event, Outgoing, Packet, QoS, TlsConfiguration};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bus::{Connector, Envelope, Transport};
use crate::config::{MqttOptions, TlsOptions};
use crate::error::{DialogueError, DialogueResult};

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Opens connections to an MQTT broker
///
/// Connecting blocks until the broker acknowledged the connection, so it must
/// not be called from inside an async runtime.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    keep_alive: Duration,
    capacity: usize,
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(30),
            capacity: 64,
        }
    }
}

impl MqttConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Number of outgoing requests buffered before publishing blocks
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn client_options(&self, options: &MqttOptions) -> DialogueResult<rumqttc::MqttOptions> {
        let (host, port) = options
            .host_port()
            .map_err(|e| DialogueError::Connection(e.to_string()))?;
        let tls = options.tls();
        // with TLS the broker is dialed by the name its certificate is checked against
        let host = tls.as_ref().map_or(host, |tls| tls.hostname);
        let client_id = format!("dialogue-engine-{}", Uuid::new_v4().simple());

        let mut client_options = rumqttc::MqttOptions::new(client_id, host, port);
        client_options.set_keep_alive(self.keep_alive);
        if let Some(username) = &options.username {
            client_options.set_credentials(
                username.as_str(),
                options.password.as_deref().unwrap_or_default(),
            );
        }
        if let Some(tls) = &tls {
            client_options.set_transport(tls_transport(tls)?);
        }
        Ok(client_options)
    }
}

impl Connector for MqttConnector {
    fn connect(
        &self,
        options: &MqttOptions,
        inbound: UnboundedSender<Envelope>,
    ) -> DialogueResult<Box<dyn Transport>> {
        let client_options = self.client_options(options)?;
        let (client, mut connection) = Client::new(client_options, self.capacity);
        wait_for_connack(&mut connection, &options.broker_address)?;
        info!(broker = %options.broker_address, tls = options.tls().is_some(), "connected");

        let filters = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let network = thread::Builder::new().name("mqtt-network".to_string()).spawn({
            let client = client.clone();
            let filters = Arc::clone(&filters);
            let connected = Arc::clone(&connected);
            move || run_network(connection, client, inbound, filters, connected)
        })?;

        Ok(Box::new(MqttTransport {
            client,
            filters,
            connected,
            network: Mutex::new(Some(network)),
        }))
    }
}

fn wait_for_connack(connection: &mut Connection, address: &str) -> DialogueResult<()> {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(err) => {
                return Err(DialogueError::Connection(format!("{address}: {err}")));
            }
        }
    }
    Err(DialogueError::Connection(format!(
        "{address}: connection closed before the broker answered"
    )))
}

/// Body of the network thread
///
/// Runs until the transport disconnects or the engine stops listening.
/// Subscriptions are replayed after every reconnection.
fn run_network(
    mut connection: Connection,
    client: Client,
    inbound: UnboundedSender<Envelope>,
    filters: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let envelope = Envelope {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if inbound.send(envelope).is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("reconnected to broker");
                let filters = match filters.lock() {
                    Ok(filters) => filters.clone(),
                    Err(_) => break,
                };
                for filter in filters {
                    if let Err(err) = client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
                        warn!(filter = %filter, error = %err, "can't restore subscription");
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(err) => {
                if !connected.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %err, "connection to broker lost, retrying");
                thread::sleep(RETRY_DELAY);
            }
        }
    }
    debug!("network thread stopped");
}

struct MqttTransport {
    client: Client,
    filters: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
    network: Mutex<Option<JoinHandle<()>>>,
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> DialogueResult<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(DialogueError::publish(topic, "not connected"));
        }
        let size = payload.len();
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| DialogueError::publish(topic, e.to_string()))?;
        debug!(topic, size, "published");
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> DialogueResult<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(DialogueError::Connection("not connected".to_string()));
        }
        self.client
            .subscribe(filter, QoS::AtMostOnce)
            .map_err(|e| DialogueError::Connection(format!("can't subscribe to `{filter}`: {e}")))?;
        let mut filters = self.filters.lock()?;
        if !filters.iter().any(|f| f == filter) {
            filters.push(filter.to_string());
        }
        debug!(filter, "subscribed");
        Ok(())
    }

    fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.client.disconnect() {
            debug!(error = %err, "disconnect request not sent");
        }
        let network = self.network.lock().ok().and_then(|mut handle| handle.take());
        if let Some(network) = network {
            if network.join().is_err() {
                warn!("network thread panicked");
            }
        }
        info!("disconnected");
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Build the TLS transport for `tls`
///
/// Configured CA certificates replace the platform root store. Without any,
/// the platform roots are used unless disabled.
fn tls_transport(tls: &TlsOptions<'_>) -> DialogueResult<rumqttc::Transport> {
    let client_auth = client_auth(tls)?;
    match ca_bundle(tls)? {
        Some(ca) => Ok(rumqttc::Transport::tls_with_config(
            TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth,
            },
        )),
        None if tls.disable_root_store => Err(DialogueError::Connection(
            "TLS needs a CA certificate when the root store is disabled".to_string(),
        )),
        None if client_auth.is_some() => Err(DialogueError::Config(
            "a TLS client certificate needs a CA certificate".to_string(),
        )),
        None => Ok(rumqttc::Transport::tls_with_default_config()),
    }
}

/// Every configured CA certificate as one PEM bundle, `None` when there are none
fn ca_bundle(tls: &TlsOptions<'_>) -> DialogueResult<Option<Vec<u8>>> {
    let mut files: Vec<std::path::PathBuf> =
        tls.ca_file.iter().map(std::path::PathBuf::from).collect();
    for dir in tls.ca_path {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| DialogueError::Connection(format!("can't read CA path {dir}: {e}")))?;
        let mut certificates: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext == "pem" || ext == "crt")
            })
            .collect();
        certificates.sort();
        files.extend(certificates);
    }

    if files.is_empty() {
        return Ok(None);
    }
    let mut bundle = Vec::new();
    for file in &files {
        bundle.extend(read_pem(file)?);
        if !bundle.ends_with(b"\n") {
            bundle.push(b'\n');
        }
    }
    Ok(Some(bundle))
}

fn client_auth(tls: &TlsOptions<'_>) -> DialogueResult<Option<(Vec<u8>, Vec<u8>)>> {
    match (tls.client_cert, tls.client_key) {
        (Some(cert), Some(key)) => Ok(Some((read_pem(Path::new(cert))?, read_pem(Path::new(key))?))),
        (None, None) => Ok(None),
        _ => Err(DialogueError::Config(
            "tls_client_cert and tls_client_key must be set together".to_string(),
        )),
    }
}

fn read_pem(path: &Path) -> DialogueResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| DialogueError::Connection(format!("can't read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn tls_options(hostname: &str) -> MqttOptions {
        let mut options = MqttOptions::new("broker.example:8883");
        options.tls_hostname = Some(hostname.to_string());
        options
    }

    #[test]
    fn test_ca_bundle_reads_files_then_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.crt"), "B").unwrap();
        std::fs::write(dir.path().join("a.pem"), "A\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a certificate").unwrap();
        let extra = dir.path().join("extra.pem");
        std::fs::write(&extra, "EXTRA").unwrap();
        let nested = tempfile::tempdir().unwrap();
        std::fs::write(nested.path().join("c.pem"), "C").unwrap();

        let mut options = tls_options("broker.example");
        options.tls_ca_file = Some(vec![extra.display().to_string()]);
        options.tls_ca_path = Some(vec![nested.path().display().to_string()]);
        let bundle = ca_bundle(&options.tls().unwrap()).unwrap().unwrap();
        assert_eq!(bundle, b"EXTRA\nC\n");

        options.tls_ca_file = None;
        options.tls_ca_path = Some(vec![dir.path().display().to_string()]);
        let bundle = ca_bundle(&options.tls().unwrap()).unwrap().unwrap();
        assert_eq!(bundle, b"A\nB\nEXTRA\n");
    }

    #[test]
    fn test_missing_ca_file_is_a_connection_error() {
        let mut options = tls_options("broker.example");
        options.tls_ca_file = Some(vec!["/nonexistent/ca.pem".to_string()]);
        assert!(matches!(
            ca_bundle(&options.tls().unwrap()),
            Err(DialogueError::Connection(_))
        ));
    }

    #[test]
    fn test_client_auth_needs_cert_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("client.pem");
        let key = dir.path().join("client.key");
        std::fs::write(&cert, "CERT").unwrap();
        std::fs::write(&key, "KEY").unwrap();

        let mut options = tls_options("broker.example");
        options.tls_client_cert = Some(cert.display().to_string());
        assert!(matches!(
            client_auth(&options.tls().unwrap()),
            Err(DialogueError::Config(_))
        ));

        options.tls_client_key = Some(key.display().to_string());
        let (cert, key) = client_auth(&options.tls().unwrap()).unwrap().unwrap();
        assert_eq!(cert, b"CERT");
        assert_eq!(key, b"KEY");
    }

    #[test]
    fn test_disabled_root_store_needs_a_ca() {
        let mut options = tls_options("broker.example");
        options.tls_disable_root_store = true;
        assert!(matches!(
            tls_transport(&options.tls().unwrap()),
            Err(DialogueError::Connection(_))
        ));
    }

    #[test]
    fn test_tls_settings_are_checked_before_dialing() {
        let mut options = tls_options("broker.example");
        options.tls_ca_file = Some(vec!["/nonexistent/ca.pem".to_string()]);
        options.tls_client_cert = Some("/nonexistent/cert.pem".to_string());
        options.tls_client_key = Some("/nonexistent/key.pem".to_string());
        let (sink, _inbound) = unbounded_channel();

        let result = MqttConnector::default().connect(&options, sink);
        assert!(matches!(result, Err(DialogueError::Connection(_))));
    }

    #[test]
    fn test_unreachable_broker_is_a_connection_error() {
        let (sink, _inbound) = unbounded_channel();
        let result = MqttConnector::default().connect(&MqttOptions::new("127.0.0.1:1"), sink);
        assert!(matches!(result, Err(DialogueError::Connection(_))));
    }
}
