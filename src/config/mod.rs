//! Engine configuration
//!
//! Settings come from built-in defaults, then an optional TOML file, then
//! `DIALOGUE_`-prefixed environment variables (`__` separates nested keys,
//! e.g. `DIALOGUE_MQTT__BROKER_ADDRESS`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DialogueError, DialogueResult};

/// Connection parameters for the message bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MqttOptions {
    /// Broker address as `host:port`
    pub broker_address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Enables TLS when set; the hostname checked against the broker certificate
    pub tls_hostname: Option<String>,
    /// CA certificate files
    pub tls_ca_file: Option<Vec<String>>,
    /// Directories holding CA certificates
    pub tls_ca_path: Option<Vec<String>>,
    /// Client private key file
    pub tls_client_key: Option<String>,
    /// Client certificate file
    pub tls_client_cert: Option<String>,
    /// Don't load the platform root certificates
    pub tls_disable_root_store: bool,
}

impl Default for MqttOptions {
    fn default() -> Self {
        Self {
            broker_address: "localhost:1883".to_string(),
            username: None,
            password: None,
            tls_hostname: None,
            tls_ca_file: None,
            tls_ca_path: None,
            tls_client_key: None,
            tls_client_cert: None,
            tls_disable_root_store: false,
        }
    }
}

/// TLS parameters, present only when a TLS hostname is configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions<'a> {
    pub hostname: &'a str,
    pub ca_file: &'a [String],
    pub ca_path: &'a [String],
    pub client_key: Option<&'a str>,
    pub client_cert: Option<&'a str>,
    pub disable_root_store: bool,
}

impl MqttOptions {
    pub fn new(broker_address: impl Into<String>) -> Self {
        Self {
            broker_address: broker_address.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn tls(&self) -> Option<TlsOptions<'_>> {
        let hostname = self.tls_hostname.as_deref()?;
        Some(TlsOptions {
            hostname,
            ca_file: self.tls_ca_file.as_deref().unwrap_or_default(),
            ca_path: self.tls_ca_path.as_deref().unwrap_or_default(),
            client_key: self.tls_client_key.as_deref(),
            client_cert: self.tls_client_cert.as_deref(),
            disable_root_store: self.tls_disable_root_store,
        })
    }

    /// Split the broker address into host and port
    pub fn host_port(&self) -> DialogueResult<(&str, u16)> {
        let invalid = || {
            DialogueError::Config(format!(
                "broker address `{}` is not host:port",
                self.broker_address
            ))
        };
        let (host, port) = self.broker_address.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok((host, port))
    }
}

/// Settings of one engine connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub mqtt: MqttOptions,
    /// Use the JSON topic family and encoding instead of the structured one
    pub use_json_api: bool,
    /// Run the session state machine in this engine; otherwise only dispatch
    pub manage_sessions: bool,
    /// Site used by start requests that don't name one
    pub default_site_id: String,
    /// Install the tracing subscriber on connect
    pub logs_enabled: bool,
    /// Filter directives used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Number of ended sessions kept for queries
    pub ended_session_history: usize,
    /// Treat intents without a handler on this connection as not recognized
    pub require_intent_handler: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttOptions::default(),
            use_json_api: false,
            manage_sessions: true,
            default_site_id: "default".to_string(),
            logs_enabled: false,
            log_filter: "info".to_string(),
            ended_session_history: 64,
            require_intent_handler: true,
        }
    }
}

impl EngineConfig {
    /// Load the configuration, layering defaults, `path` and the environment
    pub fn load(path: Option<&Path>) -> DialogueResult<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(EngineConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(DialogueError::Config(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: EngineConfig = figment
            .merge(Env::prefixed("DIALOGUE_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DialogueResult<()> {
        self.mqtt.host_port()?;
        if self.default_site_id.is_empty() {
            return Err(DialogueError::Config(
                "default_site_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_json_api(mut self) -> Self {
        self.use_json_api = true;
        self
    }

    pub fn with_mqtt(mut self, mqtt: MqttOptions) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Accept intents for which no handler is registered on this connection,
    /// for a dialogue manager serving skills connected elsewhere
    pub fn without_local_handlers(mut self) -> Self {
        self.require_intent_handler = false;
        self
    }

    /// Only dispatch events, leave session management to another engine
    pub fn without_session_management(mut self) -> Self {
        self.manage_sessions = false;
        self
    }
}
