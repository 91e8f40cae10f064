//! Topic routing and the message bus

pub mod bus;
pub mod mqtt;
pub mod topics;

pub use bus::{Connector, Envelope, InProcessBroker, Transport, topic_matches};
pub use mqtt::MqttConnector;
pub use topics::{Topic, TopicRouter};
