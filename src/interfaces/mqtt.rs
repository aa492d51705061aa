use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use rumqttc::{Client, ConnAck, Connection, Event, MqttOptions, Packet, QoS};
use thiserror::Error;
use url::Url;

use crate::config::Settings;
use crate::constants::defaults;
use crate::helpers::reconnect_backoff;

#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum MqttError {
    #[error(transparent)]
    MqttClient(#[from] rumqttc::ClientError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid broker address '{0}': {1}")]
    InvalidAddress(String, String),
    #[error("no broker address configured")]
    MissingServer,
    #[error("delivery already started")]
    DeliveryStarted,
}

pub type MessageHandler = Arc<dyn Fn(&MqttMessage) + Send + Sync>;

/// An established broker session shared by all tables of one driver instance
pub trait BrokerConnection: Send {
    /// Route messages matching `filter` to `handler`
    fn subscribe(&mut self, filter: &str, handler: MessageHandler) -> Result<(), MqttError>;

    /// Begin network I/O and message delivery on a background thread
    fn start_delivery(&mut self) -> Result<(), MqttError>;

    /// Stop delivery and drop every registered handler
    fn disconnect(&mut self) -> Result<(), MqttError>;
}

pub trait Connector: Send + Sync {
    fn connect(
        &self,
        settings: &Settings,
        client_id: &str,
    ) -> Result<Box<dyn BrokerConnection>, MqttError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Accepts `host`, `host:port`, `tcp://host:port` or `mqtt://host:port`
    pub fn parse(server: &str) -> Result<Self, MqttError> {
        let server = server.trim();
        if server.is_empty() {
            return Err(MqttError::MissingServer);
        }
        let with_scheme = if server.contains("://") {
            server.to_string()
        } else {
            format!("tcp://{server}")
        };
        let invalid = |reason: String| MqttError::InvalidAddress(server.to_string(), reason);

        let url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "tcp" | "mqtt" => (),
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        }
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(invalid("missing host".to_string())),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(defaults::MQTT_PORT),
        })
    }
}

/// MQTT 3.1.1 wildcard matching of a concrete topic against a subscription filter
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    // Wildcards in the first level never match topics starting with '$'
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => (),
            (Some(f), Some(t)) if f == t => (),
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub request_capacity: usize,
    pub reconnect_min_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            keep_alive: defaults::MQTT_KEEP_ALIVE,
            clean_session: true,
            request_capacity: defaults::MQTT_REQUEST_CAPACITY,
            reconnect_min_delay: defaults::RECONNECT_MIN_DELAY,
            reconnect_max_delay: defaults::RECONNECT_MAX_DELAY,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RumqttConnector {
    options: ConnectOptions,
}

impl RumqttConnector {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }
}

impl Connector for RumqttConnector {
    fn connect(
        &self,
        settings: &Settings,
        client_id: &str,
    ) -> Result<Box<dyn BrokerConnection>, MqttError> {
        let server = settings.server.as_deref().ok_or(MqttError::MissingServer)?;
        let address = BrokerAddress::parse(server)?;
        log::info!(
            "Establishing MQTT connection to {}:{} as {}",
            address.host,
            address.port,
            client_id
        );

        let mut mqttoptions = MqttOptions::new(client_id, address.host, address.port);
        mqttoptions.set_keep_alive(self.options.keep_alive);
        mqttoptions.set_clean_session(self.options.clean_session);
        if let Some(username) = &settings.username {
            mqttoptions.set_credentials(
                username.clone(),
                settings.password.clone().unwrap_or_default(),
            );
        }

        let (client, connection) = Client::new(mqttoptions, self.options.request_capacity);
        Ok(Box::new(RumqttConnection {
            client,
            connection: Some(connection),
            routes: Routes::default(),
            stop_tx: None,
            options: self.options.clone(),
        }))
    }
}

#[derive(Clone, Default)]
struct Routes(Arc<RwLock<Vec<(String, MessageHandler)>>>);

impl Routes {
    fn add(&self, filter: &str, handler: MessageHandler) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((filter.to_string(), handler));
    }

    fn filters(&self) -> Vec<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(filter, _)| filter.clone())
            .collect()
    }

    fn clear(&self) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Handlers run outside the lock so a slow handler never blocks `subscribe`/`clear`
    fn dispatch(&self, message: &MqttMessage) -> usize {
        let handlers: Vec<MessageHandler> = self
            .0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(filter, _)| topic_matches(filter, &message.topic))
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers.iter() {
            handler(message);
        }
        handlers.len()
    }
}

/// Filters to subscribe again after a ConnAck; none when the broker resumed the session
fn filters_to_reissue(connack: &ConnAck, routes: &Routes) -> Vec<String> {
    if connack.session_present {
        return Vec::new();
    }
    routes.filters()
}

/// Receiving end of the stop request sent by `disconnect`
struct StopSignal(flume::Receiver<()>);

impl StopSignal {
    fn is_set(&self) -> bool {
        !self.0.is_empty() || self.0.is_disconnected()
    }

    /// Sleep for `delay` unless a stop arrives first; true if stopped
    fn wait(&self, delay: Duration) -> bool {
        match self.0.recv_timeout(delay) {
            Ok(()) => true,
            Err(flume::RecvTimeoutError::Disconnected) => true,
            Err(flume::RecvTimeoutError::Timeout) => false,
        }
    }
}

/// Wait out the next reconnect delay; true if a stop arrived meanwhile
fn wait_before_retry(
    backoff: &mut ExponentialBackoff,
    max_delay: Duration,
    stop: &StopSignal,
) -> bool {
    let delay = backoff.next_backoff().unwrap_or(max_delay);
    log::info!("Reconnecting to MQTT broker in {:?}", delay);
    stop.wait(delay)
}

struct RumqttConnection {
    client: Client,
    connection: Option<Connection>,
    routes: Routes,
    stop_tx: Option<flume::Sender<()>>,
    options: ConnectOptions,
}

impl BrokerConnection for RumqttConnection {
    fn subscribe(&mut self, filter: &str, handler: MessageHandler) -> Result<(), MqttError> {
        self.routes.add(filter, handler);
        // Before delivery starts, subscriptions are sent on the first ConnAck
        if self.connection.is_none() {
            log::info!("Subscribing to {}", filter);
            self.client.subscribe(filter, QoS::AtMostOnce)?;
        }
        Ok(())
    }

    fn start_delivery(&mut self) -> Result<(), MqttError> {
        let connection = self.connection.take().ok_or(MqttError::DeliveryStarted)?;
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let delivery = Delivery {
            client: self.client.clone(),
            routes: self.routes.clone(),
            stop: StopSignal(stop_rx),
            options: self.options.clone(),
        };
        thread::Builder::new()
            .name("mqtt-delivery".to_string())
            .spawn(move || delivery.run(connection))?;
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), MqttError> {
        self.routes.clear();
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
            self.client.try_disconnect()?;
        }
        Ok(())
    }
}

impl Drop for RumqttConnection {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::debug!("MQTT disconnect on drop failed: {}", e);
        }
    }
}

struct Delivery {
    client: Client,
    routes: Routes,
    stop: StopSignal,
    options: ConnectOptions,
}

impl Delivery {
    fn run(self, mut connection: Connection) {
        let mut backoff =
            reconnect_backoff(self.options.reconnect_min_delay, self.options.reconnect_max_delay);

        for notification in connection.iter() {
            if self.stop.is_set() {
                break;
            }
            log::trace!("Notification = {:?}", notification);
            match notification {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = MqttMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    };
                    if self.routes.dispatch(&message) == 0 {
                        log::debug!("No handler for message on '{}'", message.topic);
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    log::info!("MQTT connection established");
                    backoff.reset();
                    self.on_connack(&connack);
                }
                Ok(_) => (),
                Err(e) => {
                    log::error!("MQTT connection error: {}", e);
                    if wait_before_retry(&mut backoff, self.options.reconnect_max_delay, &self.stop)
                    {
                        break;
                    }
                }
            }
        }
        log::debug!("MQTT delivery thread exiting");
    }

    /// Re-issue every subscription unless the broker resumed our session
    fn on_connack(&self, connack: &ConnAck) {
        let filters = filters_to_reissue(connack, &self.routes);
        if filters.is_empty() {
            return;
        }
        // Subscribing blocks when the request queue is full, and this thread is its consumer
        let client = self.client.clone();
        let spawned = thread::Builder::new()
            .name("mqtt-subscribe".to_string())
            .spawn(move || {
                for filter in filters {
                    log::info!("Subscribing to {}", filter);
                    if let Err(e) = client.subscribe(&filter, QoS::AtMostOnce) {
                        log::error!("Failed to subscribe to {}: {}", filter, e);
                    }
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn subscribe thread: {}", e);
        }
    }
}
