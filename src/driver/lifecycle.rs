use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::options::{DriverOptions, DRIVER_OPTIONS};
use super::subscription::TableSubscription;
use super::SCHEMA;
use crate::config::{self, ConfigError, DriverInstanceConfig};
use crate::data_mgmt::sink::{PointSender, PointSink, SinkWorker};
use crate::interfaces::mqtt::{BrokerConnection, Connector, MqttError, RumqttConnector};
use crate::script::{JsonataEngine, ScriptEngine};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mqtt(#[from] MqttError),
    #[error("failed to start sink worker: {0}")]
    SinkWorker(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

pub struct MqttDriver {
    options: DriverOptions,
    connector: Arc<dyn Connector>,
    engine: Arc<dyn ScriptEngine>,
    sink: Arc<dyn PointSink>,
    state: DriverState,
    connection: Option<Box<dyn BrokerConnection>>,
    worker: Option<SinkWorker>,
    subscriptions: BTreeMap<String, TableSubscription>,
}

impl MqttDriver {
    /// Driver talking to a real broker, with JSONata parse scripts
    pub fn new(sink: Arc<dyn PointSink>) -> Self {
        let options = DRIVER_OPTIONS.clone();
        let connector = Arc::new(RumqttConnector::new(options.connect.clone()));
        Self::with_parts(options, connector, Arc::new(JsonataEngine), sink)
    }

    pub fn with_parts(
        options: DriverOptions,
        connector: Arc<dyn Connector>,
        engine: Arc<dyn ScriptEngine>,
        sink: Arc<dyn PointSink>,
    ) -> Self {
        Self {
            options,
            connector,
            engine,
            sink,
            state: DriverState::Stopped,
            connection: None,
            worker: None,
            subscriptions: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn service_id(&self) -> &str {
        &self.options.service_id
    }

    /// Ids of the tables that currently hold a subscription
    pub fn subscribed_tables(&self) -> Vec<&str> {
        self.subscriptions.keys().map(String::as_str).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// (Re)start the driver from a raw configuration document
    ///
    /// Whatever was running before is stopped first. Per-table problems are logged and only
    /// cost that table; an `Err` means nothing was started and the driver is `Stopped`.
    pub fn start(&mut self, config_raw: &str) -> Result<(), DriverError> {
        self.stop();
        self.state = DriverState::Starting;
        log::info!("Driver starting");
        log::debug!("Driver config: {}", config_raw);

        match self.try_start(config_raw) {
            Ok(()) => {
                self.state = DriverState::Running;
                log::info!(
                    "Driver started with {} subscribed table(s)",
                    self.subscriptions.len()
                );
                Ok(())
            }
            Err(e) => {
                log::error!("Driver start failed: {}", e);
                self.stop();
                Err(e)
            }
        }
    }

    fn try_start(&mut self, config_raw: &str) -> Result<(), DriverError> {
        let config = config::from_str(config_raw)?;
        if config.tables.is_empty() {
            log::warn!("No tables use driver instance '{}'; staying idle", config.id);
            return Ok(());
        }

        let settings = config
            .settings()
            .filter(|s| s.server.as_deref().is_some_and(|server| !server.is_empty()))
            .ok_or(ConfigError::MissingServer)?;

        let worker = SinkWorker::spawn(
            self.sink.clone(),
            self.options.sink_queue_size,
            self.options.sink_send_timeout,
        )?;
        let mut connection = self.connector.connect(settings, &self.options.client_id())?;

        if let Some(sender) = worker.sender() {
            self.subscribe_tables(&config, connection.as_mut(), &sender);
        }

        connection.start_delivery()?;
        self.connection = Some(connection);
        self.worker = Some(worker);
        self.sink.ready();
        Ok(())
    }

    fn subscribe_tables(
        &mut self,
        config: &DriverInstanceConfig,
        connection: &mut dyn BrokerConnection,
        sender: &PointSender,
    ) {
        for table in config.tables.iter() {
            if self.subscriptions.contains_key(&table.id) {
                log::warn!("Duplicate table id '{}'; ignoring repeat", table.id);
                continue;
            }
            let activated =
                TableSubscription::activate(table, config.config.as_ref(), self.engine.as_ref());
            let mut subscription = match activated {
                Ok(Some(subscription)) => subscription,
                Ok(None) => continue,
                Err(e) => {
                    log::error!("Failed to activate table '{}': {}", table.id, e);
                    continue;
                }
            };
            match subscription.subscribe(connection, sender.clone()) {
                Ok(()) => {
                    self.subscriptions.insert(table.id.clone(), subscription);
                }
                Err(e) => log::error!("Failed to subscribe table '{}': {}", table.id, e),
            }
        }
    }

    /// Halt delivery, close the connection and forget all subscriptions
    ///
    /// Safe to call in any state, any number of times.
    pub fn stop(&mut self) {
        if self.state == DriverState::Stopped && self.connection.is_none() && self.worker.is_none()
        {
            return;
        }
        self.state = DriverState::Stopping;
        log::info!("Stopping driver");

        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.disconnect() {
                log::warn!("Error while disconnecting from broker: {}", e);
            }
        }
        self.subscriptions.clear();
        // Waits for points already queued to reach the sink
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }

        self.state = DriverState::Stopped;
        log::info!("Driver stopped");
    }

    pub fn schema(&self) -> &'static str {
        SCHEMA
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn http_proxy_enabled(&self) -> bool {
        false
    }

    pub fn run(
        &self,
        serial_no: &str,
        table_id: &str,
        device_id: &str,
        _command: &str,
    ) -> Option<Value> {
        log::debug!("Ignoring run {serial_no} for {table_id}/{device_id}");
        None
    }

    pub fn batch_run(
        &self,
        serial_no: &str,
        table_id: &str,
        device_ids: &[String],
        _command: &str,
    ) -> Option<Value> {
        log::debug!(
            "Ignoring batch run {serial_no} for {} device(s) of {table_id}",
            device_ids.len()
        );
        None
    }

    pub fn write_tag(
        &self,
        serial_no: &str,
        table_id: &str,
        device_id: &str,
        _tag: &str,
    ) -> Option<Value> {
        log::debug!("Ignoring tag write {serial_no} for {table_id}/{device_id}");
        None
    }

    pub fn debug(&self, _request: &str) -> Option<String> {
        None
    }
}

impl Drop for MqttDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::Settings;
    use crate::data_mgmt::models::Point;
    use crate::data_mgmt::sink::SinkError;
    use crate::interfaces::mqtt::MessageHandler;

    #[derive(Default)]
    struct Nowhere;

    impl PointSink for Nowhere {
        fn write_point(&self, _: &Point) -> Result<(), SinkError> {
            Ok(())
        }
    }

    struct NullConnection;

    impl BrokerConnection for NullConnection {
        fn subscribe(&mut self, _: &str, _: MessageHandler) -> Result<(), MqttError> {
            Ok(())
        }

        fn start_delivery(&mut self) -> Result<(), MqttError> {
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), MqttError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector(Mutex<Vec<String>>);

    impl Connector for CountingConnector {
        fn connect(
            &self,
            _: &Settings,
            client_id: &str,
        ) -> Result<Box<dyn BrokerConnection>, MqttError> {
            self.0.lock().unwrap().push(client_id.to_string());
            Ok(Box::new(NullConnection))
        }
    }

    fn driver(connector: Arc<CountingConnector>) -> MqttDriver {
        let options = DriverOptions {
            service_id: "unit".into(),
            ..Default::default()
        };
        MqttDriver::with_parts(options, connector, Arc::new(JsonataEngine), Arc::new(Nowhere))
    }

    const CONFIG: &str = r#"{
        "id": "drv",
        "config": {"settings": {"server": "tcp://broker:1883"}},
        "tables": [{
            "id": "T1",
            "config": {
                "settings": {"topic": "sensors/+", "parseScript": "payload"},
                "tags": [{"id": "t1", "key": "k1"}]
            },
            "devices": [{"id": "D1"}]
        }]
    }"#;

    #[test]
    fn start_then_stop() {
        let connector = Arc::new(CountingConnector::default());
        let mut driver = driver(connector.clone());

        driver.start(CONFIG).unwrap();
        assert_eq!(driver.state(), DriverState::Running);
        assert_eq!(driver.subscribed_tables(), vec!["T1"]);
        assert_eq!(*connector.0.lock().unwrap(), vec!["mqtt_driver_unit"]);

        driver.stop();
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(driver.subscribed_tables().is_empty());
        assert!(!driver.is_connected());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut driver = driver(Arc::new(CountingConnector::default()));
        driver.stop();
        driver.start(CONFIG).unwrap();
        driver.stop();
        driver.stop();
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[test]
    fn restart_rebuilds_everything() {
        let connector = Arc::new(CountingConnector::default());
        let mut driver = driver(connector.clone());

        driver.start(CONFIG).unwrap();
        driver.start(CONFIG).unwrap();

        assert_eq!(connector.0.lock().unwrap().len(), 2);
        assert_eq!(driver.subscribed_tables(), vec!["T1"]);
    }

    #[test]
    fn no_tables_stays_idle() {
        let connector = Arc::new(CountingConnector::default());
        let mut driver = driver(connector.clone());

        driver.start(r#"{"id": "drv", "tables": []}"#).unwrap();

        assert_eq!(driver.state(), DriverState::Running);
        assert!(!driver.is_connected());
        assert!(connector.0.lock().unwrap().is_empty());
    }

    #[test]
    fn unparseable_config_leaves_driver_stopped() {
        let mut driver = driver(Arc::new(CountingConnector::default()));
        let result = driver.start("{not json");
        assert!(matches!(result, Err(DriverError::Config(ConfigError::ParseJson(_)))));
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[test]
    fn missing_server_is_an_error() {
        let mut driver = driver(Arc::new(CountingConnector::default()));
        let result = driver.start(r#"{"tables": [{"id": "T1", "devices": [{"id": "D1"}]}]}"#);
        assert!(matches!(result, Err(DriverError::Config(ConfigError::MissingServer))));
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[test]
    fn metadata() {
        let driver = driver(Arc::new(CountingConnector::default()));
        assert!(!driver.http_proxy_enabled());
        assert_eq!(driver.version(), env!("CARGO_PKG_VERSION"));
        assert!(driver.schema().contains("parseScript"));
        assert!(driver.run("s", "T1", "D1", "{}").is_none());
        assert!(driver.batch_run("s", "T1", &["D1".into()], "{}").is_none());
        assert!(driver.write_tag("s", "T1", "D1", "t1").is_none());
        assert!(driver.debug("x").is_none());
    }
}
