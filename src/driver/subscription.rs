use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, DriverConfig, ResolvedDevice, Table};
use crate::data_mgmt::pipeline::MessagePipeline;
use crate::data_mgmt::sink::PointSender;
use crate::data_mgmt::tag_index::TagIndex;
use crate::interfaces::mqtt::{BrokerConnection, MessageHandler, MqttError, MqttMessage};
use crate::script::{ScriptEngine, ScriptError, Transform};

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Mqtt(#[from] MqttError),
    #[error("table '{0}' is already subscribed")]
    AlreadySubscribed(String),
}

/// One table's topic subscription and the pipeline behind it
pub struct TableSubscription {
    topic: String,
    pipeline: Arc<MessagePipeline>,
    command: Option<Arc<dyn Transform>>,
    subscribed: bool,
}

impl TableSubscription {
    /// Prepare a table for subscription
    ///
    /// Returns `Ok(None)` when the table has no devices or no topic; such a table is
    /// skipped rather than treated as an error.
    pub fn activate(
        table: &Table,
        instance: Option<&DriverConfig>,
        engine: &dyn ScriptEngine,
    ) -> Result<Option<Self>, SubscriptionError> {
        log::info!("Activating table '{}'", table.id);

        let mut table = table.clone();
        table.inherit(instance);

        if table.devices.is_empty() {
            log::warn!("Table '{}' has no devices; not subscribing", table.id);
            return Ok(None);
        }
        let Some(topic) = table.topic().map(str::to_string) else {
            log::warn!("Table '{}' has no topic configured; not subscribing", table.id);
            return Ok(None);
        };

        let settings = table.settings().cloned().unwrap_or_default();
        let parse_source = non_empty(settings.parse_script.as_deref())
            .ok_or(ScriptError::Missing("parse script"))?;
        let transform = engine.compile(parse_source)?;
        let command = non_empty(settings.command_script.as_deref())
            .map(|source| engine.compile(source))
            .transpose()?;

        let devices = table
            .devices
            .iter()
            .map(|device| device.resolve(table.config.as_ref()))
            .collect::<Result<Vec<ResolvedDevice>, ConfigError>>()?;
        let index = TagIndex::build(&table.id, &devices);
        log::info!(
            "Table '{}': {} of {} devices routable on '{}'",
            table.id,
            index.len(),
            devices.len(),
            topic
        );

        Ok(Some(Self {
            topic,
            pipeline: Arc::new(MessagePipeline::new(table.id, transform, index)),
            command,
            subscribed: false,
        }))
    }

    pub fn table_id(&self) -> &str {
        self.pipeline.table_id()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    pub fn has_command_script(&self) -> bool {
        self.command.is_some()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Register this table's pipeline for its topic on the shared connection
    pub fn subscribe(
        &mut self,
        connection: &mut dyn BrokerConnection,
        sender: PointSender,
    ) -> Result<(), SubscriptionError> {
        if self.subscribed {
            return Err(SubscriptionError::AlreadySubscribed(
                self.table_id().to_string(),
            ));
        }

        log::info!("Table '{}': subscribing to '{}'", self.table_id(), self.topic);
        let pipeline = self.pipeline.clone();
        let handler: MessageHandler = Arc::new(move |message: &MqttMessage| {
            pipeline.handle(&message.topic, &message.payload, &sender)
        });
        connection.subscribe(&self.topic, handler)?;
        self.subscribed = true;
        Ok(())
    }
}

fn non_empty(source: Option<&str>) -> Option<&str> {
    source.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data_mgmt::models::DeviceRecord;

    struct Closures;

    impl ScriptEngine for Closures {
        fn compile(&self, source: &str) -> Result<Arc<dyn Transform>, ScriptError> {
            if source == "broken" {
                return Err(ScriptError::Compile(source.to_string()));
            }
            let transform = |_: &str, _: &str| Ok(Vec::<DeviceRecord>::new());
            Ok(Arc::new(transform))
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl BrokerConnection for Recorder {
        fn subscribe(&mut self, filter: &str, _: MessageHandler) -> Result<(), MqttError> {
            self.0.push(filter.to_string());
            Ok(())
        }

        fn start_delivery(&mut self) -> Result<(), MqttError> {
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), MqttError> {
            Ok(())
        }
    }

    fn table(value: serde_json::Value) -> Table {
        serde_json::from_value(value).unwrap()
    }

    fn sender() -> (crate::data_mgmt::sink::SinkWorker, PointSender) {
        let sink = Arc::new(crate::data_mgmt::sink::JsonLinesSink::new(Vec::new()));
        let worker = crate::data_mgmt::sink::SinkWorker::spawn(
            sink,
            4,
            std::time::Duration::from_millis(10),
        )
        .unwrap();
        let sender = worker.sender().unwrap();
        (worker, sender)
    }

    fn basic_table() -> Table {
        table(json!({
            "id": "T1",
            "config": {
                "settings": {"topic": "sensors/+", "parseScript": "ok"},
                "tags": [{"id": "t1", "key": "k1"}]
            },
            "devices": [{"id": "D1"}]
        }))
    }

    #[test]
    fn activate_builds_index_from_merged_devices() {
        let sub = TableSubscription::activate(&basic_table(), None, &Closures)
            .unwrap()
            .unwrap();

        assert_eq!(sub.table_id(), "T1");
        assert_eq!(sub.topic(), "sensors/+");
        assert_eq!(sub.pipeline().index().device("D1").unwrap().len(), 1);
        assert!(!sub.has_command_script());
    }

    #[test]
    fn table_without_devices_is_skipped() {
        let empty = table(json!({
            "id": "T2",
            "config": {"settings": {"topic": "a", "parseScript": "ok"}},
            "devices": []
        }));
        assert!(TableSubscription::activate(&empty, None, &Closures)
            .unwrap()
            .is_none());
    }

    #[test]
    fn table_without_topic_is_skipped() {
        let no_topic = table(json!({
            "id": "T3",
            "config": {"settings": {"topic": "", "parseScript": "ok"}},
            "devices": [{"id": "D1"}]
        }));
        assert!(TableSubscription::activate(&no_topic, None, &Closures)
            .unwrap()
            .is_none());
    }

    #[test]
    fn topic_can_come_from_instance() {
        let instance: DriverConfig =
            serde_json::from_value(json!({"settings": {"topic": "inherited/#"}})).unwrap();
        let t = table(json!({
            "id": "T4",
            "config": {"settings": {"parseScript": "ok"}},
            "devices": [{"id": "D1"}]
        }));

        let sub = TableSubscription::activate(&t, Some(&instance), &Closures)
            .unwrap()
            .unwrap();
        assert_eq!(sub.topic(), "inherited/#");
    }

    #[test]
    fn missing_parse_script_fails_activation() {
        let t = table(json!({
            "id": "T5",
            "config": {"settings": {"topic": "a"}},
            "devices": [{"id": "D1"}]
        }));
        assert!(matches!(
            TableSubscription::activate(&t, None, &Closures),
            Err(SubscriptionError::Script(ScriptError::Missing(_)))
        ));
    }

    #[test]
    fn broken_command_script_fails_activation() {
        let t = table(json!({
            "id": "T6",
            "config": {"settings": {"topic": "a", "parseScript": "ok", "commandScript": "broken"}},
            "devices": [{"id": "D1"}]
        }));
        assert!(matches!(
            TableSubscription::activate(&t, None, &Closures),
            Err(SubscriptionError::Script(ScriptError::Compile(_)))
        ));
    }

    #[test]
    fn subscribe_twice_is_rejected() {
        let mut sub = TableSubscription::activate(&basic_table(), None, &Closures)
            .unwrap()
            .unwrap();
        let mut connection = Recorder::default();
        let (_worker, sender) = sender();

        sub.subscribe(&mut connection, sender.clone()).unwrap();
        let second = sub.subscribe(&mut connection, sender);

        assert!(matches!(second, Err(SubscriptionError::AlreadySubscribed(id)) if id == "T1"));
        assert_eq!(connection.0, vec!["sensors/+".to_string()]);
        assert!(sub.is_subscribed());
    }
}
