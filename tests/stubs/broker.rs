use std::sync::{Arc, Mutex};

use mqtt_driver::config::Settings;
use mqtt_driver::interfaces::mqtt::{
    topic_matches, BrokerConnection, Connector, MessageHandler, MqttError, MqttMessage,
};

/// In-process stand-in for a broker; `publish` delivers synchronously to matching handlers
#[derive(Default)]
pub struct StubBroker {
    routes: Mutex<Vec<(String, MessageHandler)>>,
    delivering: Mutex<bool>,
    connects: Mutex<Vec<(Settings, String)>>,
}

impl StubBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, topic: &str, payload: &str) -> usize {
        if !*self.delivering.lock().unwrap() {
            return 0;
        }
        let handlers: Vec<MessageHandler> = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, handler)| handler.clone())
            .collect();
        let message = MqttMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        };
        for handler in handlers.iter() {
            handler(&message);
        }
        handlers.len()
    }

    pub fn filters(&self) -> Vec<String> {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .map(|(filter, _)| filter.clone())
            .collect()
    }

    pub fn connects(&self) -> Vec<(Settings, String)> {
        self.connects.lock().unwrap().clone()
    }

    pub fn is_delivering(&self) -> bool {
        *self.delivering.lock().unwrap()
    }
}

pub struct StubConnector(pub Arc<StubBroker>);

impl Connector for StubConnector {
    fn connect(
        &self,
        settings: &Settings,
        client_id: &str,
    ) -> Result<Box<dyn BrokerConnection>, MqttError> {
        self.0
            .connects
            .lock()
            .unwrap()
            .push((settings.clone(), client_id.to_string()));
        Ok(Box::new(StubConnection(self.0.clone())))
    }
}

struct StubConnection(Arc<StubBroker>);

impl BrokerConnection for StubConnection {
    fn subscribe(&mut self, filter: &str, handler: MessageHandler) -> Result<(), MqttError> {
        self.0
            .routes
            .lock()
            .unwrap()
            .push((filter.to_string(), handler));
        Ok(())
    }

    fn start_delivery(&mut self) -> Result<(), MqttError> {
        *self.0.delivering.lock().unwrap() = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), MqttError> {
        *self.0.delivering.lock().unwrap() = false;
        self.0.routes.lock().unwrap().clear();
        Ok(())
    }
}
