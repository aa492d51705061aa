use std::collections::HashMap;
use std::sync::Arc;

use mqtt_driver::data_mgmt::models::DeviceRecord;
use mqtt_driver::script::{ScriptEngine, ScriptError, Transform};
use serde_json::Value;

/// Engine whose "scripts" are names of canned transforms
#[derive(Default)]
pub struct CannedScripts(HashMap<String, Arc<dyn Transform>>);

impl CannedScripts {
    pub fn with<F>(mut self, name: &str, transform: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Vec<DeviceRecord>, ScriptError> + Send + Sync + 'static,
    {
        self.0.insert(name.to_string(), Arc::new(transform));
        self
    }

    /// Script that always returns `records`
    pub fn returning(self, name: &str, records: Value) -> Self {
        self.with(name, move |_, _| {
            mqtt_driver::script::records_from_json(records.clone())
        })
    }
}

impl ScriptEngine for CannedScripts {
    fn compile(&self, source: &str) -> Result<Arc<dyn Transform>, ScriptError> {
        self.0
            .get(source)
            .cloned()
            .ok_or_else(|| ScriptError::Compile(format!("unknown script '{source}'")))
    }
}
