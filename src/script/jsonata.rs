//! JSONata-backed transform scripts
//!
//! The expression is evaluated against:
//!
//! ```json
//! { "topic": "sensors/a", "payload": {"t": 21.5}, "raw": "{\"t\": 21.5}" }
//! ```
//!
//! `payload` holds the parsed JSON when the message body is valid JSON and the plain text
//! otherwise; `raw` always holds the text.

use std::sync::Arc;

use bumpalo::Bump;
use jsonata_rs::JsonAta;
use serde_json::{json, Value};

use super::{records_from_json, ScriptEngine, ScriptError, Transform};
use crate::data_mgmt::models::DeviceRecord;

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonataEngine;

impl ScriptEngine for JsonataEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn Transform>, ScriptError> {
        let arena = Bump::new();
        JsonAta::new(source, &arena).map_err(|e| ScriptError::Compile(e.to_string()))?;
        Ok(Arc::new(JsonataTransform {
            expression: source.to_string(),
        }))
    }
}

/// Holds the source only; the parsed form borrows a per-call arena
struct JsonataTransform {
    expression: String,
}

impl Transform for JsonataTransform {
    fn apply(&self, topic: &str, payload: &str) -> Result<Vec<DeviceRecord>, ScriptError> {
        let input = script_input(topic, payload).to_string();

        let arena = Bump::new();
        let jsonata = JsonAta::new(&self.expression, &arena)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;
        let result = jsonata
            .evaluate(Some(&input), None)
            .map_err(|e| ScriptError::Evaluate(e.to_string()))?;

        if result.is_undefined() || result.is_null() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_str(&result.serialize(false))
            .map_err(|e| ScriptError::InvalidResult(e.to_string()))?;
        records_from_json(value)
    }
}

fn script_input(topic: &str, payload: &str) -> Value {
    let parsed = serde_json::from_str::<Value>(payload).unwrap_or_else(|_| json!(payload));
    json!({
        "topic": topic,
        "payload": parsed,
        "raw": payload,
    })
}
