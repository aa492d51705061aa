//! Transform scripts
//!
//! A table's parse script turns one MQTT message into device records. The driver only
//! relies on the [`Transform`] call contract; [`ScriptEngine`] decides how source text
//! becomes a callable. [`JsonataEngine`] is the engine used by the binary.

mod jsonata;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::data_mgmt::models::DeviceRecord;

pub use jsonata::JsonataEngine;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("no {0} configured")]
    Missing(&'static str),
    #[error("failed to compile script: {0}")]
    Compile(String),
    #[error("script evaluation failed: {0}")]
    Evaluate(String),
    #[error("unexpected script result: {0}")]
    InvalidResult(String),
}

/// Compiled script: `(topic, payload) -> device records`
pub trait Transform: Send + Sync {
    fn apply(&self, topic: &str, payload: &str) -> Result<Vec<DeviceRecord>, ScriptError>;
}

impl<F> Transform for F
where
    F: Fn(&str, &str) -> Result<Vec<DeviceRecord>, ScriptError> + Send + Sync,
{
    fn apply(&self, topic: &str, payload: &str) -> Result<Vec<DeviceRecord>, ScriptError> {
        self(topic, payload)
    }
}

pub trait ScriptEngine: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn Transform>, ScriptError>;
}

/// Interpret a script result as device records
///
/// `null` means "nothing to report", a single object is one record and an array holds one
/// record per element.
pub fn records_from_json(value: Value) -> Result<Vec<DeviceRecord>, ScriptError> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(ScriptError::InvalidResult(format!(
                "expected device record or array of records, got {other}"
            )))
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<DeviceRecord>(item)
                .map_err(|e| ScriptError::InvalidResult(e.to_string()))
        })
        .collect()
}
