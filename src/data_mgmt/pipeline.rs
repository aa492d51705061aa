//! Turns one MQTT message into points
//!
//! Failures are contained at the smallest unit possible: an unknown field only loses that
//! field, an unknown device only loses its record, and a failing script only loses the
//! message. The one exception is a record that carries no fields at all; that is treated
//! as a malformed message and nothing from the message is forwarded.

use std::str::{from_utf8, Utf8Error};
use std::sync::Arc;

use thiserror::Error;

use super::models::{Field, Point};
use super::sink::PointSender;
use super::tag_index::TagIndex;
use crate::helpers::now_epoch_ms;
use crate::script::{ScriptError, Transform};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("record for device '{device}' has no fields")]
    MissingFields { device: String },
}

pub struct MessagePipeline {
    table_id: String,
    transform: Arc<dyn Transform>,
    index: TagIndex,
}

impl MessagePipeline {
    pub fn new(table_id: impl Into<String>, transform: Arc<dyn Transform>, index: TagIndex) -> Self {
        Self {
            table_id: table_id.into(),
            transform,
            index,
        }
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    /// Process a message and queue the resulting points for the sink
    pub fn handle(&self, topic: &str, payload: &[u8], sender: &PointSender) {
        let points = match self.points_at(topic, payload, now_epoch_ms()) {
            Ok(points) => points,
            Err(e @ PipelineError::MissingFields { .. }) => {
                log::warn!(
                    "Table '{}': {}; dropping message on '{}', payload: {}",
                    self.table_id,
                    e,
                    topic,
                    String::from_utf8_lossy(payload)
                );
                return;
            }
            Err(e) => {
                log::error!(
                    "Table '{}': could not transform message on '{}': {}; payload: {}",
                    self.table_id,
                    topic,
                    e,
                    String::from_utf8_lossy(payload)
                );
                return;
            }
        };

        for point in points {
            if let Err(e) = sender.send(point) {
                log::error!("Table '{}': failed to forward point: {}", self.table_id, e);
            }
        }
    }

    /// Map a message onto points stamped with `time` (ms since epoch)
    pub fn points_at(
        &self,
        topic: &str,
        payload: &[u8],
        time: i64,
    ) -> Result<Vec<Point>, PipelineError> {
        let text = from_utf8(payload)?;
        let records = self.transform.apply(topic, text)?;

        if records.is_empty() {
            log::warn!(
                "Table '{}': script returned no records for '{}', payload: {}",
                self.table_id,
                topic,
                text
            );
            return Ok(Vec::new());
        }

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            let Some(device_id) = record.id else {
                log::warn!(
                    "Table '{}': record without device id on '{}' skipped",
                    self.table_id,
                    topic
                );
                continue;
            };

            let fields = match record.fields {
                Some(fields) if !fields.is_empty() => fields,
                _ => return Err(PipelineError::MissingFields { device: device_id }),
            };

            let Some(device) = self.index.device(&device_id) else {
                log::warn!(
                    "Table '{}': unknown device '{}' skipped, fields: {:?}",
                    self.table_id,
                    device_id,
                    fields
                );
                continue;
            };

            let mut mapped = Vec::with_capacity(fields.len());
            for (key, value) in fields {
                match device.get(&key) {
                    Some(tag) => mapped.push(Field {
                        tag: tag.clone(),
                        value,
                    }),
                    None => log::warn!(
                        "Table '{}': device '{}' has no tag for key '{}'",
                        self.table_id,
                        device.device_id,
                        key
                    ),
                }
            }

            if mapped.is_empty() {
                log::warn!(
                    "Table '{}': no known tags in record for device '{}'",
                    self.table_id,
                    device.device_id
                );
                continue;
            }

            // Equals the record id unless the record used a custom device id
            points.push(Point {
                table: self.table_id.clone(),
                id: device.device_id.clone(),
                fields: mapped,
                time,
            });
        }

        Ok(points)
    }
}
