//! Hand-off of points to the external sink
//!
//! Broker callbacks must never wait on the sink itself. They push points onto a bounded
//! queue instead, and a dedicated worker thread drains it into the [`PointSink`].

use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::SendTimeoutError;
use thiserror::Error;

use super::models::Point;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink rejected point: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("point queue full; dropped point for device '{0}'")]
    QueueFull(String),
    #[error("point queue closed; dropped point for device '{0}'")]
    QueueClosed(String),
}

/// Destination for points produced by the driver
pub trait PointSink: Send + Sync {
    fn write_point(&self, point: &Point) -> Result<(), SinkError>;

    /// Called once a start has completed and points may begin to arrive
    fn ready(&self) {}
}

/// Enqueues points for the sink worker; cheap to clone into every pipeline
#[derive(Clone, Debug)]
pub struct PointSender {
    tx: flume::Sender<Point>,
    send_timeout: Duration,
}

impl PointSender {
    pub fn send(&self, point: Point) -> Result<(), SinkError> {
        self.tx
            .send_timeout(point, self.send_timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(p) => SinkError::QueueFull(p.id),
                SendTimeoutError::Disconnected(p) => SinkError::QueueClosed(p.id),
            })
    }
}

pub struct SinkWorker {
    tx: Option<flume::Sender<Point>>,
    handle: Option<JoinHandle<()>>,
    send_timeout: Duration,
}

impl SinkWorker {
    pub fn spawn(
        sink: Arc<dyn PointSink>,
        queue_size: usize,
        send_timeout: Duration,
    ) -> io::Result<Self> {
        let (tx, rx) = flume::bounded::<Point>(queue_size);

        let handle = thread::Builder::new()
            .name("point-sink".to_string())
            .spawn(move || {
                for point in rx.iter() {
                    if let Err(e) = sink.write_point(&point) {
                        log::error!(
                            "Failed to write point for device '{}' in table '{}': {}",
                            point.id,
                            point.table,
                            e
                        );
                    }
                }
                log::debug!("Point queue closed; sink worker exiting");
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            send_timeout,
        })
    }

    /// `None` once the worker has been shut down
    pub fn sender(&self) -> Option<PointSender> {
        self.tx.as_ref().map(|tx| PointSender {
            tx: tx.clone(),
            send_timeout: self.send_timeout,
        })
    }

    /// Close the queue and wait for already queued points to be written
    ///
    /// Points still held by in-flight callbacks are written before the worker exits, as
    /// the queue only closes once every sender is gone.
    pub fn shutdown(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Sink worker terminated by a panic");
            }
        }
    }
}

impl Drop for SinkWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Writes each point as one line of JSON
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> PointSink for JsonLinesSink<W> {
    fn write_point(&self, point: &Point) -> Result<(), SinkError> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        serde_json::to_writer(&mut *writer, point)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    fn ready(&self) {
        log::info!("Writing points as JSON lines");
    }
}
