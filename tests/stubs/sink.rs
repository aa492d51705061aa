use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use mqtt_driver::data_mgmt::models::Point;
use mqtt_driver::data_mgmt::sink::{PointSink, SinkError};

#[derive(Default)]
pub struct CollectingSink {
    points: Mutex<Vec<Point>>,
    ready: AtomicUsize,
}

impl CollectingSink {
    pub fn points(&self) -> Vec<Point> {
        self.points.lock().unwrap().clone()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }
}

impl PointSink for CollectingSink {
    fn write_point(&self, point: &Point) -> Result<(), SinkError> {
        self.points.lock().unwrap().push(point.clone());
        Ok(())
    }

    fn ready(&self) {
        self.ready.fetch_add(1, Ordering::SeqCst);
    }
}
