use std::sync::{
    Mutex,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use serde::Deserialize;

/// Rendered sizes of a car's lane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TrackGeometry {
    /// Width of the track element.
    pub track_width: f64,
    /// Width of the car element.
    pub car_width: f64,
}

impl Default for TrackGeometry {
    fn default() -> Self {
        Self {
            track_width: 1000.0,
            car_width: 80.0,
        }
    }
}

/// Rendering surface of a single car, supplied by the host.
///
/// Positions are horizontal offsets from the start line.
pub trait MotionSink: Send + Sync {
    /// Current sizes of the track and the car.
    fn geometry(&self) -> TrackGeometry;
    /// Offset the car is currently drawn at.
    fn position(&self) -> f64;
    /// Draw the car at `offset`.
    fn render(&self, offset: f64);
}

/// Sink that only remembers where the car is; used when nothing is drawn.
pub struct HeadlessSink {
    geometry: Mutex<TrackGeometry>,
    position: AtomicU64,
    frames: AtomicUsize,
}

impl HeadlessSink {
    /// Sink for a lane of the given geometry, with the car on the start line.
    pub fn new(geometry: TrackGeometry) -> Self {
        Self {
            geometry: Mutex::new(geometry),
            position: AtomicU64::new(0f64.to_bits()),
            frames: AtomicUsize::new(0),
        }
    }

    /// Number of frames rendered so far.
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }

    /// Simulate a resize of the lane.
    pub fn resize(&self, geometry: TrackGeometry) {
        if let Ok(mut guard) = self.geometry.lock() {
            *guard = geometry;
        }
    }
}

impl MotionSink for HeadlessSink {
    fn geometry(&self) -> TrackGeometry {
        self.geometry
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default()
    }

    fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }

    fn render(&self, offset: f64) {
        self.position.store(offset.to_bits(), Ordering::Release);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}
