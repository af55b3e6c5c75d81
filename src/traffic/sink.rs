//! Traffic sinks: circular zones that despawn entering entities

use crate::hdmap::geometry::Point;

/// A despawn zone. The entity manager checks every entity against all sinks
/// after the kinematic updates of a tick and queues despawns for the caught
/// ones.
#[derive(Debug, Clone)]
pub struct TrafficSink {
    center: Point,
    radius: f64,
}

impl TrafficSink {
    pub fn new(center: Point, radius: f64) -> Self {
        TrafficSink { center, radius }
    }

    /// True iff the position lies within the sink radius
    pub fn catches(&self, position: &Point) -> bool {
        self.center.distance_2d(position) <= self.radius
    }
}
