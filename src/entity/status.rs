//! Dynamic entity state
//!
//! An entity's status is either in world coordinates (a map-frame pose) or
//! in lane coordinates (a lanelet position); the coordinate tag records which
//! one is authoritative. Twist and acceleration follow the entity's body
//! frame, so `twist.linear.x` is the forward speed.

use crate::hdmap::geometry::{Pose, Vector3};
use serde::{Deserialize, Serialize};

/// Which coordinate representation is authoritative for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateFrame {
    World,
    Lane,
}

/// Position along a lanelet centerline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaneletPose {
    pub lanelet_id: i64,
    /// Arc length along the centerline
    pub s: f64,
    /// Lateral displacement, positive toward the left bound
    pub offset: f64,
    /// Extra rotation on top of the centerline tangent frame
    pub rpy: Vector3,
}

impl LaneletPose {
    pub fn new(lanelet_id: i64, s: f64, offset: f64) -> Self {
        LaneletPose {
            lanelet_id,
            s,
            offset,
            rpy: Vector3::default(),
        }
    }
}

/// Linear and angular velocity in the body frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

/// Linear and angular acceleration in the body frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Accel {
    pub linear: Vector3,
    pub angular: Vector3,
}

/// Complete dynamic state of an entity at one simulation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStatus {
    /// Simulation time the status belongs to
    pub time: f64,
    pub coordinate: CoordinateFrame,
    /// World pose; kept in sync with the lanelet pose when one is set
    pub pose: Pose,
    pub lanelet_pose: Option<LaneletPose>,
    pub twist: Twist,
    pub accel: Accel,
    /// Human-readable description of the running behavior
    pub action_status: String,
    /// Distance traveled since spawn, in meters
    pub traveled_distance: f64,
}

impl EntityStatus {
    /// Status at a lanelet position, standing still
    pub fn at_lanelet_pose(lanelet_pose: LaneletPose) -> Self {
        EntityStatus {
            time: 0.0,
            coordinate: CoordinateFrame::Lane,
            pose: Pose::default(),
            lanelet_pose: Some(lanelet_pose),
            twist: Twist::default(),
            accel: Accel::default(),
            action_status: String::new(),
            traveled_distance: 0.0,
        }
    }

    /// Status at a world pose, standing still
    pub fn at_world_pose(pose: Pose) -> Self {
        EntityStatus {
            time: 0.0,
            coordinate: CoordinateFrame::World,
            pose,
            lanelet_pose: None,
            twist: Twist::default(),
            accel: Accel::default(),
            action_status: String::new(),
            traveled_distance: 0.0,
        }
    }

    /// Forward speed
    pub fn speed(&self) -> f64 {
        self.twist.linear.x
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.twist.linear.x = speed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdmap::geometry::Point;

    #[test]
    fn lanelet_status_is_lane_tagged() {
        let status = EntityStatus::at_lanelet_pose(LaneletPose::new(100, 5.0, 0.0));
        assert_eq!(status.coordinate, CoordinateFrame::Lane);
        assert_eq!(status.lanelet_pose.unwrap().lanelet_id, 100);
        assert_eq!(status.speed(), 0.0);
    }

    #[test]
    fn world_status_keeps_pose() {
        let pose = Pose::new(Point::new(1.0, 2.0, 0.0), Vector3::default());
        let status = EntityStatus::at_world_pose(pose);
        assert_eq!(status.coordinate, CoordinateFrame::World);
        assert_eq!(status.pose.position.x, 1.0);
        assert!(status.lanelet_pose.is_none());
    }

    #[test]
    fn status_round_trips_through_json() {
        let status = EntityStatus::at_lanelet_pose(LaneletPose::new(100, 5.0, -0.5)).with_speed(3.0);
        let json = serde_json::to_string(&status).unwrap();
        let back: EntityStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
