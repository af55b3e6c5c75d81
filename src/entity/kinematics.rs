//! Per-entity kinematic integration
//!
//! Entities are point masses with acceleration and speed limits. Each tick:
//! the target-speed directive is turned into a clamped acceleration, speed is
//! integrated, the entity advances along its lanelet (consuming overflow into
//! the follower, preferring an assigned route), an active lane-change curve
//! is tracked to completion, and the stand-still timer is maintained.

use crate::entity::parameters::EntityParameters;
use crate::entity::status::{CoordinateFrame, EntityStatus, LaneletPose};
use crate::error::{Error, Result};
use crate::hdmap::geometry::{oriented_rectangle, rectangle_distance, rectangles_intersect, Pose};
use crate::hdmap::hermite::HermiteCurve;
use crate::hdmap::map::LaneletMap;
use serde::{Deserialize, Serialize};

/// Speeds below this count as standing still, in m/s
pub const STAND_STILL_SPEED_EPSILON: f64 = 1e-3;

/// Target-speed directive installed by a SpeedAction or RPC request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSpeed {
    pub value: f64,
    /// Continuous targets stay installed after being reached
    pub continuous: bool,
}

/// An in-flight lane change along a Hermite curve
#[derive(Debug)]
pub struct LaneChange {
    pub curve: HermiteCurve,
    pub to_lanelet_id: i64,
    pub target_s: f64,
    /// Normalized curve parameter in [0, 1]
    pub parameter: f64,
    arc_length: f64,
}

/// Sensor attachment recorded on an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorAttachment {
    pub kind: String,
    pub spec: serde_json::Value,
}

/// One simulated entity
#[derive(Debug)]
pub struct Entity {
    pub name: String,
    pub is_ego: bool,
    pub parameters: EntityParameters,
    status: Option<EntityStatus>,
    target_speed: Option<TargetSpeed>,
    lane_change: Option<LaneChange>,
    route: Vec<i64>,
    stand_still_duration: f64,
    pub sensors: Vec<SensorAttachment>,
}

impl Entity {
    pub fn new(is_ego: bool, name: impl Into<String>, parameters: EntityParameters) -> Self {
        Entity {
            name: name.into(),
            is_ego,
            parameters,
            status: None,
            target_speed: None,
            lane_change: None,
            route: Vec::new(),
            stand_still_duration: 0.0,
            sensors: Vec::new(),
        }
    }

    /// Current status. Fails until a position has been established.
    pub fn status(&self) -> Result<&EntityStatus> {
        self.status.as_ref().ok_or_else(|| {
            Error::semantic(format!(
                "the position of entity '{}' is not specified by Teleport Action",
                self.name
            ))
        })
    }

    /// True once a Teleport Action or setEntityStatus has positioned the
    /// entity
    pub fn is_positioned(&self) -> bool {
        self.status.is_some()
    }

    /// Replace the whole status (Teleport Action, setEntityStatus)
    pub fn set_status(&mut self, mut status: EntityStatus, map: &LaneletMap) {
        if let Some(lanelet_pose) = status.lanelet_pose {
            if let Some(pose) = map.to_map_pose(
                lanelet_pose.lanelet_id,
                lanelet_pose.s,
                lanelet_pose.offset,
                lanelet_pose.rpy,
            ) {
                status.pose = pose;
            }
        }
        self.status = Some(status);
        self.lane_change = None;
    }

    /// Install a target-speed directive
    pub fn set_target_speed(&mut self, value: f64, continuous: bool) {
        self.target_speed = Some(TargetSpeed { value, continuous });
    }

    pub fn target_speed(&self) -> Option<TargetSpeed> {
        self.target_speed
    }

    /// Install a lane-change trajectory produced by the map
    pub fn start_lane_change(&mut self, curve: HermiteCurve, to_lanelet_id: i64, target_s: f64) {
        let arc_length = curve.length();
        self.lane_change = Some(LaneChange {
            curve,
            to_lanelet_id,
            target_s,
            parameter: 0.0,
            arc_length,
        });
    }

    pub fn lane_change_active(&self) -> bool {
        self.lane_change.is_some()
    }

    /// Fix the lanelets the lane-following controller must traverse
    pub fn assign_route(&mut self, route: Vec<i64>) {
        self.route = route;
    }

    pub fn route(&self) -> &[i64] {
        &self.route
    }

    /// Seconds the entity has been standing still
    pub fn stand_still_duration(&self) -> f64 {
        self.stand_still_duration
    }

    /// World pose of the entity, converting from the lane frame on demand
    pub fn world_pose(&self, map: &LaneletMap) -> Option<Pose> {
        let status = self.status.as_ref()?;
        match status.coordinate {
            CoordinateFrame::World => Some(status.pose),
            CoordinateFrame::Lane => {
                let lanelet_pose = status.lanelet_pose?;
                map.to_map_pose(
                    lanelet_pose.lanelet_id,
                    lanelet_pose.s,
                    lanelet_pose.offset,
                    lanelet_pose.rpy,
                )
            }
        }
    }

    /// Advance one tick
    pub fn update(&mut self, step_time: f64, current_time: f64, map: &LaneletMap) -> Result<()> {
        let Some(mut status) = self.status.take() else {
            // Not positioned yet; nothing to integrate.
            return Ok(());
        };
        let performance = self.parameters.performance();

        // 1. Resolve the target-speed directive into a clamped acceleration.
        let speed = status.speed();
        let mut accel = 0.0;
        if let Some(target) = self.target_speed {
            accel = ((target.value - speed) / step_time)
                .clamp(-performance.max_deceleration, performance.max_acceleration);
            if !target.continuous && (target.value - speed).abs() < STAND_STILL_SPEED_EPSILON {
                self.target_speed = None;
            }
        }

        // 2. Integrate speed.
        let speed = (speed + accel * step_time).clamp(0.0, performance.max_speed);
        status.twist.linear.x = speed;
        status.accel.linear.x = accel;
        status.traveled_distance += speed * step_time;

        // 3./4. Advance the pose.
        if let Some(lane_change) = self.lane_change.as_mut() {
            let advance = if lane_change.arc_length > 0.0 {
                speed * step_time / lane_change.arc_length
            } else {
                1.0
            };
            lane_change.parameter = (lane_change.parameter + advance).min(1.0);
            status.coordinate = CoordinateFrame::World;
            status.pose = lane_change.curve.pose_at(lane_change.parameter);
            status.lanelet_pose = None;
            if lane_change.parameter >= 1.0 {
                let pose = LaneletPose::new(lane_change.to_lanelet_id, lane_change.target_s, 0.0);
                status.coordinate = CoordinateFrame::Lane;
                status.lanelet_pose = Some(pose);
                if let Some(world) =
                    map.to_map_pose(pose.lanelet_id, pose.s, pose.offset, pose.rpy)
                {
                    status.pose = world;
                }
                self.lane_change = None;
            }
        } else {
            match status.coordinate {
                CoordinateFrame::Lane => {
                    if let Some(mut lanelet_pose) = status.lanelet_pose {
                        lanelet_pose.s += speed * step_time;
                        loop {
                            let length = map.lanelet_length(lanelet_pose.lanelet_id)?;
                            if lanelet_pose.s < length {
                                break;
                            }
                            match self.next_lanelet(lanelet_pose.lanelet_id, map) {
                                Some(next) => {
                                    lanelet_pose.s -= length;
                                    lanelet_pose.lanelet_id = next;
                                }
                                None => {
                                    // End of the road network: hold at the end.
                                    lanelet_pose.s = length;
                                    status.twist.linear.x = 0.0;
                                    break;
                                }
                            }
                        }
                        status.lanelet_pose = Some(lanelet_pose);
                        if let Some(world) = map.to_map_pose(
                            lanelet_pose.lanelet_id,
                            lanelet_pose.s,
                            lanelet_pose.offset,
                            lanelet_pose.rpy,
                        ) {
                            status.pose = world;
                        }
                    }
                }
                CoordinateFrame::World => {
                    let yaw = status.pose.yaw();
                    status.pose.position.x += speed * yaw.cos() * step_time;
                    status.pose.position.y += speed * yaw.sin() * step_time;
                }
            }
        }

        // 5. Stand-still timer.
        if status.speed() < STAND_STILL_SPEED_EPSILON {
            self.stand_still_duration += step_time;
        } else {
            self.stand_still_duration = 0.0;
        }

        status.time = current_time;
        self.status = Some(status);
        Ok(())
    }

    fn next_lanelet(&mut self, current: i64, map: &LaneletMap) -> Option<i64> {
        if let Some(index) = self.route.iter().position(|id| *id == current) {
            if let Some(next) = self.route.get(index + 1).copied() {
                // Consume the traversed prefix of the route.
                self.route.drain(..=index);
                return Some(next);
            }
            self.route.clear();
        }
        map.next_straight_or_first(current)
    }

    /// Oriented footprint rectangle in the map frame
    pub fn footprint(&self, map: &LaneletMap) -> Option<[crate::hdmap::geometry::Point; 4]> {
        let pose = self.world_pose(map)?;
        let bounding_box = self.parameters.bounding_box();
        let (sin, cos) = pose.yaw().sin_cos();
        let mut center = pose;
        center.position.x += cos * bounding_box.center.x - sin * bounding_box.center.y;
        center.position.y += sin * bounding_box.center.x + cos * bounding_box.center.y;
        Some(oriented_rectangle(
            &center,
            bounding_box.length,
            bounding_box.width,
        ))
    }

    /// Minimum distance between the two entities' footprints; `None` while
    /// they overlap or while either entity is unpositioned
    pub fn bounding_box_distance(&self, other: &Entity, map: &LaneletMap) -> Option<f64> {
        let a = self.footprint(map)?;
        let b = other.footprint(map)?;
        rectangle_distance(&a, &b)
    }

    /// True iff the two entities' footprints overlap
    pub fn collides_with(&self, other: &Entity, map: &LaneletMap) -> Option<bool> {
        let a = self.footprint(map)?;
        let b = other.footprint(map)?;
        Some(rectangles_intersect(&a, &b))
    }

    /// Time headway to a leading entity: longitudinal gap divided by the
    /// leader's speed. Undefined when the leader is not ahead or stopped.
    pub fn time_headway(&self, leader: &Entity, map: &LaneletMap) -> Option<f64> {
        let own = self.world_pose(map)?;
        let lead = leader.world_pose(map)?;
        let relative = own.relative_to(&lead);
        if relative.position.x <= 0.0 {
            return None;
        }
        let leader_speed = leader.status.as_ref()?.speed();
        if leader_speed <= 0.0 {
            return None;
        }
        Some(relative.position.x / leader_speed)
    }

    /// True iff the entity is within `tolerance` of the target pose
    pub fn reach_position(&self, target: &Pose, tolerance: f64, map: &LaneletMap) -> bool {
        self.world_pose(map)
            .map(|pose| pose.position.distance(&target.position) <= tolerance)
            .unwrap_or(false)
    }
}
