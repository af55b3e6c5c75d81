//! The simulator context object
//!
//! One [`Simulator`] owns everything a simulation run mutates: the entity
//! registry, the traffic lights and the clock, plus a shared handle on the
//! immutable map. Scenario evaluation and RPC dispatch both go through it,
//! so there is no process-wide simulator state. The [`SimulatorApi`] trait is
//! the stable operation surface mirrored by the RPC method table.

use crate::entity::manager::EntityManager;
use crate::entity::parameters::EntityParameters;
use crate::entity::status::EntityStatus;
use crate::error::{Error, Result};
use crate::hdmap::geometry::Pose;
use crate::hdmap::map::{LaneChangeDirection, LaneletMap};
use crate::simulation::clock::SimulationClock;
use crate::traffic::traffic_light::{TrafficLightArrow, TrafficLightColor, TrafficLightManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Target of a lane change request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneChangeTarget {
    /// Absolute target lanelet
    Lanelet(i64),
    /// Adjacent lanelet in the given direction
    Direction(LaneChangeDirection),
}

/// Traffic-light state snapshot for telemetry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficLightReport {
    pub id: i64,
    pub color: TrafficLightColor,
    pub arrow: TrafficLightArrow,
    pub color_changed: bool,
    pub arrow_changed: bool,
}

/// Everything a telemetry subscriber sees after one tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub time: f64,
    pub frame: u64,
    pub entities: Vec<(String, EntityStatus)>,
    pub traffic_lights: Vec<TrafficLightReport>,
}

type TelemetrySubscriber = Box<dyn FnMut(&TelemetryFrame) + Send>;

/// The stable operation surface of the simulator, mirrored by the RPC
/// method table
pub trait SimulatorApi {
    fn spawn_entity(
        &mut self,
        is_ego: bool,
        name: &str,
        parameters: EntityParameters,
        status: Option<EntityStatus>,
    ) -> Result<()>;
    fn despawn_entity(&mut self, name: &str) -> Result<()>;
    fn entity_status(&self, name: &str) -> Result<EntityStatus>;
    fn set_entity_status(&mut self, name: &str, status: EntityStatus) -> Result<()>;
    fn request_acquire_position(
        &mut self,
        name: &str,
        lanelet_id: i64,
        s: f64,
        offset: f64,
    ) -> Result<()>;
    fn request_lane_change(&mut self, name: &str, target: LaneChangeTarget) -> Result<()>;
    fn set_target_speed(&mut self, name: &str, target_speed: f64, continuous: bool) -> Result<()>;
    fn attach_detection_sensor(&mut self, name: &str, spec: serde_json::Value) -> Result<()>;
    fn attach_lidar_sensor(&mut self, name: &str, spec: serde_json::Value) -> Result<()>;
    fn check_collision(&self, name0: &str, name1: &str) -> Result<bool>;
    fn current_time(&self) -> f64;
}

/// Owner of all mutable simulation state
pub struct Simulator {
    pub map: Arc<LaneletMap>,
    pub entities: EntityManager,
    pub traffic_lights: TrafficLightManager,
    pub clock: SimulationClock,
    subscribers: Vec<TelemetrySubscriber>,
}

impl Simulator {
    pub fn new(map: Arc<LaneletMap>) -> Self {
        let traffic_lights = TrafficLightManager::from_light_ids(&map.traffic_light_ids());
        Simulator {
            map,
            entities: EntityManager::new(),
            traffic_lights,
            clock: SimulationClock::default(),
            subscribers: Vec::new(),
        }
    }

    /// Register a telemetry subscriber called after every tick
    pub fn subscribe(&mut self, subscriber: TelemetrySubscriber) {
        self.subscribers.push(subscriber);
    }

    /// Advance the world one tick: integrate entities, advance lights, emit
    /// telemetry, finalize despawns, advance the clock
    pub fn update_frame(&mut self) -> Result<()> {
        let step_time = self.clock.step_time();
        let current_time = self.clock.current_time() + step_time;
        let map = Arc::clone(&self.map);
        self.entities.integrate(step_time, current_time, &map)?;
        self.traffic_lights.update(step_time);
        self.publish_telemetry(current_time);
        self.entities.finalize_frame(&map);
        self.clock.tick();
        Ok(())
    }

    fn publish_telemetry(&mut self, time: f64) {
        if self.subscribers.is_empty() {
            return;
        }
        let frame = TelemetryFrame {
            time,
            frame: self.clock.frame() + 1,
            entities: self
                .entities
                .entities()
                .filter_map(|entity| {
                    entity
                        .status()
                        .ok()
                        .map(|status| (entity.name.clone(), status.clone()))
                })
                .collect(),
            traffic_lights: self
                .traffic_lights
                .lights()
                .map(|light| TrafficLightReport {
                    id: light.id,
                    color: light.color(),
                    arrow: light.arrow(),
                    color_changed: light.color_changed(),
                    arrow_changed: light.arrow_changed(),
                })
                .collect(),
        };
        for subscriber in &mut self.subscribers {
            subscriber(&frame);
        }
    }

    /// Pose of `to` in `from`'s frame. Missing positions yield the NaN
    /// sentinel pose instead of an error so downstream math can propagate
    /// signalling values.
    pub fn relative_pose(&self, from: &str, to: &str) -> Pose {
        let resolve = |name: &str| {
            self.entities
                .entity(name)
                .ok()
                .and_then(|entity| entity.world_pose(&self.map))
        };
        match (resolve(from), resolve(to)) {
            (Some(from_pose), Some(to_pose)) => from_pose.relative_to(&to_pose),
            _ => Pose::nan_sentinel(),
        }
    }

    /// True iff the entity is within tolerance of the target pose
    pub fn reach_position(&self, name: &str, target: &Pose, tolerance: f64) -> Result<bool> {
        Ok(self
            .entities
            .entity(name)?
            .reach_position(target, tolerance, &self.map))
    }

    /// Seconds the entity has been standing still
    pub fn stand_still_duration(&self, name: &str) -> Result<f64> {
        Ok(self.entities.entity(name)?.stand_still_duration())
    }

    /// Time headway from `from` to the leading entity `to`
    pub fn time_headway(&self, from: &str, to: &str) -> Option<f64> {
        let follower = self.entities.entity(from).ok()?;
        let leader = self.entities.entity(to).ok()?;
        follower.time_headway(leader, &self.map)
    }

    /// Longitudinal distance between two entities along the lane graph
    pub fn longitudinal_distance(&self, from: &str, to: &str) -> Option<f64> {
        let from_pose = self
            .entities
            .entity(from)
            .ok()?
            .status()
            .ok()?
            .lanelet_pose?;
        let to_pose = self.entities.entity(to).ok()?.status().ok()?.lanelet_pose?;
        self.map.longitudinal_distance(
            (from_pose.lanelet_id, from_pose.s),
            (to_pose.lanelet_id, to_pose.s),
        )
    }

    /// Minimum bounding-box distance between two entities; `None` while they
    /// overlap
    pub fn bounding_box_distance(&self, from: &str, to: &str) -> Option<f64> {
        let a = self.entities.entity(from).ok()?;
        let b = self.entities.entity(to).ok()?;
        a.bounding_box_distance(b, &self.map)
    }
}

impl SimulatorApi for Simulator {
    fn spawn_entity(
        &mut self,
        is_ego: bool,
        name: &str,
        parameters: EntityParameters,
        status: Option<EntityStatus>,
    ) -> Result<()> {
        let map = Arc::clone(&self.map);
        self.entities.spawn(is_ego, name, parameters, status, &map)
    }

    fn despawn_entity(&mut self, name: &str) -> Result<()> {
        self.entities.despawn(name)
    }

    fn entity_status(&self, name: &str) -> Result<EntityStatus> {
        Ok(self.entities.entity(name)?.status()?.clone())
    }

    fn set_entity_status(&mut self, name: &str, status: EntityStatus) -> Result<()> {
        let map = Arc::clone(&self.map);
        self.entities.entity_mut(name)?.set_status(status, &map);
        Ok(())
    }

    fn request_acquire_position(
        &mut self,
        name: &str,
        lanelet_id: i64,
        s: f64,
        offset: f64,
    ) -> Result<()> {
        let _ = offset;
        let current = self
            .entities
            .entity(name)?
            .status()?
            .lanelet_pose
            .ok_or_else(|| {
                Error::semantic(format!(
                    "entity '{}' is not on a lanelet; cannot acquire a lane position",
                    name
                ))
            })?;
        if !self.map.is_in_lanelet(lanelet_id, s) {
            return Err(Error::semantic(format!(
                "target s {} is outside lanelet {}",
                s, lanelet_id
            )));
        }
        let route = self.map.route(current.lanelet_id, lanelet_id);
        if route.is_empty() {
            return Err(Error::semantic(format!(
                "no route from lanelet {} to lanelet {}",
                current.lanelet_id, lanelet_id
            )));
        }
        self.entities.entity_mut(name)?.assign_route(route);
        Ok(())
    }

    fn request_lane_change(&mut self, name: &str, target: LaneChangeTarget) -> Result<()> {
        let to_lanelet_id = match target {
            LaneChangeTarget::Lanelet(id) => id,
            LaneChangeTarget::Direction(direction) => {
                let current = self
                    .entities
                    .entity(name)?
                    .status()?
                    .lanelet_pose
                    .ok_or_else(|| {
                        Error::semantic(format!("entity '{}' is not on a lanelet", name))
                    })?;
                self.map
                    .lane_changeable_lanelet(current.lanelet_id, direction)
                    .ok_or_else(|| {
                        Error::semantic(format!(
                            "no adjacent lanelet {:?} of lanelet {}",
                            direction, current.lanelet_id
                        ))
                    })?
            }
        };
        let from_pose = self
            .entities
            .entity(name)?
            .world_pose(&self.map)
            .ok_or_else(|| Error::semantic(format!("entity '{}' has no pose", name)))?;
        let (curve, target_s) = self
            .map
            .lane_change_trajectory(&from_pose, to_lanelet_id)
            .ok_or_else(|| {
                Error::semantic(format!(
                    "no feasible lane change trajectory onto lanelet {}",
                    to_lanelet_id
                ))
            })?;
        self.entities
            .entity_mut(name)?
            .start_lane_change(curve, to_lanelet_id, target_s);
        tracing::debug!(name, to_lanelet_id, "lane change started");
        Ok(())
    }

    fn set_target_speed(&mut self, name: &str, target_speed: f64, continuous: bool) -> Result<()> {
        self.entities
            .entity_mut(name)?
            .set_target_speed(target_speed, continuous);
        Ok(())
    }

    fn attach_detection_sensor(&mut self, name: &str, spec: serde_json::Value) -> Result<()> {
        self.entities
            .entity_mut(name)?
            .sensors
            .push(crate::entity::kinematics::SensorAttachment {
                kind: "detection".to_string(),
                spec,
            });
        Ok(())
    }

    fn attach_lidar_sensor(&mut self, name: &str, spec: serde_json::Value) -> Result<()> {
        self.entities
            .entity_mut(name)?
            .sensors
            .push(crate::entity::kinematics::SensorAttachment {
                kind: "lidar".to_string(),
                spec,
            });
        Ok(())
    }

    fn check_collision(&self, name0: &str, name1: &str) -> Result<bool> {
        let a = self.entities.entity(name0)?;
        let b = self.entities.entity(name1)?;
        Ok(a.collides_with(b, &self.map).unwrap_or(false))
    }

    fn current_time(&self) -> f64 {
        self.clock.current_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::parameters::{
        BoundingBox, Performance, VehicleCategory, VehicleParameters,
    };
    use crate::entity::status::LaneletPose;
    use crate::hdmap::map::test_support::straight_lanelet;
    use crate::hdmap::map::LaneletNetworkData;
    use std::sync::Mutex;

    fn vehicle_parameters() -> EntityParameters {
        EntityParameters::Vehicle(VehicleParameters {
            name: "sedan".to_string(),
            vehicle_category: VehicleCategory::Car,
            bounding_box: BoundingBox::default(),
            performance: Performance::default(),
            axles: Default::default(),
        })
    }

    fn simulator() -> Simulator {
        let mut first = straight_lanelet(100, 0.0, 50.0, 0.0);
        let mut second = straight_lanelet(200, 50.0, 40.0, 0.0);
        first.following = vec![200];
        second.previous = vec![100];
        let map = LaneletMap::from_data(LaneletNetworkData {
            lanelets: vec![first, second],
        })
        .unwrap();
        Simulator::new(Arc::new(map))
    }

    #[test]
    fn unpositioned_status_read_fails_with_teleport_message() {
        let mut sim = simulator();
        sim.spawn_entity(true, "ego", vehicle_parameters(), None)
            .unwrap();
        let err = sim.entity_status("ego").unwrap_err();
        let message = format!("{}", err);
        assert!(message.contains("position"));
        assert!(message.contains("not specified by Teleport Action"));
    }

    #[test]
    fn relative_pose_with_missing_data_is_nan_sentinel() {
        let mut sim = simulator();
        sim.spawn_entity(true, "ego", vehicle_parameters(), None)
            .unwrap();
        let pose = sim.relative_pose("ego", "ghost");
        assert!(pose.has_nan_position());
    }

    #[test]
    fn telemetry_still_contains_entity_despawned_this_tick() {
        let mut sim = simulator();
        sim.spawn_entity(
            false,
            "car",
            vehicle_parameters(),
            Some(EntityStatus::at_lanelet_pose(LaneletPose::new(100, 5.0, 0.0))),
        )
        .unwrap();
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sim.subscribe(Box::new(move |frame| {
            sink.lock()
                .unwrap()
                .push(frame.entities.iter().map(|(n, _)| n.clone()).collect());
        }));
        sim.despawn_entity("car").unwrap();
        sim.update_frame().unwrap();
        sim.update_frame().unwrap();
        let frames = seen.lock().unwrap();
        assert_eq!(frames[0], vec!["car".to_string()]);
        assert!(frames[1].is_empty());
    }

    #[test]
    fn clock_advances_once_per_frame() {
        let mut sim = simulator();
        for _ in 0..10 {
            sim.update_frame().unwrap();
        }
        assert_eq!(sim.current_time(), 10.0 * sim.clock.step_time());
    }

    #[test]
    fn acquire_position_assigns_a_route() {
        let mut sim = simulator();
        sim.spawn_entity(
            true,
            "ego",
            vehicle_parameters(),
            Some(EntityStatus::at_lanelet_pose(LaneletPose::new(100, 5.0, 0.0))),
        )
        .unwrap();
        sim.request_acquire_position("ego", 200, 10.0, 0.0).unwrap();
        assert_eq!(sim.entities.entity("ego").unwrap().route(), &[100, 200]);
        let err = sim.request_acquire_position("ego", 200, 999.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn unreachable_acquire_position_is_semantic_error() {
        let mut sim = simulator();
        sim.spawn_entity(
            true,
            "ego",
            vehicle_parameters(),
            Some(EntityStatus::at_lanelet_pose(LaneletPose::new(200, 5.0, 0.0))),
        )
        .unwrap();
        let err = sim.request_acquire_position("ego", 100, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn sensors_are_recorded_on_the_entity() {
        let mut sim = simulator();
        sim.spawn_entity(true, "ego", vehicle_parameters(), None)
            .unwrap();
        sim.attach_detection_sensor("ego", serde_json::json!({"range": 100.0}))
            .unwrap();
        sim.attach_lidar_sensor("ego", serde_json::json!({"channels": 32}))
            .unwrap();
        let entity = sim.entities.entity("ego").unwrap();
        assert_eq!(entity.sensors.len(), 2);
        assert_eq!(entity.sensors[0].kind, "detection");
    }
}
