//! Lane-change execution end to end

mod common;

use common::{parallel_lanes_map, write_scenario, EGO_VEHICLE};
use scenario_simulator_rs::simulation::simulator::LaneChangeTarget;
use scenario_simulator_rs::{Interpreter, Simulator, SimulatorApi};
use std::sync::Arc;

fn lane_change_scenario() -> String {
    format!(
        r#"<?xml version="1.0"?>
<OpenSCENARIO>
  <FileHeader author="test" date="2024-01-01" description="lane change" revMajor="1" revMinor="1"/>
  <Entities>{EGO_VEHICLE}</Entities>
  <Storyboard>
    <Init>
      <Actions>
        <Private entityRef="ego">
          <PrivateAction>
            <TeleportAction>
              <Position><LanePosition laneId="100" s="5" offset="0"/></Position>
            </TeleportAction>
          </PrivateAction>
          <PrivateAction>
            <LongitudinalAction>
              <SpeedAction>
                <SpeedActionDynamics dynamicsShape="step" value="0" dynamicsDimension="time"/>
                <SpeedActionTarget><AbsoluteTargetSpeed value="10"/></SpeedActionTarget>
              </SpeedAction>
            </LongitudinalAction>
          </PrivateAction>
        </Private>
      </Actions>
    </Init>
    <Story name="story">
      <Act name="act">
        <ManeuverGroup name="group" maximumExecutionCount="1">
          <Actors selectTriggeringEntities="false"><EntityRef entityRef="ego"/></Actors>
          <Maneuver name="maneuver">
            <Event name="change" priority="parallel">
              <Action name="move_left">
                <PrivateAction>
                  <LateralAction>
                    <LaneChangeAction>
                      <LaneChangeTarget><AbsoluteTargetLane value="101"/></LaneChangeTarget>
                    </LaneChangeAction>
                  </LateralAction>
                </PrivateAction>
              </Action>
            </Event>
          </Maneuver>
        </ManeuverGroup>
        <StartTrigger/>
      </Act>
    </Story>
    <StopTrigger>
      <ConditionGroup>
        <Condition name="timeout" delay="0">
          <ByValueCondition>
            <SimulationTimeCondition value="20" rule="greaterThan"/>
          </ByValueCondition>
        </Condition>
      </ConditionGroup>
    </StopTrigger>
  </Storyboard>
</OpenSCENARIO>"#
    )
}

#[test]
fn lane_change_action_moves_the_entity_onto_the_target_lanelet() {
    // S3: lane change 100 -> 101 at 10 m/s.
    let (_dir, path) = write_scenario(&lane_change_scenario());
    let mut interpreter = Interpreter::load(&path, Arc::new(parallel_lanes_map())).unwrap();
    while !interpreter.step().unwrap() {}
    let status = interpreter.simulator.entity_status("ego").unwrap();
    let lanelet_pose = status.lanelet_pose.expect("back on a lanelet");
    assert_eq!(lanelet_pose.lanelet_id, 101);
    assert!(lanelet_pose.offset.abs() < 1e-9);
}

#[test]
fn rpc_style_lane_change_by_direction() {
    let mut sim = Simulator::new(Arc::new(parallel_lanes_map()));
    let parameters = serde_json::from_value::<scenario_simulator_rs::entity::VehicleParameters>(
        serde_json::json!({
            "name": "sedan",
            "vehicle_category": "car",
            "bounding_box": {"center": {"x": 0.0, "y": 0.0, "z": 0.9},
                             "width": 2.0, "length": 4.5, "height": 1.8},
            "performance": {"max_speed": 20.0, "max_acceleration": 3.0, "max_deceleration": 5.0},
            "axles": {
                "front_axle": {"max_steering": 0.5, "wheel_diameter": 0.6, "track_width": 1.8,
                               "position_x": 2.8, "position_z": 0.3},
                "rear_axle": {"max_steering": 0.0, "wheel_diameter": 0.6, "track_width": 1.8,
                              "position_x": 0.0, "position_z": 0.3}
            }
        }),
    )
    .map(scenario_simulator_rs::EntityParameters::Vehicle)
    .unwrap();
    sim.spawn_entity(
        false,
        "car",
        parameters,
        Some(
            scenario_simulator_rs::EntityStatus::at_lanelet_pose(
                scenario_simulator_rs::LaneletPose::new(100, 5.0, 0.0),
            )
            .with_speed(10.0),
        ),
    )
    .unwrap();
    sim.request_lane_change(
        "car",
        LaneChangeTarget::Direction(scenario_simulator_rs::hdmap::map::LaneChangeDirection::Left),
    )
    .unwrap();
    for _ in 0..400 {
        sim.update_frame().unwrap();
        if !sim.entities.entity("car").unwrap().lane_change_active() {
            break;
        }
    }
    let status = sim.entity_status("car").unwrap();
    assert_eq!(status.lanelet_pose.unwrap().lanelet_id, 101);
}

#[test]
fn lane_change_without_adjacency_fails() {
    let mut sim = Simulator::new(Arc::new(common::single_lane_map()));
    let parameters = scenario_simulator_rs::EntityParameters::Vehicle(
        scenario_simulator_rs::entity::VehicleParameters {
            name: "sedan".to_string(),
            vehicle_category: scenario_simulator_rs::entity::VehicleCategory::Car,
            bounding_box: Default::default(),
            performance: Default::default(),
            axles: Default::default(),
        },
    );
    sim.spawn_entity(
        false,
        "car",
        parameters,
        Some(scenario_simulator_rs::EntityStatus::at_lanelet_pose(
            scenario_simulator_rs::LaneletPose::new(100, 5.0, 0.0),
        )),
    )
    .unwrap();
    let err = sim
        .request_lane_change(
            "car",
            LaneChangeTarget::Direction(
                scenario_simulator_rs::hdmap::map::LaneChangeDirection::Left,
            ),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        scenario_simulator_rs::Error::Semantic { .. }
    ));
}
