//! End-to-end scenario execution through the interpreter

mod common;

use common::{single_lane_map, write_scenario, EGO_VEHICLE};
use scenario_simulator_rs::syntax::StoryboardElementState;
use scenario_simulator_rs::{Interpreter, SimulatorApi};
use std::sync::Arc;

fn speed_scenario(stop_after: f64) -> String {
    format!(
        r#"<?xml version="1.0"?>
<OpenSCENARIO>
  <FileHeader author="test" date="2024-01-01" description="speed scenario" revMajor="1" revMinor="1"/>
  <CatalogLocations/>
  <RoadNetwork><LogicFile filepath="map.json"/></RoadNetwork>
  <Entities>{EGO_VEHICLE}</Entities>
  <Storyboard>
    <Init>
      <Actions>
        <Private entityRef="ego">
          <PrivateAction>
            <TeleportAction>
              <Position><LanePosition laneId="100" s="0" offset="0"/></Position>
            </TeleportAction>
          </PrivateAction>
        </Private>
      </Actions>
    </Init>
    <Story name="story">
      <Act name="act">
        <ManeuverGroup name="group" maximumExecutionCount="1">
          <Actors selectTriggeringEntities="false">
            <EntityRef entityRef="ego"/>
          </Actors>
          <Maneuver name="maneuver">
            <Event name="accelerate" priority="parallel">
              <Action name="cruise">
                <PrivateAction>
                  <LongitudinalAction>
                    <SpeedAction>
                      <SpeedActionDynamics dynamicsShape="step" value="0" dynamicsDimension="time"/>
                      <SpeedActionTarget><AbsoluteTargetSpeed value="10"/></SpeedActionTarget>
                    </SpeedAction>
                  </LongitudinalAction>
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
        <Condition name="timeout" delay="0" conditionEdge="none">
          <ByValueCondition>
            <SimulationTimeCondition value="{stop_after}" rule="greaterThan"/>
          </ByValueCondition>
        </Condition>
      </ConditionGroup>
    </StopTrigger>
  </Storyboard>
</OpenSCENARIO>"#
    )
}

#[test]
fn speed_action_converges_under_acceleration_limits() {
    // S1: target 10 m/s with maxAccel 3, step 0.05, observed after 4 s.
    let (_dir, path) = write_scenario(&speed_scenario(4.0));
    let mut interpreter = Interpreter::load(&path, Arc::new(single_lane_map())).unwrap();
    while !interpreter.step().unwrap() {}
    let status = interpreter.simulator.entity_status("ego").unwrap();
    assert!(
        (status.speed() - 10.0).abs() < 0.01,
        "v = {}",
        status.speed()
    );
    // Acceleration-limited ramp (storyboard start latency included), then
    // steady cruise at 10 m/s.
    let s = status.lanelet_pose.unwrap().s;
    assert!(s > 17.0 && s < 26.0, "s = {}", s);
}

#[test]
fn stop_trigger_exits_within_one_tick_of_crossing() {
    // S5: StopTrigger on SimulationTime > 10.
    let (_dir, path) = write_scenario(&speed_scenario(10.0));
    let mut interpreter = Interpreter::load(&path, Arc::new(single_lane_map())).unwrap();
    let mut ticks = 0u32;
    while !interpreter.step().unwrap() {
        ticks += 1;
        assert!(ticks < 500, "never stopped");
    }
    let time = interpreter.simulator.current_time();
    assert!(time > 10.0 && time <= 10.15, "stopped at {}", time);
}

#[test]
fn storyboard_elements_single_step_their_transitions() {
    let (_dir, path) = write_scenario(&speed_scenario(6.0));
    let mut interpreter = Interpreter::load(&path, Arc::new(single_lane_map())).unwrap();
    let mut history: Vec<StoryboardElementState> = Vec::new();
    while !interpreter.step().unwrap() {
        if let Some(state) = interpreter.element_states().get("accelerate") {
            if history.last() != Some(state) {
                history.push(*state);
            }
        }
    }
    // The event walks standby -> startTransition -> running -> endTransition
    // -> complete, one transition per tick, no state skipped.
    assert_eq!(
        history,
        vec![
            StoryboardElementState::Standby,
            StoryboardElementState::StartTransition,
            StoryboardElementState::Running,
            StoryboardElementState::EndTransition,
            StoryboardElementState::Complete,
        ]
    );
}

#[test]
fn scenario_without_stories_ends_via_stop_trigger_only() {
    let xml = format!(
        r#"<?xml version="1.0"?>
<OpenSCENARIO>
  <FileHeader author="test" date="2024-01-01" description="init only" revMajor="1" revMinor="1"/>
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
                <SpeedActionTarget><AbsoluteTargetSpeed value="5"/></SpeedActionTarget>
              </SpeedAction>
            </LongitudinalAction>
          </PrivateAction>
        </Private>
      </Actions>
    </Init>
    <StopTrigger>
      <ConditionGroup>
        <Condition name="done" delay="0">
          <ByValueCondition>
            <SimulationTimeCondition value="1.0" rule="greaterThan"/>
          </ByValueCondition>
        </Condition>
      </ConditionGroup>
    </StopTrigger>
  </Storyboard>
</OpenSCENARIO>"#
    );
    let (_dir, path) = write_scenario(&xml);
    let mut interpreter = Interpreter::load(&path, Arc::new(single_lane_map())).unwrap();
    while !interpreter.step().unwrap() {}
    // Init speed is applied instantaneously: the entity has been cruising at
    // 5 m/s from the first tick.
    let status = interpreter.simulator.entity_status("ego").unwrap();
    assert!((status.speed() - 5.0).abs() < 1e-6);
    let s = status.lanelet_pose.unwrap().s;
    assert!(s > 9.0 && s < 11.0, "s = {}", s);
}

#[test]
fn unsupported_story_action_rejects_the_scenario_at_load() {
    let xml = format!(
        r#"<?xml version="1.0"?>
<OpenSCENARIO>
  <FileHeader author="test" date="2024-01-01" description="bad" revMajor="1" revMinor="1"/>
  <Entities>{EGO_VEHICLE}</Entities>
  <Storyboard>
    <Init><Actions/></Init>
    <Story name="story">
      <Act name="act">
        <ManeuverGroup name="group" maximumExecutionCount="1">
          <Actors selectTriggeringEntities="false"><EntityRef entityRef="ego"/></Actors>
          <Maneuver name="maneuver">
            <Event name="event" priority="parallel">
              <Action name="hide">
                <PrivateAction><VisibilityAction graphics="false"/></PrivateAction>
              </Action>
            </Event>
          </Maneuver>
        </ManeuverGroup>
        <StartTrigger/>
      </Act>
    </Story>
  </Storyboard>
</OpenSCENARIO>"#
    );
    let (_dir, path) = write_scenario(&xml);
    let err = match Interpreter::load(&path, Arc::new(single_lane_map())) {
        Ok(_) => panic!("expected Interpreter::load to fail"),
        Err(e) => e,
    };
    assert!(err.is_syntax(), "expected a load-time SyntaxError: {}", err);
}
