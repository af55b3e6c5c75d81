//! Shared fixtures for integration tests
#![allow(dead_code)]

use scenario_simulator_rs::hdmap::geometry::Point;
use scenario_simulator_rs::hdmap::map::{LaneletData, LaneletMap, LaneletNetworkData, TurnDirection};
use std::io::Write;
use std::path::PathBuf;

/// A straight lanelet along +x, 3.5 m wide, centered on the given y
pub fn straight_lanelet(id: i64, start_x: f64, length: f64, y: f64) -> LaneletData {
    let step = 5.0f64.min(length);
    let mut xs = Vec::new();
    let mut x = start_x;
    while x < start_x + length - 1e-9 {
        xs.push(x);
        x += step;
    }
    xs.push(start_x + length);
    let line =
        |offset: f64| -> Vec<Point> { xs.iter().map(|&x| Point::new(x, y + offset, 0.0)).collect() };
    LaneletData {
        id,
        left_bound: line(1.75),
        right_bound: line(-1.75),
        centerline: line(0.0),
        turn_direction: TurnDirection::Else,
        following: Vec::new(),
        previous: Vec::new(),
        left: None,
        right: None,
        conflicting: Vec::new(),
        allows_vehicles: true,
        allows_pedestrians: false,
        speed_limit: None,
        regulatory_elements: Vec::new(),
    }
}

/// One lanelet 100, 50 m long
pub fn single_lane_map() -> LaneletMap {
    LaneletMap::from_data(LaneletNetworkData {
        lanelets: vec![straight_lanelet(100, 0.0, 50.0, 0.0)],
    })
    .unwrap()
}

/// Lanelets 100 -> 200, each 40 m
pub fn two_lane_chain_map() -> LaneletMap {
    let mut first = straight_lanelet(100, 0.0, 40.0, 0.0);
    let mut second = straight_lanelet(200, 40.0, 40.0, 0.0);
    first.following = vec![200];
    second.previous = vec![100];
    LaneletMap::from_data(LaneletNetworkData {
        lanelets: vec![first, second],
    })
    .unwrap()
}

/// Parallel lanelets 100 and 101 (101 one lane to the left), both 120 m
pub fn parallel_lanes_map() -> LaneletMap {
    let mut right = straight_lanelet(100, 0.0, 120.0, 0.0);
    let mut left = straight_lanelet(101, 0.0, 120.0, 3.5);
    right.left = Some(101);
    left.right = Some(100);
    LaneletMap::from_data(LaneletNetworkData {
        lanelets: vec![right, left],
    })
    .unwrap()
}

/// Write a scenario document into a temp dir and return (dir, path)
pub fn write_scenario(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.xosc");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    (dir, path)
}

/// The standard test vehicle declaration
pub const EGO_VEHICLE: &str = r#"
    <ScenarioObject name="ego">
      <Vehicle name="sedan" vehicleCategory="car">
        <BoundingBox>
          <Center x="1.4" y="0.0" z="0.9"/>
          <Dimensions width="2.0" length="4.5" height="1.8"/>
        </BoundingBox>
        <Performance maxSpeed="20" maxAcceleration="3" maxDeceleration="5"/>
        <Axles>
          <FrontAxle maxSteering="0.5" wheelDiameter="0.6" trackWidth="1.8" positionX="2.8" positionZ="0.3"/>
          <RearAxle maxSteering="0.0" wheelDiameter="0.6" trackWidth="1.8" positionX="0.0" positionZ="0.3"/>
        </Axles>
      </Vehicle>
    </ScenarioObject>"#;
