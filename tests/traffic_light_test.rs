//! Traffic-light phases driven through the simulator loop

mod common;

use common::straight_lanelet;
use scenario_simulator_rs::hdmap::map::{LaneletMap, LaneletNetworkData, RegulatoryElement};
use scenario_simulator_rs::traffic::{TrafficLightArrow, TrafficLightColor};
use scenario_simulator_rs::Simulator;
use std::sync::Arc;

fn map_with_light() -> LaneletMap {
    let mut lanelet = straight_lanelet(100, 0.0, 50.0, 0.0);
    lanelet.regulatory_elements = vec![RegulatoryElement::TrafficLight { light_id: 34802 }];
    LaneletMap::from_data(LaneletNetworkData {
        lanelets: vec![lanelet],
    })
    .unwrap()
}

#[test]
fn lights_are_created_from_map_regulatory_elements() {
    let sim = Simulator::new(Arc::new(map_with_light()));
    assert!(sim.traffic_lights.light(34802).is_ok());
}

#[test]
fn color_cycle_changes_exactly_when_the_phase_expires() {
    // S4: green(30) -> yellow(3) -> red(27) at step 0.1.
    let mut sim = Simulator::new(Arc::new(map_with_light()));
    sim.clock.initialize(1.0, 0.1);
    sim.traffic_lights
        .light_mut(34802)
        .unwrap()
        .set_color_phase(vec![
            (TrafficLightColor::Green, 30.0),
            (TrafficLightColor::Yellow, 3.0),
            (TrafficLightColor::Red, 27.0),
        ]);

    let mut change_ticks: Vec<u64> = Vec::new();
    for _ in 0..305 {
        sim.update_frame().unwrap();
        let light = sim.traffic_lights.light(34802).unwrap();
        if light.color_changed() {
            change_ticks.push(sim.clock.frame());
        }
    }
    // One change in the window, at the tick crossing the 30 s boundary.
    assert_eq!(change_ticks.len(), 1);
    assert!((300..=301).contains(&change_ticks[0]), "{:?}", change_ticks);
    assert_eq!(
        sim.traffic_lights.light(34802).unwrap().color(),
        TrafficLightColor::Yellow
    );
}

#[test]
fn forced_override_reports_one_changed_tick() {
    let mut sim = Simulator::new(Arc::new(map_with_light()));
    sim.traffic_lights
        .light_mut(34802)
        .unwrap()
        .set_color(TrafficLightColor::Red);
    assert!(sim.traffic_lights.light(34802).unwrap().color_changed());
    sim.update_frame().unwrap();
    let light = sim.traffic_lights.light(34802).unwrap();
    assert_eq!(light.color(), TrafficLightColor::Red);
    assert!(!light.color_changed());
}

#[test]
fn arrow_phase_advances_independently() {
    let mut sim = Simulator::new(Arc::new(map_with_light()));
    sim.clock.initialize(1.0, 0.1);
    {
        let light = sim.traffic_lights.light_mut(34802).unwrap();
        light.set_color_phase(vec![(TrafficLightColor::Red, 100.0)]);
        light.set_arrow_phase(vec![
            (TrafficLightArrow::None, 5.0),
            (TrafficLightArrow::Right, 5.0),
        ]);
    }
    for _ in 0..60 {
        sim.update_frame().unwrap();
    }
    let light = sim.traffic_lights.light(34802).unwrap();
    assert_eq!(light.color(), TrafficLightColor::Red);
    assert_eq!(light.arrow(), TrafficLightArrow::Right);
}
