//! RPC protocol behavior: dispatch, validation, errors and the server loop

mod common;

use common::single_lane_map;
use scenario_simulator_rs::rpc::protocol::{dispatch, Request};
use scenario_simulator_rs::rpc::server::{drain, request_channel, RpcServer};
use scenario_simulator_rs::rpc::transport::ChannelTransport;
use scenario_simulator_rs::rpc::RpcClient;
use scenario_simulator_rs::Simulator;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn vehicle_params_json() -> serde_json::Value {
    json!({
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
    })
}

#[test]
fn get_entity_status_before_teleport_reports_the_teleport_error() {
    // S6: the error message names the missing Teleport Action.
    let mut sim = Simulator::new(Arc::new(single_lane_map()));
    let spawn = Request::new(
        "spawnEntity",
        json!({"name": "npc", "type": "vehicle", "params": vehicle_params_json()}),
    );
    assert!(!dispatch(&mut sim, &spawn).is_error());

    let status = Request::new("getEntityStatus", json!({"name": "npc"}));
    let response = dispatch(&mut sim, &status);
    let message = response.error.expect("must fail").message;
    assert!(message.contains("position"), "message: {}", message);
    assert!(
        message.contains("not specified by Teleport Action"),
        "message: {}",
        message
    );
}

#[test]
fn missing_fields_are_reported_with_their_names() {
    let mut sim = Simulator::new(Arc::new(single_lane_map()));
    let request = Request::new("requestAcquirePosition", json!({"name": "npc"}));
    let response = dispatch(&mut sim, &request);
    let message = response.error.expect("must fail").message;
    assert!(message.starts_with("missing fields:"), "{}", message);
    assert!(message.contains("lanelet_id"));
    assert!(message.contains("s"));
    assert!(message.contains("offset"));
}

#[test]
fn update_frame_advances_time_exactly() {
    // Tick monotonicity: after N frames, current_time == N * step_time.
    let mut sim = Simulator::new(Arc::new(single_lane_map()));
    let init = Request::new(
        "initialize",
        json!({"realtime_factor": 10.0, "step_time": 0.05}),
    );
    assert!(!dispatch(&mut sim, &init).is_error());
    for _ in 0..40 {
        let response = dispatch(&mut sim, &Request::new("updateFrame", json!({})));
        assert!(!response.is_error());
    }
    assert_eq!(sim.clock.current_time(), 40.0 * 0.05);
}

#[test]
fn spawn_set_status_and_collision_round_trip() {
    let mut sim = Simulator::new(Arc::new(single_lane_map()));
    for name in ["a", "b"] {
        let spawn = Request::new(
            "spawnEntity",
            json!({"name": name, "type": "vehicle", "params": vehicle_params_json()}),
        );
        assert!(!dispatch(&mut sim, &spawn).is_error());
        let set = Request::new(
            "setEntityStatus",
            json!({"name": name, "status": {
                "time": 0.0,
                "coordinate": "lane",
                "pose": {"position": {"x": 0.0, "y": 0.0, "z": 0.0},
                          "rpy": {"x": 0.0, "y": 0.0, "z": 0.0}},
                "lanelet_pose": {"lanelet_id": 100, "s": 10.0, "offset": 0.0,
                                  "rpy": {"x": 0.0, "y": 0.0, "z": 0.0}},
                "twist": {"linear": {"x": 0.0, "y": 0.0, "z": 0.0},
                           "angular": {"x": 0.0, "y": 0.0, "z": 0.0}},
                "accel": {"linear": {"x": 0.0, "y": 0.0, "z": 0.0},
                           "angular": {"x": 0.0, "y": 0.0, "z": 0.0}},
                "action_status": "",
                "traveled_distance": 0.0
            }}),
        );
        let response = dispatch(&mut sim, &set);
        assert!(!response.is_error(), "{:?}", response.error);
    }
    let check = Request::new("checkCollision", json!({"name0": "a", "name1": "b"}));
    let response = dispatch(&mut sim, &check);
    assert_eq!(response.result.unwrap()["collision"], json!(true));

    // Despawn is deferred: the entity answers status queries until the next
    // frame boundary.
    let despawn = Request::new("despawnEntity", json!({"name": "b"}));
    assert!(!dispatch(&mut sim, &despawn).is_error());
    let status = Request::new("getEntityStatus", json!({"name": "b"}));
    assert!(!dispatch(&mut sim, &status).is_error());
    assert!(!dispatch(&mut sim, &Request::new("updateFrame", json!({}))).is_error());
    assert!(dispatch(&mut sim, &status).is_error());
}

#[test]
fn full_client_server_round_trip_over_the_in_process_transport() {
    let (client_end, server_end) = ChannelTransport::pair();
    let (queue_tx, queue_rx) = request_channel();
    let server = RpcServer::spawn_with_transport(Box::new(server_end), queue_tx);

    let mut sim = Simulator::new(Arc::new(single_lane_map()));
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    // A stand-in simulation thread draining the queue at tick cadence.
    let sim_thread = std::thread::spawn(move || {
        while !thread_stop.load(std::sync::atomic::Ordering::Relaxed) {
            drain(&queue_rx, &mut sim);
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    let mut client = RpcClient::with_transport(Box::new(client_end));
    let result = client.initialize(1.0, 0.05).unwrap();
    assert_eq!(result["initialized"], json!(true));
    client.update_frame().unwrap();
    let err = client.get_entity_status("nobody").unwrap_err();
    assert!(matches!(
        err,
        scenario_simulator_rs::Error::ExecutionFailed { .. }
    ));
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    server.shutdown();
    let _ = sim_thread.join();
}
