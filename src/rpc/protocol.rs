//! RPC request/response model and method dispatch
//!
//! Requests are JSON objects `{"method": ..., "params": {...}}`; responses
//! carry either a `result` value or an `error` object with a message. The
//! method table lists the required parameter fields per method; requests
//! missing fields are answered with `missing fields: ...` before dispatch.

use crate::entity::parameters::{EntityParameters, PedestrianParameters, VehicleParameters};
use crate::entity::status::EntityStatus;
use crate::error::Error;
use crate::hdmap::map::LaneChangeDirection;
use crate::simulation::simulator::{LaneChangeTarget, Simulator, SimulatorApi};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(method: &str, params: Value) -> Self {
        Request {
            method: method.to_string(),
            params,
        }
    }
}

/// Structured error payload of a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// One RPC response: a result value or an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Response {
            result: Some(result),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response {
            result: None,
            error: Some(ErrorBody {
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<Error> for Response {
    fn from(error: Error) -> Self {
        Response::error(format!("{}", error))
    }
}

/// Required parameter fields per method; `None` for unknown methods
pub fn required_fields(method: &str) -> Option<&'static [&'static str]> {
    Some(match method {
        "initialize" => &["realtime_factor", "step_time"],
        "updateFrame" => &[],
        "spawnEntity" => &["name", "type", "params"],
        "despawnEntity" => &["name"],
        "getEntityStatus" => &["name"],
        "setEntityStatus" => &["name", "status"],
        "requestAcquirePosition" => &["name", "lanelet_id", "s", "offset"],
        "requestLaneChange" => &["name"],
        "setTargetSpeed" => &["name", "target_speed", "continuous"],
        "attachDetectionSensor" => &["name", "spec"],
        "attachLidarSensor" => &["name", "spec"],
        "checkCollision" => &["name0", "name1"],
        _ => return None,
    })
}

/// Validate a request against the method table; `Err` carries the response
/// to send back without dispatching
pub fn validate(request: &Request) -> Result<(), Response> {
    let Some(fields) = required_fields(&request.method) else {
        return Err(Response::error(format!(
            "unknown method: {}",
            request.method
        )));
    };
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|field| request.params.get(field).is_none())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Response::error(format!(
            "missing fields: {}",
            missing.join(", ")
        )))
    }
}

fn field_f64(params: &Value, name: &str) -> Result<f64, Response> {
    params
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| Response::error(format!("field '{}' must be a number", name)))
}

fn field_str<'a>(params: &'a Value, name: &str) -> Result<&'a str, Response> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| Response::error(format!("field '{}' must be a string", name)))
}

/// Apply a validated request to the simulator
pub fn dispatch(simulator: &mut Simulator, request: &Request) -> Response {
    if let Err(response) = validate(request) {
        return response;
    }
    let params = &request.params;
    let outcome = match request.method.as_str() {
        "initialize" => (|| {
            let realtime_factor = field_f64(params, "realtime_factor")?;
            let step_time = field_f64(params, "step_time")?;
            simulator.clock.initialize(realtime_factor, step_time);
            tracing::info!(realtime_factor, step_time, "simulation initialized");
            Ok(json!({"initialized": true}))
        })(),
        "updateFrame" => simulator
            .update_frame()
            .map(|_| json!({"current_time": simulator.current_time()}))
            .map_err(Response::from),
        "spawnEntity" => (|| {
            let name = field_str(params, "name")?;
            let entity_type = field_str(params, "type")?;
            let is_ego = params
                .get("is_ego")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let parameters = match entity_type {
                "vehicle" => serde_json::from_value::<VehicleParameters>(params["params"].clone())
                    .map(EntityParameters::Vehicle)
                    .map_err(|e| Response::error(format!("bad vehicle params: {}", e)))?,
                "pedestrian" => {
                    serde_json::from_value::<PedestrianParameters>(params["params"].clone())
                        .map(EntityParameters::Pedestrian)
                        .map_err(|e| Response::error(format!("bad pedestrian params: {}", e)))?
                }
                other => {
                    return Err(Response::error(format!("unknown entity type: {}", other)))
                }
            };
            let status = match params.get("status") {
                Some(value) if !value.is_null() => Some(
                    serde_json::from_value::<EntityStatus>(value.clone())
                        .map_err(|e| Response::error(format!("bad status: {}", e)))?,
                ),
                _ => None,
            };
            simulator
                .spawn_entity(is_ego, name, parameters, status)
                .map(|_| json!({"spawned": name}))
                .map_err(Response::from)
        })(),
        "despawnEntity" => (|| {
            let name = field_str(params, "name")?;
            simulator
                .despawn_entity(name)
                .map(|_| json!({"despawned": name}))
                .map_err(Response::from)
        })(),
        "getEntityStatus" => (|| {
            let name = field_str(params, "name")?;
            let status = simulator.entity_status(name).map_err(Response::from)?;
            serde_json::to_value(status)
                .map_err(|e| Response::error(format!("serialization failed: {}", e)))
        })(),
        "setEntityStatus" => (|| {
            let name = field_str(params, "name")?;
            let status = serde_json::from_value::<EntityStatus>(params["status"].clone())
                .map_err(|e| Response::error(format!("bad status: {}", e)))?;
            simulator
                .set_entity_status(name, status)
                .map(|_| json!({"updated": name}))
                .map_err(Response::from)
        })(),
        "requestAcquirePosition" => (|| {
            let name = field_str(params, "name")?;
            let lanelet_id = params
                .get("lanelet_id")
                .and_then(Value::as_i64)
                .ok_or_else(|| Response::error("field 'lanelet_id' must be an integer"))?;
            let s = field_f64(params, "s")?;
            let offset = field_f64(params, "offset")?;
            simulator
                .request_acquire_position(name, lanelet_id, s, offset)
                .map(|_| json!({"accepted": true}))
                .map_err(Response::from)
        })(),
        "requestLaneChange" => (|| {
            let name = field_str(params, "name")?;
            let target = if let Some(id) = params.get("to_lanelet_id").and_then(Value::as_i64) {
                LaneChangeTarget::Lanelet(id)
            } else if let Some(direction) = params.get("direction").and_then(Value::as_str) {
                let direction = match direction {
                    "left" => LaneChangeDirection::Left,
                    "right" => LaneChangeDirection::Right,
                    other => {
                        return Err(Response::error(format!(
                            "unknown lane change direction: {}",
                            other
                        )))
                    }
                };
                LaneChangeTarget::Direction(direction)
            } else {
                return Err(Response::error(
                    "missing fields: to_lanelet_id | direction",
                ));
            };
            simulator
                .request_lane_change(name, target)
                .map(|_| json!({"accepted": true}))
                .map_err(Response::from)
        })(),
        "setTargetSpeed" => (|| {
            let name = field_str(params, "name")?;
            let target_speed = field_f64(params, "target_speed")?;
            let continuous = params
                .get("continuous")
                .and_then(Value::as_bool)
                .ok_or_else(|| Response::error("field 'continuous' must be a boolean"))?;
            simulator
                .set_target_speed(name, target_speed, continuous)
                .map(|_| json!({"accepted": true}))
                .map_err(Response::from)
        })(),
        "attachDetectionSensor" => (|| {
            let name = field_str(params, "name")?;
            simulator
                .attach_detection_sensor(name, params["spec"].clone())
                .map(|_| json!({"attached": true}))
                .map_err(Response::from)
        })(),
        "attachLidarSensor" => (|| {
            let name = field_str(params, "name")?;
            simulator
                .attach_lidar_sensor(name, params["spec"].clone())
                .map(|_| json!({"attached": true}))
                .map_err(Response::from)
        })(),
        "checkCollision" => (|| {
            let name0 = field_str(params, "name0")?;
            let name1 = field_str(params, "name1")?;
            simulator
                .check_collision(name0, name1)
                .map(|collision| json!({"collision": collision}))
                .map_err(Response::from)
        })(),
        // validate() already rejected unknown methods.
        other => Err(Response::error(format!("unknown method: {}", other))),
    };
    match outcome {
        Ok(result) => Response::ok(result),
        Err(response) => response,
    }
}
