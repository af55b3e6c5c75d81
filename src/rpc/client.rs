//! Blocking RPC client used by external drivers and tests

use crate::entity::parameters::EntityParameters;
use crate::entity::status::EntityStatus;
use crate::error::{Error, Result};
use crate::rpc::protocol::{Request, Response};
use crate::rpc::transport::{is_timeout, TcpTransport, Transport};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Default time a client waits for a response
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking request/response client over any transport
pub struct RpcClient {
    transport: Box<dyn Transport>,
}

impl RpcClient {
    /// Connect over TCP
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Ok(RpcClient {
            transport: Box::new(TcpTransport::connect(host, port)?),
        })
    }

    /// Wrap a pre-connected transport
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        RpcClient { transport }
    }

    /// Send one request and wait for its response. Error responses map to
    /// [`Error::ExecutionFailed`] carrying the server's message.
    pub fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let request = Request::new(method, params);
        let line = serde_json::to_string(&request)
            .map_err(|e| Error::rpc(format!("cannot serialize request: {}", e)))?;
        self.transport.send(&line)?;
        let deadline = Instant::now() + CALL_TIMEOUT;
        let response_line = loop {
            match self.transport.receive() {
                Ok(Some(line)) => break line,
                Ok(None) => return Err(Error::rpc("server closed the connection")),
                Err(e) if is_timeout(&e) && Instant::now() < deadline => continue,
                Err(e) if is_timeout(&e) => return Err(Error::rpc("call timed out")),
                Err(e) => return Err(e),
            }
        };
        let response: Response = serde_json::from_str(&response_line)
            .map_err(|e| Error::rpc(format!("malformed response: {}", e)))?;
        if let Some(error) = response.error {
            return Err(Error::execution_failed(error.message));
        }
        response
            .result
            .ok_or_else(|| Error::rpc("response carries neither result nor error"))
    }

    /// Handshake: configure real-time factor and step time
    pub fn initialize(&mut self, realtime_factor: f64, step_time: f64) -> Result<Value> {
        self.call(
            "initialize",
            json!({"realtime_factor": realtime_factor, "step_time": step_time}),
        )
    }

    /// Advance the simulation one frame
    pub fn update_frame(&mut self) -> Result<Value> {
        self.call("updateFrame", json!({}))
    }

    /// Spawn an entity from parameters, optionally with an initial status
    pub fn spawn_entity(
        &mut self,
        is_ego: bool,
        name: &str,
        parameters: &EntityParameters,
        status: Option<&EntityStatus>,
    ) -> Result<Value> {
        let (entity_type, params) = match parameters {
            EntityParameters::Vehicle(vehicle) => ("vehicle", serde_json::to_value(vehicle)),
            EntityParameters::Pedestrian(pedestrian) => {
                ("pedestrian", serde_json::to_value(pedestrian))
            }
        };
        let params = params.map_err(|e| Error::rpc(format!("cannot serialize params: {}", e)))?;
        let mut body = json!({
            "is_ego": is_ego,
            "name": name,
            "type": entity_type,
            "params": params,
        });
        if let Some(status) = status {
            body["status"] = serde_json::to_value(status)
                .map_err(|e| Error::rpc(format!("cannot serialize status: {}", e)))?;
        }
        self.call("spawnEntity", body)
    }

    pub fn despawn_entity(&mut self, name: &str) -> Result<Value> {
        self.call("despawnEntity", json!({"name": name}))
    }

    pub fn get_entity_status(&mut self, name: &str) -> Result<EntityStatus> {
        let value = self.call("getEntityStatus", json!({"name": name}))?;
        serde_json::from_value(value).map_err(|e| Error::rpc(format!("bad status payload: {}", e)))
    }

    pub fn set_target_speed(&mut self, name: &str, target_speed: f64, continuous: bool) -> Result<Value> {
        self.call(
            "setTargetSpeed",
            json!({"name": name, "target_speed": target_speed, "continuous": continuous}),
        )
    }

    pub fn request_lane_change(&mut self, name: &str, to_lanelet_id: i64) -> Result<Value> {
        self.call(
            "requestLaneChange",
            json!({"name": name, "to_lanelet_id": to_lanelet_id}),
        )
    }

    pub fn request_acquire_position(
        &mut self,
        name: &str,
        lanelet_id: i64,
        s: f64,
        offset: f64,
    ) -> Result<Value> {
        self.call(
            "requestAcquirePosition",
            json!({"name": name, "lanelet_id": lanelet_id, "s": s, "offset": offset}),
        )
    }

    pub fn check_collision(&mut self, name0: &str, name1: &str) -> Result<bool> {
        let value = self.call("checkCollision", json!({"name0": name0, "name1": name1}))?;
        Ok(value
            .get("collision")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }
}
