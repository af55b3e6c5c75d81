//! scenario-simulator-rs: an OpenSCENARIO interpreter and stepwise traffic
//! simulator over lanelet maps
//!
//! The crate consumes an OpenSCENARIO 1.x XML scenario and a lanelet road
//! network, drives a fixed-step simulation of the described entities and
//! evaluates the scenario storyboard every tick until a stop trigger fires.
//! An RPC surface lets an external autonomous-driving stack spawn entities,
//! request maneuvers and read world state between ticks.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use scenario_simulator_rs::{Interpreter, LaneletMap};
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! fn main() -> scenario_simulator_rs::Result<()> {
//!     let map = Arc::new(LaneletMap::load_json_file("map.json")?);
//!     let mut interpreter = Interpreter::load("scenario.xosc", map)?;
//!     interpreter.run(None, &AtomicBool::new(false))?;
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod catalog;
pub mod entity;
pub mod error;
pub mod expression;
pub mod hdmap;
pub mod interpreter;
pub mod parser;
pub mod rpc;
pub mod scope;
pub mod simulation;
pub mod syntax;
pub mod traffic;

// Re-export core types for convenience
pub use error::{Error, Result};
pub use hdmap::map::{LaneletMap, LaneletNetworkData};
pub use interpreter::{Interpreter, RunOutcome};
pub use simulation::simulator::{Simulator, SimulatorApi};

// Re-export the scenario surface
pub use entity::{EntityManager, EntityParameters, EntityStatus, LaneletPose};
pub use scope::Scope;
pub use syntax::Storyboard;

// Re-export the RPC surface
pub use rpc::{RpcClient, RpcServer};

use std::path::Path;
use std::sync::Arc;

/// Load a lanelet map and a scenario file in one call
///
/// This is a convenience wrapper around [`LaneletMap::load_json_file`] and
/// [`Interpreter::load`].
pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(scenario: P, map_file: Q) -> Result<Interpreter> {
    let map = Arc::new(LaneletMap::load_json_file(map_file)?);
    Interpreter::load(scenario, map)
}
