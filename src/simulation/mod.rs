//! Simulation clock and the simulator context object

pub mod clock;
pub mod simulator;

pub use clock::SimulationClock;
pub use simulator::{
    LaneChangeTarget, Simulator, SimulatorApi, TelemetryFrame, TrafficLightReport,
};
