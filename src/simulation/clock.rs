//! The monotonic simulation clock

use std::time::Duration;

/// Fixed-step simulation clock. Current time is derived from the tick count
/// so that after N frames it equals exactly N * step_time.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    realtime_factor: f64,
    step_time: f64,
    ticks: u64,
}

impl SimulationClock {
    pub fn new(realtime_factor: f64, step_time: f64) -> Self {
        SimulationClock {
            realtime_factor: realtime_factor.max(f64::MIN_POSITIVE),
            step_time,
            ticks: 0,
        }
    }

    /// Reconfigure the clock (RPC initialize); resets the tick count
    pub fn initialize(&mut self, realtime_factor: f64, step_time: f64) {
        self.realtime_factor = realtime_factor.max(f64::MIN_POSITIVE);
        self.step_time = step_time;
        self.ticks = 0;
    }

    /// Advance one frame
    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    /// Simulation-time seconds since start
    pub fn current_time(&self) -> f64 {
        self.ticks as f64 * self.step_time
    }

    pub fn step_time(&self) -> f64 {
        self.step_time
    }

    pub fn realtime_factor(&self) -> f64 {
        self.realtime_factor
    }

    pub fn frame(&self) -> u64 {
        self.ticks
    }

    /// Wall-clock duration of one frame at the configured real-time factor
    pub fn wall_step(&self) -> Duration {
        Duration::from_secs_f64((self.step_time / self.realtime_factor).max(0.0))
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        SimulationClock::new(1.0, 0.05)
    }
}
