//! Traffic lights with cyclic color and arrow phases
//!
//! Each light carries two independent phase rings, one for the color and one
//! for the arrow. A ring is a cyclic sequence of (state, duration) pairs with
//! an elapsed-time cursor. Forcing a state from outside clears the cursor and
//! raises the changed flag for the current tick; flags are cleared at the
//! start of the next update.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Color state of a traffic light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLightColor {
    Green,
    Yellow,
    Red,
    #[default]
    None,
}

/// Arrow state of a traffic light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLightArrow {
    Straight,
    Left,
    Right,
    #[default]
    None,
}

/// A cyclic sequence of (state, duration) pairs with an elapsed cursor
#[derive(Debug, Clone)]
pub struct TrafficLightPhase<T: Copy + PartialEq> {
    sequence: Vec<(T, f64)>,
    index: usize,
    elapsed: f64,
    pub state: T,
}

impl<T: Copy + PartialEq + Default> Default for TrafficLightPhase<T> {
    fn default() -> Self {
        TrafficLightPhase {
            sequence: Vec::new(),
            index: 0,
            elapsed: 0.0,
            state: T::default(),
        }
    }
}

impl<T: Copy + PartialEq> TrafficLightPhase<T> {
    /// Install a phase ring and start it at its first state
    pub fn set_sequence(&mut self, sequence: Vec<(T, f64)>) {
        if let Some((state, _)) = sequence.first() {
            self.state = *state;
        }
        self.sequence = sequence;
        self.index = 0;
        self.elapsed = 0.0;
    }

    /// Force a state from outside, clearing the cursor
    pub fn force_state(&mut self, state: T) {
        self.state = state;
        self.elapsed = 0.0;
    }

    /// Advance by one tick; returns true when the state changed
    pub fn update(&mut self, step_time: f64) -> bool {
        if self.sequence.is_empty() || self.sequence.iter().all(|(_, duration)| *duration <= 0.0) {
            return false;
        }
        self.elapsed += step_time;
        let mut changed = false;
        while self.elapsed >= self.sequence[self.index].1 {
            self.elapsed -= self.sequence[self.index].1;
            self.index = (self.index + 1) % self.sequence.len();
            self.state = self.sequence[self.index].0;
            changed = true;
        }
        changed
    }
}

/// One traffic light with color and arrow phases
#[derive(Debug, Default)]
pub struct TrafficLight {
    pub id: i64,
    color_phase: TrafficLightPhase<TrafficLightColor>,
    arrow_phase: TrafficLightPhase<TrafficLightArrow>,
    color_changed: bool,
    arrow_changed: bool,
}

impl TrafficLight {
    pub fn new(id: i64) -> Self {
        TrafficLight {
            id,
            ..Default::default()
        }
    }

    pub fn color(&self) -> TrafficLightColor {
        self.color_phase.state
    }

    pub fn arrow(&self) -> TrafficLightArrow {
        self.arrow_phase.state
    }

    pub fn color_changed(&self) -> bool {
        self.color_changed
    }

    pub fn arrow_changed(&self) -> bool {
        self.arrow_changed
    }

    /// Install a cyclic color sequence
    pub fn set_color_phase(&mut self, sequence: Vec<(TrafficLightColor, f64)>) {
        self.color_phase.set_sequence(sequence);
    }

    /// Install a cyclic arrow sequence
    pub fn set_arrow_phase(&mut self, sequence: Vec<(TrafficLightArrow, f64)>) {
        self.arrow_phase.set_sequence(sequence);
    }

    /// Force the color; the changed flag holds for the current tick
    pub fn set_color(&mut self, color: TrafficLightColor) {
        self.color_phase.force_state(color);
        self.color_changed = true;
    }

    /// Force the arrow; the changed flag holds for the current tick
    pub fn set_arrow(&mut self, arrow: TrafficLightArrow) {
        self.arrow_phase.force_state(arrow);
        self.arrow_changed = true;
    }

    /// Advance both phases one tick. Changed flags are cleared first, so a
    /// flag observed after update(dt) refers to this tick only.
    pub fn update(&mut self, step_time: f64) {
        self.color_changed = false;
        self.arrow_changed = false;
        if self.color_phase.update(step_time) {
            self.color_changed = true;
        }
        if self.arrow_phase.update(step_time) {
            self.arrow_changed = true;
        }
    }
}

/// All traffic lights of the map, keyed by id
#[derive(Debug, Default)]
pub struct TrafficLightManager {
    lights: IndexMap<i64, TrafficLight>,
}

impl TrafficLightManager {
    /// Create one light per id referenced by the map's regulatory elements
    pub fn from_light_ids(ids: &[i64]) -> Self {
        let mut lights = IndexMap::new();
        for id in ids {
            lights.insert(*id, TrafficLight::new(*id));
        }
        TrafficLightManager { lights }
    }

    pub fn light(&self, id: i64) -> Result<&TrafficLight> {
        self.lights
            .get(&id)
            .ok_or_else(|| Error::semantic(format!("no traffic light with id {}", id)))
    }

    pub fn light_mut(&mut self, id: i64) -> Result<&mut TrafficLight> {
        self.lights
            .get_mut(&id)
            .ok_or_else(|| Error::semantic(format!("no traffic light with id {}", id)))
    }

    pub fn lights(&self) -> impl Iterator<Item = &TrafficLight> {
        self.lights.values()
    }

    /// Advance every light one tick
    pub fn update(&mut self, step_time: f64) {
        for light in self.lights.values_mut() {
            light.update(step_time);
        }
    }
}
