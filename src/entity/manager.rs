//! Entity registry and per-tick update driver
//!
//! Entities are stored in insertion order and updated in that order every
//! tick. Despawn requests are queued and applied at the end of the tick so
//! evaluation never invalidates the iteration; traffic sinks run after the
//! queue drains, which defers their despawns to the next tick.

use crate::entity::kinematics::Entity;
use crate::entity::parameters::EntityParameters;
use crate::entity::status::EntityStatus;
use crate::error::{Error, Result};
use crate::hdmap::map::LaneletMap;
use crate::traffic::sink::TrafficSink;
use indexmap::IndexMap;

/// Registry of all simulated entities
#[derive(Debug, Default)]
pub struct EntityManager {
    entities: IndexMap<String, Entity>,
    despawn_queue: Vec<String>,
    sinks: Vec<TrafficSink>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity; duplicate names fail
    pub fn spawn(
        &mut self,
        is_ego: bool,
        name: &str,
        parameters: EntityParameters,
        status: Option<EntityStatus>,
        map: &LaneletMap,
    ) -> Result<()> {
        if self.entities.contains_key(name) {
            return Err(Error::semantic(format!(
                "an entity named '{}' already exists",
                name
            )));
        }
        let mut entity = Entity::new(is_ego, name, parameters);
        if let Some(status) = status {
            entity.set_status(status, map);
        }
        tracing::info!(name, is_ego, "entity spawned");
        self.entities.insert(name.to_string(), entity);
        Ok(())
    }

    /// Queue an entity for removal at the end of the current tick
    pub fn despawn(&mut self, name: &str) -> Result<()> {
        if !self.entities.contains_key(name) {
            return Err(Error::semantic(format!("no entity named '{}'", name)));
        }
        if !self.despawn_queue.iter().any(|queued| queued == name) {
            self.despawn_queue.push(name.to_string());
        }
        Ok(())
    }

    /// Entity by name
    pub fn entity(&self, name: &str) -> Result<&Entity> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::semantic(format!("no entity named '{}'", name)))
    }

    /// Entity by name, mutable
    pub fn entity_mut(&mut self, name: &str) -> Result<&mut Entity> {
        self.entities
            .get_mut(name)
            .ok_or_else(|| Error::semantic(format!("no entity named '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Entity names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Register a traffic sink
    pub fn add_sink(&mut self, sink: TrafficSink) {
        self.sinks.push(sink);
    }

    /// Advance every entity one tick, in insertion order
    pub fn integrate(
        &mut self,
        step_time: f64,
        current_time: f64,
        map: &LaneletMap,
    ) -> Result<()> {
        for entity in self.entities.values_mut() {
            entity.update(step_time, current_time, map)?;
        }
        Ok(())
    }

    /// Drain the despawn queue, then run the traffic sinks. Runs after
    /// telemetry for the tick has been emitted, so a despawn requested during
    /// the tick is still observable in that tick's telemetry; sink despawns
    /// are queued here and take effect one tick later.
    pub fn finalize_frame(&mut self, map: &LaneletMap) {
        for name in self.despawn_queue.drain(..) {
            if self.entities.shift_remove(&name).is_some() {
                tracing::info!(name, "entity despawned");
            }
        }
        let mut caught: Vec<String> = Vec::new();
        for sink in &self.sinks {
            for entity in self.entities.values() {
                if let Some(pose) = entity.world_pose(map) {
                    if sink.catches(&pose.position) {
                        caught.push(entity.name.clone());
                    }
                }
            }
        }
        for name in caught {
            let _ = self.despawn(&name);
        }
    }

    /// Full per-tick update: integrate, then drain despawns and run sinks
    pub fn update_frame(
        &mut self,
        step_time: f64,
        current_time: f64,
        map: &LaneletMap,
    ) -> Result<()> {
        self.integrate(step_time, current_time, map)?;
        self.finalize_frame(map);
        Ok(())
    }
}
