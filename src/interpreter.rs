//! Scenario loading and the fixed-step evaluation loop
//!
//! Loading parses the OpenSCENARIO document into the syntax tree, seeds the
//! root scope with parameters, catalog locations and entity declarations,
//! and spawns the declared entities (unpositioned until Init teleports
//! them). Each tick then drains inbound RPC requests, advances the
//! storyboard one step and integrates the world one frame; the loop paces
//! itself against the wall clock at the configured real-time factor.

use crate::catalog::{register_catalog_locations, CatalogCache};
use crate::error::{Error, Result};
use crate::hdmap::map::LaneletMap;
use crate::parser::xml::parse_document_file;
use crate::rpc::server::{drain, PendingRequest};
use crate::scope::Scope;
use crate::simulation::simulator::{Simulator, SimulatorApi};
use crate::syntax::storyboard::Storyboard;
use crate::syntax::{declare_parameters, Context, StoryboardElementState};
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// How a finished simulation run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The storyboard completed or its stop trigger fired
    ScenarioComplete,
    /// A shutdown signal interrupted the run
    Interrupted,
}

/// One loaded scenario bound to a simulator
pub struct Interpreter {
    pub simulator: Simulator,
    storyboard: Storyboard,
    element_states: HashMap<String, StoryboardElementState>,
    done: bool,
}

impl Interpreter {
    /// Load a scenario file against a loaded map
    pub fn load<P: AsRef<Path>>(scenario_path: P, map: Arc<LaneletMap>) -> Result<Self> {
        let document = parse_document_file(&scenario_path)?;
        if document.name() != "OpenSCENARIO" {
            return Err(Error::syntax(format!(
                "expected an OpenSCENARIO document, found '{}'",
                document.name()
            )));
        }
        let scope = Scope::make_root(scenario_path.as_ref());
        declare_parameters(&document, &scope)?;
        let mut catalogs = CatalogCache::new();
        if let Some(locations) = document.child("CatalogLocations") {
            register_catalog_locations(locations, &scope)?;
        }
        // RoadNetwork is honored through the externally loaded map; the
        // LogicFile reference is informational here.
        let entities = document.required_child("Entities")?;
        let objects = crate::syntax::entities_decl::parse_entities(entities, &scope, &mut catalogs)?;
        let storyboard =
            Storyboard::from_xml(document.required_child("Storyboard")?, &scope, &mut catalogs)?;

        let mut simulator = Simulator::new(map);
        for object in &objects {
            let is_ego = object.name.eq_ignore_ascii_case("ego");
            simulator.spawn_entity(is_ego, &object.name, object.parameters.clone(), None)?;
        }
        tracing::info!(
            scenario = %scenario_path.as_ref().display(),
            entities = objects.len(),
            "scenario loaded"
        );
        Ok(Interpreter {
            simulator,
            storyboard,
            element_states: HashMap::new(),
            done: false,
        })
    }

    /// True once the storyboard has finished
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Current state registry of the storyboard elements
    pub fn element_states(&self) -> &HashMap<String, StoryboardElementState> {
        &self.element_states
    }

    /// One tick: storyboard evaluation, then world integration. Returns true
    /// when the scenario has finished (the frame in which the end was
    /// detected still completes).
    pub fn step(&mut self) -> Result<bool> {
        if self.done {
            return Ok(true);
        }
        let mut ctx = Context {
            simulator: &mut self.simulator,
            element_states: &mut self.element_states,
        };
        let finished = self.storyboard.evaluate(&mut ctx)?;
        self.simulator.update_frame()?;
        if finished {
            self.done = true;
        }
        Ok(self.done)
    }

    /// Drive the loop to completion at the configured real-time factor,
    /// draining RPC requests at every tick boundary
    pub fn run(
        &mut self,
        queue: Option<&Receiver<PendingRequest>>,
        shutdown: &AtomicBool,
    ) -> Result<RunOutcome> {
        loop {
            let tick_started = Instant::now();
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("shutdown requested; leaving the simulation loop");
                return Ok(RunOutcome::Interrupted);
            }
            if let Some(queue) = queue {
                drain(queue, &mut self.simulator);
            }
            if self.step()? {
                tracing::info!(
                    time = self.simulator.current_time(),
                    "scenario complete"
                );
                return Ok(RunOutcome::ScenarioComplete);
            }
            let wall_step = self.simulator.clock.wall_step();
            let elapsed = tick_started.elapsed();
            if elapsed < wall_step {
                std::thread::sleep(wall_step - elapsed);
            }
        }
    }
}
