//! Maneuver groups, maneuvers and events
//!
//! Events are the leaves of the storyboard control tree: they own the
//! actions and the start triggers. Their priority attribute governs
//! concurrency within a maneuver: `overwrite` cancels running siblings
//! (through the stop transition), `skip` suppresses its own start while a
//! sibling runs, `parallel` starts freely.

use crate::catalog::CatalogCache;
use crate::error::{Error, Result};
use crate::parser::reader::read_attribute_or;
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use crate::syntax::actions::Action;
use crate::syntax::triggers::Trigger;
use crate::syntax::{declare_parameters, Context, StoryboardElementState};

/// Execution priority of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Overwrite,
    Parallel,
    Skip,
}

impl Priority {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "overwrite" => Ok(Priority::Overwrite),
            "parallel" => Ok(Priority::Parallel),
            "skip" => Ok(Priority::Skip),
            _ => Err(Error::invalid_enumeration("Priority", value)),
        }
    }
}

/// A storyboard event: actions gated by a start trigger
#[derive(Debug)]
pub struct Event {
    pub name: String,
    pub priority: Priority,
    pub maximum_execution_count: u32,
    executions: u32,
    start_trigger: Option<Trigger>,
    actions: Vec<Action>,
    state: StoryboardElementState,
}

impl Event {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let name = node.required_attribute("name")?.to_string();
        let scope = scope.make_child(&name);
        let priority = Priority::parse(node.required_attribute("priority")?)?;
        let maximum_execution_count =
            read_attribute_or("maximumExecutionCount", node, &scope, 1u32)?;
        let start_trigger = node
            .child("StartTrigger")
            .map(|trigger| Trigger::from_xml(trigger, &scope))
            .transpose()?;
        let mut actions = Vec::new();
        for action in node.children("Action") {
            actions.push(Action::from_story_xml(action, &scope)?);
        }
        if actions.is_empty() {
            return Err(Error::syntax(format!("event '{}' has no Action", name)));
        }
        Ok(Event {
            name,
            priority,
            maximum_execution_count,
            executions: 0,
            start_trigger,
            actions,
            state: StoryboardElementState::Standby,
        })
    }

    pub fn state(&self) -> StoryboardElementState {
        self.state
    }

    /// True while the event occupies the maneuver (for skip/overwrite logic)
    fn is_active(&self) -> bool {
        matches!(
            self.state,
            StoryboardElementState::StartTransition | StoryboardElementState::Running
        )
    }

    fn wants_start(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        if self.state != StoryboardElementState::Standby {
            return Ok(false);
        }
        match self.start_trigger.as_mut() {
            Some(trigger) => trigger.evaluate(ctx),
            None => Ok(true),
        }
    }

    /// One state transition for this tick (start decisions are made by the
    /// enclosing maneuver)
    fn step_machine(&mut self, ctx: &mut Context<'_>, actors: &[String]) -> Result<()> {
        match self.state {
            StoryboardElementState::Standby | StoryboardElementState::Complete => {}
            StoryboardElementState::StartTransition => {
                for action in &mut self.actions {
                    action.start(ctx, actors)?;
                }
                tracing::debug!(event = %self.name, "event running");
                self.state = StoryboardElementState::Running;
            }
            StoryboardElementState::Running => {
                let mut complete = true;
                for action in &mut self.actions {
                    if !action.update(ctx, actors)? {
                        complete = false;
                    }
                }
                if complete {
                    self.state = StoryboardElementState::EndTransition;
                }
            }
            StoryboardElementState::EndTransition => {
                self.executions += 1;
                if self.executions < self.maximum_execution_count {
                    self.rearm();
                } else {
                    self.state = StoryboardElementState::Complete;
                }
            }
            StoryboardElementState::StopTransition => {
                self.executions += 1;
                self.state = StoryboardElementState::Complete;
            }
        }
        Ok(())
    }

    fn rearm(&mut self) {
        self.state = StoryboardElementState::Standby;
        if let Some(trigger) = self.start_trigger.as_mut() {
            trigger.reset();
        }
        for action in &mut self.actions {
            action.reset();
        }
    }

    /// Full re-arm for a new maneuver-group execution
    fn reset(&mut self) {
        self.rearm();
        self.executions = 0;
    }
}

/// A sequence of events acting on the same actors
#[derive(Debug)]
pub struct Maneuver {
    pub name: String,
    events: Vec<Event>,
    state: StoryboardElementState,
}

impl Maneuver {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let name = node.required_attribute("name")?.to_string();
        let scope = scope.make_child(&name);
        declare_parameters(node, &scope)?;
        let mut events = Vec::new();
        for event in node.children("Event") {
            events.push(Event::from_xml(event, &scope)?);
        }
        if events.is_empty() {
            return Err(Error::syntax(format!("maneuver '{}' has no Event", name)));
        }
        Ok(Maneuver {
            name,
            events,
            state: StoryboardElementState::Standby,
        })
    }

    pub fn state(&self) -> StoryboardElementState {
        self.state
    }

    fn step(&mut self, ctx: &mut Context<'_>, actors: &[String]) -> Result<()> {
        match self.state {
            StoryboardElementState::Standby => {
                self.state = StoryboardElementState::StartTransition;
            }
            StoryboardElementState::StartTransition => {
                self.state = StoryboardElementState::Running;
            }
            StoryboardElementState::Running => {
                self.step_events(ctx, actors)?;
                if self.events.iter().all(|event| event.state().is_complete()) {
                    self.state = StoryboardElementState::EndTransition;
                }
            }
            StoryboardElementState::EndTransition => {
                self.state = StoryboardElementState::Complete;
            }
            StoryboardElementState::Complete | StoryboardElementState::StopTransition => {}
        }
        ctx.record_state(&self.name, self.state);
        for event in &self.events {
            ctx.record_state(&event.name, event.state());
        }
        Ok(())
    }

    fn step_events(&mut self, ctx: &mut Context<'_>, actors: &[String]) -> Result<()> {
        // Phase A: start decisions under the priority rules.
        let mut starting: Vec<usize> = Vec::new();
        let mut stopping: Vec<usize> = Vec::new();
        for index in 0..self.events.len() {
            if !self.events[index].wants_start(ctx)? {
                continue;
            }
            match self.events[index].priority {
                Priority::Skip => {
                    let sibling_active = self
                        .events
                        .iter()
                        .enumerate()
                        .any(|(other, event)| other != index && event.is_active());
                    if sibling_active {
                        continue;
                    }
                    starting.push(index);
                }
                Priority::Overwrite => {
                    for (other, event) in self.events.iter().enumerate() {
                        if other != index && event.is_active() {
                            stopping.push(other);
                        }
                    }
                    starting.push(index);
                }
                Priority::Parallel => starting.push(index),
            }
        }
        // Phase B: exactly one transition per event this tick.
        for (index, event) in self.events.iter_mut().enumerate() {
            if starting.contains(&index) {
                event.state = StoryboardElementState::StartTransition;
            } else if stopping.contains(&index) {
                tracing::debug!(event = %event.name, "event overwritten");
                event.state = StoryboardElementState::StopTransition;
            } else {
                event.step_machine(ctx, actors)?;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = StoryboardElementState::Standby;
        for event in &mut self.events {
            event.reset();
        }
    }
}

/// Maneuvers plus the actor entities they steer
#[derive(Debug)]
pub struct ManeuverGroup {
    pub name: String,
    pub maximum_execution_count: u32,
    executions: u32,
    pub actors: Vec<String>,
    maneuvers: Vec<Maneuver>,
    state: StoryboardElementState,
}

impl ManeuverGroup {
    pub fn from_xml(node: &XmlNode, scope: &Scope, catalogs: &mut CatalogCache) -> Result<Self> {
        let name = node.required_attribute("name")?.to_string();
        let scope = scope.make_child(&name);
        let maximum_execution_count =
            read_attribute_or("maximumExecutionCount", node, &scope, 1u32)?;
        let actors_node = node.required_child("Actors")?;
        let mut actors = Vec::new();
        for entity in actors_node.children("EntityRef") {
            let actor: String =
                crate::parser::reader::read_attribute("entityRef", entity, &scope)?;
            // Actor references must name declared entities.
            scope.global().entity_ref(&actor)?;
            actors.push(actor);
        }
        let mut maneuvers = Vec::new();
        for maneuver in node.children("Maneuver") {
            maneuvers.push(Maneuver::from_xml(maneuver, &scope)?);
        }
        for reference in node.children("CatalogReference") {
            let (entry, entry_scope) = catalogs.resolve_reference(reference, &scope)?;
            if entry.name() != "Maneuver" {
                return Err(Error::unsupported_element(entry.name(), "CatalogReference"));
            }
            maneuvers.push(Maneuver::from_xml(&entry, &entry_scope)?);
        }
        if maneuvers.is_empty() {
            return Err(Error::syntax(format!(
                "maneuver group '{}' has no Maneuver",
                name
            )));
        }
        Ok(ManeuverGroup {
            name,
            maximum_execution_count,
            executions: 0,
            actors,
            maneuvers,
            state: StoryboardElementState::Standby,
        })
    }

    pub fn state(&self) -> StoryboardElementState {
        self.state
    }

    pub fn step(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        match self.state {
            StoryboardElementState::Standby => {
                self.state = StoryboardElementState::StartTransition;
            }
            StoryboardElementState::StartTransition => {
                tracing::debug!(group = %self.name, "maneuver group running");
                self.state = StoryboardElementState::Running;
            }
            StoryboardElementState::Running => {
                let actors = self.actors.clone();
                for maneuver in &mut self.maneuvers {
                    maneuver.step(ctx, &actors)?;
                }
                if self
                    .maneuvers
                    .iter()
                    .all(|maneuver| maneuver.state().is_complete())
                {
                    self.state = StoryboardElementState::EndTransition;
                }
            }
            StoryboardElementState::EndTransition => {
                self.executions += 1;
                if self.executions < self.maximum_execution_count {
                    for maneuver in &mut self.maneuvers {
                        maneuver.reset();
                    }
                    self.state = StoryboardElementState::Standby;
                } else {
                    self.state = StoryboardElementState::Complete;
                }
            }
            StoryboardElementState::Complete | StoryboardElementState::StopTransition => {}
        }
        ctx.record_state(&self.name, self.state);
        Ok(())
    }
}
