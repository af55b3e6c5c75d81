//! Stories and acts

use crate::catalog::CatalogCache;
use crate::error::{Error, Result};
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use crate::syntax::maneuver::ManeuverGroup;
use crate::syntax::triggers::Trigger;
use crate::syntax::{declare_parameters, Context, StoryboardElementState};

/// An act: maneuver groups gated by start and stop triggers
#[derive(Debug)]
pub struct Act {
    pub name: String,
    start_trigger: Trigger,
    stop_trigger: Option<Trigger>,
    groups: Vec<ManeuverGroup>,
    state: StoryboardElementState,
}

impl Act {
    pub fn from_xml(node: &XmlNode, scope: &Scope, catalogs: &mut CatalogCache) -> Result<Self> {
        let name = node.required_attribute("name")?.to_string();
        let scope = scope.make_child(&name);
        let start_trigger = Trigger::from_xml(node.required_child("StartTrigger")?, &scope)?;
        let stop_trigger = node
            .child("StopTrigger")
            .map(|trigger| Trigger::from_xml(trigger, &scope))
            .transpose()?;
        let mut groups = Vec::new();
        for group in node.children("ManeuverGroup") {
            groups.push(ManeuverGroup::from_xml(group, &scope, catalogs)?);
        }
        if groups.is_empty() {
            return Err(Error::syntax(format!("act '{}' has no ManeuverGroup", name)));
        }
        Ok(Act {
            name,
            start_trigger,
            stop_trigger,
            groups,
            state: StoryboardElementState::Standby,
        })
    }

    pub fn state(&self) -> StoryboardElementState {
        self.state
    }

    pub fn step(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        match self.state {
            StoryboardElementState::Standby => {
                if self.start_trigger.is_empty() || self.start_trigger.evaluate(ctx)? {
                    self.state = StoryboardElementState::StartTransition;
                }
            }
            StoryboardElementState::StartTransition => {
                tracing::info!(act = %self.name, "act started");
                self.state = StoryboardElementState::Running;
            }
            StoryboardElementState::Running => {
                let stopped = match self.stop_trigger.as_mut() {
                    Some(trigger) => trigger.evaluate(ctx)?,
                    None => false,
                };
                if stopped {
                    self.state = StoryboardElementState::EndTransition;
                } else {
                    for group in &mut self.groups {
                        group.step(ctx)?;
                    }
                    if self.groups.iter().all(|group| group.state().is_complete()) {
                        self.state = StoryboardElementState::EndTransition;
                    }
                }
            }
            StoryboardElementState::EndTransition => {
                tracing::info!(act = %self.name, "act complete");
                self.state = StoryboardElementState::Complete;
            }
            StoryboardElementState::Complete | StoryboardElementState::StopTransition => {}
        }
        ctx.record_state(&self.name, self.state);
        Ok(())
    }
}

/// A story: a parameterizable sequence of acts
#[derive(Debug)]
pub struct Story {
    pub name: String,
    acts: Vec<Act>,
    state: StoryboardElementState,
}

impl Story {
    pub fn from_xml(node: &XmlNode, scope: &Scope, catalogs: &mut CatalogCache) -> Result<Self> {
        let name = node.required_attribute("name")?.to_string();
        let scope = scope.make_child(&name);
        declare_parameters(node, &scope)?;
        let mut acts = Vec::new();
        for act in node.children("Act") {
            acts.push(Act::from_xml(act, &scope, catalogs)?);
        }
        if acts.is_empty() {
            return Err(Error::syntax(format!("story '{}' has no Act", name)));
        }
        Ok(Story {
            name,
            acts,
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
                tracing::info!(story = %self.name, "story started");
                self.state = StoryboardElementState::Running;
            }
            StoryboardElementState::Running => {
                for act in &mut self.acts {
                    act.step(ctx)?;
                }
                if self.acts.iter().all(|act| act.state().is_complete()) {
                    self.state = StoryboardElementState::EndTransition;
                }
            }
            StoryboardElementState::EndTransition => {
                self.state = StoryboardElementState::Complete;
            }
            StoryboardElementState::Complete | StoryboardElementState::StopTransition => {}
        }
        ctx.record_state(&self.name, self.state);
        Ok(())
    }
}
