//! Scenario syntax tree and evaluation
//!
//! Every storyboard element (Story, Act, ManeuverGroup, Maneuver, Event) is a
//! concrete type carrying its lexical scope, its children and a run state.
//! The tree is built once from the parsed XML and then stepped every tick;
//! an element advances at most one state transition per tick, and children
//! are only evaluated while their parent is running.

pub mod actions;
pub mod conditions;
pub mod entities_decl;
pub mod maneuver;
pub mod position;
pub mod story;
pub mod storyboard;
pub mod triggers;

pub use storyboard::Storyboard;

use crate::error::{Error, Result};
use crate::simulation::simulator::Simulator;
use std::collections::HashMap;

/// Run state of a storyboard element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoryboardElementState {
    #[default]
    Standby,
    StartTransition,
    Running,
    EndTransition,
    Complete,
    StopTransition,
}

impl StoryboardElementState {
    /// Schema spelling of the state, as used by
    /// StoryboardElementStateCondition
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryboardElementState::Standby => "standbyState",
            StoryboardElementState::StartTransition => "startTransition",
            StoryboardElementState::Running => "runningState",
            StoryboardElementState::EndTransition => "endTransition",
            StoryboardElementState::Complete => "completeState",
            StoryboardElementState::StopTransition => "stopTransition",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "standbyState" => Ok(StoryboardElementState::Standby),
            "startTransition" => Ok(StoryboardElementState::StartTransition),
            "runningState" => Ok(StoryboardElementState::Running),
            "endTransition" => Ok(StoryboardElementState::EndTransition),
            "completeState" => Ok(StoryboardElementState::Complete),
            "stopTransition" => Ok(StoryboardElementState::StopTransition),
            _ => Err(Error::invalid_enumeration("StoryboardElementState", value)),
        }
    }

    /// True for the states in which an element's children are evaluated
    pub fn is_running(&self) -> bool {
        matches!(self, StoryboardElementState::Running)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StoryboardElementState::Complete)
    }
}

/// Per-tick evaluation context: the simulator plus the element-state
/// registry that StoryboardElementStateCondition reads
pub struct Context<'a> {
    pub simulator: &'a mut Simulator,
    pub element_states: &'a mut HashMap<String, StoryboardElementState>,
}

impl Context<'_> {
    /// Record an element's state under its name
    pub fn record_state(&mut self, name: &str, state: StoryboardElementState) {
        self.element_states.insert(name.to_string(), state);
    }
}

/// Define the ParameterDeclarations of an element into its scope
pub fn declare_parameters(node: &crate::parser::xml::XmlNode, scope: &crate::scope::Scope) -> Result<()> {
    if let Some(declarations) = node.child("ParameterDeclarations") {
        for declaration in declarations.children("ParameterDeclaration") {
            let name = declaration.required_attribute("name")?;
            let value: String =
                crate::parser::reader::read_attribute("value", declaration, scope)?;
            scope.define(
                name.trim_start_matches('$'),
                crate::scope::Object::Parameter { value },
            );
        }
    }
    Ok(())
}
