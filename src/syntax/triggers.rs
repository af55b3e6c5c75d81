//! Triggers: OR over condition groups, AND within a group

use crate::error::Result;
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use crate::syntax::conditions::Condition;
use crate::syntax::Context;

/// A conjunction of conditions
#[derive(Debug, Clone)]
pub struct ConditionGroup {
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let mut conditions = Vec::new();
        for condition in node.children("Condition") {
            conditions.push(Condition::from_xml(condition, scope)?);
        }
        Ok(ConditionGroup { conditions })
    }

    fn evaluate(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        // Every condition is evaluated so edge histories stay current even
        // after an earlier condition already failed.
        let mut all = true;
        for condition in &mut self.conditions {
            if !condition.evaluate(ctx)? {
                all = false;
            }
        }
        Ok(all && !self.conditions.is_empty())
    }
}

/// A disjunction of condition groups gating a storyboard transition
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    pub condition_groups: Vec<ConditionGroup>,
}

impl Trigger {
    /// Parse a Trigger / StartTrigger / StopTrigger element
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let mut condition_groups = Vec::new();
        for group in node.children("ConditionGroup") {
            condition_groups.push(ConditionGroup::from_xml(group, scope)?);
        }
        Ok(Trigger { condition_groups })
    }

    /// True when any condition group is fully satisfied. A trigger without
    /// groups never fires.
    pub fn evaluate(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        let mut any = false;
        for group in &mut self.condition_groups {
            if group.evaluate(ctx)? {
                any = true;
            }
        }
        Ok(any)
    }

    /// Forget all edge histories (element re-execution)
    pub fn reset(&mut self) {
        for group in &mut self.condition_groups {
            for condition in &mut group.conditions {
                condition.reset();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.condition_groups.is_empty()
    }
}
