//! Condition types and their evaluation over entity and simulation state

use crate::error::{Error, Result};
use crate::parser::reader::{read_attribute, read_attribute_or};
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use crate::syntax::position::Position;
use crate::syntax::{Context, StoryboardElementState};

/// Tolerance for equalTo comparisons on doubles
const EQUALITY_EPSILON: f64 = 1e-6;

/// Comparison rule of a numeric condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    GreaterThan,
    LessThan,
    EqualTo,
}

impl Rule {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "greaterThan" => Ok(Rule::GreaterThan),
            "lessThan" => Ok(Rule::LessThan),
            "equalTo" => Ok(Rule::EqualTo),
            _ => Err(Error::invalid_enumeration("Rule", value)),
        }
    }

    /// Apply the rule; NaN operands make every rule false, letting NaN
    /// sentinels propagate as "not satisfied"
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Rule::GreaterThan => lhs > rhs,
            Rule::LessThan => lhs < rhs,
            Rule::EqualTo => (lhs - rhs).abs() < EQUALITY_EPSILON,
        }
    }
}

/// Edge filter applied on top of a condition's raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionEdge {
    #[default]
    None,
    Rising,
    Falling,
    RisingOrFalling,
}

impl ConditionEdge {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "none" => Ok(ConditionEdge::None),
            "rising" => Ok(ConditionEdge::Rising),
            "falling" => Ok(ConditionEdge::Falling),
            "risingOrFalling" => Ok(ConditionEdge::RisingOrFalling),
            _ => Err(Error::invalid_enumeration("ConditionEdge", value)),
        }
    }
}

/// How the results over several triggering entities combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggeringEntitiesRule {
    All,
    Any,
}

impl TriggeringEntitiesRule {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "all" => Ok(TriggeringEntitiesRule::All),
            "any" => Ok(TriggeringEntitiesRule::Any),
            _ => Err(Error::invalid_enumeration("TriggeringEntitiesRule", value)),
        }
    }
}

/// The entities a by-entity condition evaluates over
#[derive(Debug, Clone)]
pub struct TriggeringEntities {
    pub rule: TriggeringEntitiesRule,
    pub entity_refs: Vec<String>,
}

impl TriggeringEntities {
    fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let rule =
            TriggeringEntitiesRule::parse(node.required_attribute("triggeringEntitiesRule")?)?;
        let mut entity_refs = Vec::new();
        for entity in node.children("EntityRef") {
            entity_refs.push(read_attribute("entityRef", entity, scope)?);
        }
        if entity_refs.is_empty() {
            return Err(Error::syntax("TriggeringEntities lists no EntityRef"));
        }
        Ok(TriggeringEntities { rule, entity_refs })
    }
}

/// How a relative distance is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDistanceType {
    Longitudinal,
    Lateral,
    Cartesian,
}

impl RelativeDistanceType {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "longitudinal" => Ok(RelativeDistanceType::Longitudinal),
            "lateral" => Ok(RelativeDistanceType::Lateral),
            "cartesianDistance" => Ok(RelativeDistanceType::Cartesian),
            _ => Err(Error::invalid_enumeration("RelativeDistanceType", value)),
        }
    }
}

#[derive(Debug, Clone)]
enum EntityConditionKind {
    ReachPosition {
        position: Position,
        tolerance: f64,
    },
    Distance {
        position: Position,
        value: f64,
        rule: Rule,
    },
    RelativeDistance {
        entity_ref: String,
        distance_type: RelativeDistanceType,
        value: f64,
        rule: Rule,
    },
    TimeHeadway {
        entity_ref: String,
        value: f64,
        rule: Rule,
    },
    StandStill {
        duration: f64,
    },
    Acceleration {
        value: f64,
        rule: Rule,
    },
    Speed {
        value: f64,
        rule: Rule,
    },
    Collision {
        entity_ref: String,
    },
    TraveledDistance {
        value: f64,
    },
}

#[derive(Debug, Clone)]
enum ValueConditionKind {
    SimulationTime {
        value: f64,
        rule: Rule,
    },
    Parameter {
        parameter_ref: String,
        value: String,
        rule: Rule,
    },
    StoryboardElementState {
        element_ref: String,
        state: StoryboardElementState,
    },
}

#[derive(Debug, Clone)]
enum ConditionKind {
    ByEntity {
        triggering_entities: TriggeringEntities,
        kind: EntityConditionKind,
    },
    ByValue(ValueConditionKind),
}

/// One condition with its edge filter and previous-value tracking
#[derive(Debug, Clone)]
pub struct Condition {
    pub name: String,
    pub edge: ConditionEdge,
    kind: ConditionKind,
    scope: Scope,
    previous: Option<bool>,
}

impl Condition {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let name = node.attribute("name").unwrap_or_default().to_string();
        let delay: f64 = read_attribute_or("delay", node, scope, 0.0)?;
        if delay != 0.0 {
            return Err(Error::syntax(format!(
                "condition '{}' uses delay {}, but only delay 0 is supported",
                name, delay
            )));
        }
        let edge = match node.attribute("conditionEdge") {
            Some(raw) => ConditionEdge::parse(raw)?,
            None => ConditionEdge::None,
        };
        let kind = if let Some(by_entity) = node.child("ByEntityCondition") {
            let triggering_entities = TriggeringEntities::from_xml(
                by_entity.required_child("TriggeringEntities")?,
                scope,
            )?;
            let entity_condition = by_entity.required_child("EntityCondition")?;
            let inner = entity_condition
                .all_children()
                .first()
                .ok_or_else(|| Error::syntax("EntityCondition has no child"))?;
            ConditionKind::ByEntity {
                triggering_entities,
                kind: parse_entity_condition(inner, scope)?,
            }
        } else if let Some(by_value) = node.child("ByValueCondition") {
            let inner = by_value
                .all_children()
                .first()
                .ok_or_else(|| Error::syntax("ByValueCondition has no child"))?;
            ConditionKind::ByValue(parse_value_condition(inner, scope)?)
        } else {
            return Err(Error::syntax(format!(
                "condition '{}' carries neither ByEntityCondition nor ByValueCondition",
                name
            )));
        };
        Ok(Condition {
            name,
            edge,
            kind,
            scope: scope.clone(),
            previous: None,
        })
    }

    /// Evaluate the condition, applying the edge filter
    pub fn evaluate(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        let raw = self.evaluate_raw(ctx)?;
        let previous = self.previous.replace(raw);
        Ok(match self.edge {
            ConditionEdge::None => raw,
            ConditionEdge::Rising => raw && previous == Some(false),
            ConditionEdge::Falling => !raw && previous == Some(true),
            ConditionEdge::RisingOrFalling => {
                previous.map(|p| p != raw).unwrap_or(false)
            }
        })
    }

    /// Forget edge history (element re-execution)
    pub fn reset(&mut self) {
        self.previous = None;
    }

    fn evaluate_raw(&self, ctx: &mut Context<'_>) -> Result<bool> {
        match &self.kind {
            ConditionKind::ByEntity {
                triggering_entities,
                kind,
            } => {
                let mut results = Vec::with_capacity(triggering_entities.entity_refs.len());
                for entity in &triggering_entities.entity_refs {
                    results.push(evaluate_entity_condition(kind, entity, ctx)?);
                }
                Ok(match triggering_entities.rule {
                    TriggeringEntitiesRule::All => results.iter().all(|r| *r),
                    TriggeringEntitiesRule::Any => results.iter().any(|r| *r),
                })
            }
            ConditionKind::ByValue(kind) => evaluate_value_condition(kind, &self.scope, ctx),
        }
    }
}

fn parse_entity_condition(node: &XmlNode, scope: &Scope) -> Result<EntityConditionKind> {
    match node.name() {
        "ReachPositionCondition" => Ok(EntityConditionKind::ReachPosition {
            position: Position::from_xml(node.required_child("Position")?, scope)?,
            tolerance: read_attribute("tolerance", node, scope)?,
        }),
        "DistanceCondition" => {
            let freespace: bool = read_attribute_or("freespace", node, scope, false)?;
            if freespace {
                return Err(Error::syntax(
                    "DistanceCondition freespace measurement is not supported",
                ));
            }
            Ok(EntityConditionKind::Distance {
                position: Position::from_xml(node.required_child("Position")?, scope)?,
                value: read_attribute("value", node, scope)?,
                rule: Rule::parse(node.required_attribute("rule")?)?,
            })
        }
        "RelativeDistanceCondition" => Ok(EntityConditionKind::RelativeDistance {
            entity_ref: read_attribute("entityRef", node, scope)?,
            distance_type: RelativeDistanceType::parse(
                node.required_attribute("relativeDistanceType")?,
            )?,
            value: read_attribute("value", node, scope)?,
            rule: Rule::parse(node.required_attribute("rule")?)?,
        }),
        "TimeHeadwayCondition" => Ok(EntityConditionKind::TimeHeadway {
            entity_ref: read_attribute("entityRef", node, scope)?,
            value: read_attribute("value", node, scope)?,
            rule: Rule::parse(node.required_attribute("rule")?)?,
        }),
        "StandStillCondition" => Ok(EntityConditionKind::StandStill {
            duration: read_attribute("duration", node, scope)?,
        }),
        "AccelerationCondition" => Ok(EntityConditionKind::Acceleration {
            value: read_attribute("value", node, scope)?,
            rule: Rule::parse(node.required_attribute("rule")?)?,
        }),
        "SpeedCondition" => Ok(EntityConditionKind::Speed {
            value: read_attribute("value", node, scope)?,
            rule: Rule::parse(node.required_attribute("rule")?)?,
        }),
        "CollisionCondition" => {
            let entity = node.child("EntityRef").ok_or_else(|| {
                Error::syntax("CollisionCondition supports only EntityRef targets")
            })?;
            Ok(EntityConditionKind::Collision {
                entity_ref: read_attribute("entityRef", entity, scope)?,
            })
        }
        "TraveledDistanceCondition" => Ok(EntityConditionKind::TraveledDistance {
            value: read_attribute("value", node, scope)?,
        }),
        other => Err(Error::unsupported_element(other, "EntityCondition")),
    }
}

fn parse_value_condition(node: &XmlNode, scope: &Scope) -> Result<ValueConditionKind> {
    match node.name() {
        "SimulationTimeCondition" => Ok(ValueConditionKind::SimulationTime {
            value: read_attribute("value", node, scope)?,
            rule: Rule::parse(node.required_attribute("rule")?)?,
        }),
        "ParameterCondition" => Ok(ValueConditionKind::Parameter {
            parameter_ref: node.required_attribute("parameterRef")?.to_string(),
            value: node.required_attribute("value")?.to_string(),
            rule: Rule::parse(node.required_attribute("rule")?)?,
        }),
        "StoryboardElementStateCondition" => Ok(ValueConditionKind::StoryboardElementState {
            element_ref: node.required_attribute("storyboardElementRef")?.to_string(),
            state: StoryboardElementState::parse(node.required_attribute("state")?)?,
        }),
        other => Err(Error::unsupported_element(other, "ByValueCondition")),
    }
}

fn evaluate_entity_condition(
    kind: &EntityConditionKind,
    entity: &str,
    ctx: &mut Context<'_>,
) -> Result<bool> {
    let simulator = &mut *ctx.simulator;
    match kind {
        EntityConditionKind::ReachPosition {
            position,
            tolerance,
        } => {
            let target = position.resolve_pose(simulator)?;
            simulator.reach_position(entity, &target, *tolerance)
        }
        EntityConditionKind::Distance {
            position,
            value,
            rule,
        } => {
            let target = position.resolve_pose(simulator)?;
            let pose = simulator
                .entities
                .entity(entity)?
                .world_pose(&simulator.map);
            Ok(pose
                .map(|pose| rule.holds(pose.position.distance(&target.position), *value))
                .unwrap_or(false))
        }
        EntityConditionKind::RelativeDistance {
            entity_ref,
            distance_type,
            value,
            rule,
        } => {
            let distance = match distance_type {
                RelativeDistanceType::Longitudinal => simulator
                    .longitudinal_distance(entity, entity_ref)
                    .unwrap_or_else(|| {
                        simulator.relative_pose(entity, entity_ref).position.x.abs()
                    }),
                RelativeDistanceType::Lateral => {
                    simulator.relative_pose(entity, entity_ref).position.y.abs()
                }
                RelativeDistanceType::Cartesian => {
                    let relative = simulator.relative_pose(entity, entity_ref);
                    relative.position.x.hypot(relative.position.y)
                }
            };
            Ok(rule.holds(distance, *value))
        }
        EntityConditionKind::TimeHeadway {
            entity_ref,
            value,
            rule,
        } => Ok(simulator
            .time_headway(entity, entity_ref)
            .map(|headway| rule.holds(headway, *value))
            .unwrap_or(false)),
        EntityConditionKind::StandStill { duration } => {
            Ok(simulator.stand_still_duration(entity)? >= *duration)
        }
        EntityConditionKind::Acceleration { value, rule } => {
            let status = simulator.entities.entity(entity)?.status()?;
            Ok(rule.holds(status.accel.linear.x, *value))
        }
        EntityConditionKind::Speed { value, rule } => {
            let status = simulator.entities.entity(entity)?.status()?;
            Ok(rule.holds(status.speed(), *value))
        }
        EntityConditionKind::Collision { entity_ref } => {
            use crate::simulation::simulator::SimulatorApi;
            simulator.check_collision(entity, entity_ref)
        }
        EntityConditionKind::TraveledDistance { value } => {
            let status = simulator.entities.entity(entity)?.status()?;
            Ok(status.traveled_distance >= *value)
        }
    }
}

fn evaluate_value_condition(
    kind: &ValueConditionKind,
    scope: &Scope,
    ctx: &mut Context<'_>,
) -> Result<bool> {
    match kind {
        ValueConditionKind::SimulationTime { value, rule } => {
            use crate::simulation::simulator::SimulatorApi;
            Ok(rule.holds(ctx.simulator.current_time(), *value))
        }
        ValueConditionKind::Parameter {
            parameter_ref,
            value,
            rule,
        } => {
            let object = scope.resolve(parameter_ref)?;
            let current = object.as_parameter().ok_or_else(|| {
                Error::syntax(format!("'{}' does not name a parameter", parameter_ref))
            })?;
            match (current.parse::<f64>(), value.parse::<f64>()) {
                (Ok(lhs), Ok(rhs)) => Ok(rule.holds(lhs, rhs)),
                _ => Ok(match rule {
                    Rule::EqualTo => current == value,
                    Rule::GreaterThan => current > value.as_str(),
                    Rule::LessThan => current < value.as_str(),
                }),
            }
        }
        ValueConditionKind::StoryboardElementState { element_ref, state } => Ok(ctx
            .element_states
            .get(element_ref)
            .map(|current| current == state)
            .unwrap_or(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::xml::parse_document;

    #[test]
    fn rule_comparisons() {
        assert!(Rule::GreaterThan.holds(2.0, 1.0));
        assert!(Rule::LessThan.holds(1.0, 2.0));
        assert!(Rule::EqualTo.holds(1.0, 1.0 + 1e-9));
        assert!(!Rule::GreaterThan.holds(f64::NAN, 1.0));
        assert!(!Rule::EqualTo.holds(f64::NAN, f64::NAN));
    }

    #[test]
    fn parses_simulation_time_condition() {
        let node = parse_document(
            r#"<Condition name="end" delay="0" conditionEdge="rising">
                 <ByValueCondition>
                   <SimulationTimeCondition value="10" rule="greaterThan"/>
                 </ByValueCondition>
               </Condition>"#,
        )
        .unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let condition = Condition::from_xml(&node, &scope).unwrap();
        assert_eq!(condition.name, "end");
        assert_eq!(condition.edge, ConditionEdge::Rising);
    }

    #[test]
    fn nonzero_delay_is_rejected() {
        let node = parse_document(
            r#"<Condition name="late" delay="2.0">
                 <ByValueCondition>
                   <SimulationTimeCondition value="10" rule="greaterThan"/>
                 </ByValueCondition>
               </Condition>"#,
        )
        .unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let err = Condition::from_xml(&node, &scope).unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn unknown_entity_condition_is_unsupported() {
        let node = parse_document(
            r#"<Condition name="x">
                 <ByEntityCondition>
                   <TriggeringEntities triggeringEntitiesRule="any">
                     <EntityRef entityRef="ego"/>
                   </TriggeringEntities>
                   <EntityCondition><EndOfRoadCondition duration="1"/></EntityCondition>
                 </ByEntityCondition>
               </Condition>"#,
        )
        .unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let err = Condition::from_xml(&node, &scope).unwrap_err();
        assert!(matches!(err, Error::UnsupportedElement { .. }));
    }
}
