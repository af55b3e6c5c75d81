//! Action variants and their runtime execution
//!
//! Actions live inside events (and the Init block) and act on the actor
//! entities of the enclosing maneuver group. An action is started when its
//! event enters the running state and then updated every tick until it
//! reports completion. Unsupported schema actions are rejected while the
//! scenario loads.

use crate::error::{Error, Result};
use crate::parser::reader::{read_attribute, read_attribute_or};
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use crate::simulation::simulator::{LaneChangeTarget, SimulatorApi};
use crate::syntax::position::Position;
use crate::syntax::Context;

/// Speed tolerance for action completion, in m/s
const SPEED_COMPLETION_EPSILON: f64 = 0.01;

/// Shape of a speed transition profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicsShape {
    Step,
    Linear,
    Sinusoidal,
    Cubic,
}

impl DynamicsShape {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "step" => Ok(DynamicsShape::Step),
            "linear" => Ok(DynamicsShape::Linear),
            "sinusoidal" => Ok(DynamicsShape::Sinusoidal),
            "cubic" => Ok(DynamicsShape::Cubic),
            _ => Err(Error::invalid_enumeration("DynamicsShape", value)),
        }
    }

    /// Profile value at normalized progress f in [0, 1]
    fn profile(&self, from: f64, to: f64, f: f64) -> f64 {
        let f = f.clamp(0.0, 1.0);
        let blend = match self {
            DynamicsShape::Step => 1.0,
            DynamicsShape::Linear => f,
            DynamicsShape::Sinusoidal => (1.0 - (std::f64::consts::PI * f).cos()) / 2.0,
            DynamicsShape::Cubic => f * f * (3.0 - 2.0 * f),
        };
        from + (to - from) * blend
    }
}

/// Dimension the dynamics value is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicsDimension {
    Time,
    Distance,
    Rate,
}

impl DynamicsDimension {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "time" => Ok(DynamicsDimension::Time),
            "distance" => Ok(DynamicsDimension::Distance),
            "rate" => Ok(DynamicsDimension::Rate),
            _ => Err(Error::invalid_enumeration("DynamicsDimension", value)),
        }
    }
}

/// Transition dynamics of a SpeedAction
#[derive(Debug, Clone, Copy)]
pub struct SpeedActionDynamics {
    pub shape: DynamicsShape,
    pub value: f64,
    pub dimension: DynamicsDimension,
}

impl SpeedActionDynamics {
    fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        Ok(SpeedActionDynamics {
            shape: DynamicsShape::parse(node.required_attribute("dynamicsShape")?)?,
            value: read_attribute_or("value", node, scope, 0.0)?,
            dimension: DynamicsDimension::parse(node.required_attribute("dynamicsDimension")?)?,
        })
    }

    /// Seconds the transition takes for a given start and target speed
    fn duration(&self, from: f64, to: f64) -> f64 {
        match (self.shape, self.dimension) {
            (DynamicsShape::Step, _) => 0.0,
            (_, DynamicsDimension::Time) => self.value.max(0.0),
            (_, DynamicsDimension::Rate) => {
                if self.value > 0.0 {
                    (to - from).abs() / self.value
                } else {
                    0.0
                }
            }
            (_, DynamicsDimension::Distance) => {
                let average = (from + to) / 2.0;
                if average > 0.0 {
                    self.value / average
                } else {
                    0.0
                }
            }
        }
    }
}

/// How a relative speed target scales the reference speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedTargetValueType {
    Delta,
    Factor,
}

impl SpeedTargetValueType {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "delta" => Ok(SpeedTargetValueType::Delta),
            "factor" => Ok(SpeedTargetValueType::Factor),
            _ => Err(Error::invalid_enumeration("SpeedTargetValueType", value)),
        }
    }
}

/// Target of a SpeedAction
#[derive(Debug, Clone)]
pub enum SpeedActionTarget {
    Absolute {
        value: f64,
    },
    Relative {
        entity_ref: String,
        value: f64,
        value_type: SpeedTargetValueType,
        continuous: bool,
    },
}

impl SpeedActionTarget {
    fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        if let Some(absolute) = node.child("AbsoluteTargetSpeed") {
            return Ok(SpeedActionTarget::Absolute {
                value: read_attribute("value", absolute, scope)?,
            });
        }
        if let Some(relative) = node.child("RelativeTargetSpeed") {
            return Ok(SpeedActionTarget::Relative {
                entity_ref: read_attribute("entityRef", relative, scope)?,
                value: read_attribute("value", relative, scope)?,
                value_type: SpeedTargetValueType::parse(
                    relative.required_attribute("speedTargetValueType")?,
                )?,
                continuous: read_attribute_or("continuous", relative, scope, false)?,
            });
        }
        Err(Error::syntax(
            "SpeedActionTarget carries neither AbsoluteTargetSpeed nor RelativeTargetSpeed",
        ))
    }

    fn continuous(&self) -> bool {
        matches!(self, SpeedActionTarget::Relative { continuous, .. } if *continuous)
    }

    fn resolve(&self, ctx: &Context<'_>) -> Result<f64> {
        match self {
            SpeedActionTarget::Absolute { value } => Ok(*value),
            SpeedActionTarget::Relative {
                entity_ref,
                value,
                value_type,
                ..
            } => {
                let reference = ctx
                    .simulator
                    .entities
                    .entity(entity_ref)?
                    .status()?
                    .speed();
                Ok(match value_type {
                    SpeedTargetValueType::Delta => reference + value,
                    SpeedTargetValueType::Factor => reference * value,
                })
            }
        }
    }
}

/// Target of a LaneChangeAction
#[derive(Debug, Clone)]
enum LaneChangeTargetSpec {
    /// Absolute target lanelet id
    Absolute { lanelet_id: i64 },
    /// Signed lane count relative to another entity's lanelet (positive is
    /// toward the left bound)
    Relative { entity_ref: String, value: i64 },
}

#[derive(Debug, Clone)]
struct SpeedPlan {
    entity: String,
    from: f64,
    to: f64,
    duration: f64,
}

#[derive(Debug, Clone)]
struct SpeedRuntime {
    elapsed: f64,
    plans: Vec<SpeedPlan>,
}

#[derive(Debug, Clone)]
enum ActionKind {
    Teleport {
        position: Position,
    },
    Speed {
        dynamics: SpeedActionDynamics,
        target: SpeedActionTarget,
        runtime: Option<SpeedRuntime>,
    },
    LaneChange {
        target: LaneChangeTargetSpec,
    },
    AcquirePosition {
        position: Position,
    },
    AssignRoute {
        lanelet_ids: Vec<i64>,
    },
}

/// One executable action
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    kind: ActionKind,
}

impl Action {
    /// Parse a story `<Action name=...>` wrapper
    pub fn from_story_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let name = node.attribute("name").unwrap_or_default().to_string();
        if let Some(private) = node.child("PrivateAction") {
            return Self::from_private_xml(name, private, scope);
        }
        if let Some(global) = node.child("GlobalAction") {
            let inner = global
                .all_children()
                .first()
                .map(|c| c.name())
                .unwrap_or("GlobalAction");
            return Err(Error::unsupported_element(inner, "GlobalAction"));
        }
        if node.child("UserDefinedAction").is_some() {
            return Err(Error::unsupported_element("UserDefinedAction", "Action"));
        }
        Err(Error::syntax(format!(
            "action '{}' carries no PrivateAction",
            name
        )))
    }

    /// Parse a PrivateAction element
    pub fn from_private_xml(name: String, node: &XmlNode, scope: &Scope) -> Result<Self> {
        let child = node
            .all_children()
            .first()
            .ok_or_else(|| Error::syntax("PrivateAction has no child"))?;
        let kind = match child.name() {
            "TeleportAction" => ActionKind::Teleport {
                position: Position::from_xml(child.required_child("Position")?, scope)?,
            },
            "LongitudinalAction" => {
                let speed = child.child("SpeedAction").ok_or_else(|| {
                    let inner = child
                        .all_children()
                        .first()
                        .map(|c| c.name())
                        .unwrap_or("LongitudinalAction");
                    Error::unsupported_element(inner, "LongitudinalAction")
                })?;
                ActionKind::Speed {
                    dynamics: SpeedActionDynamics::from_xml(
                        speed.required_child("SpeedActionDynamics")?,
                        scope,
                    )?,
                    target: SpeedActionTarget::from_xml(
                        speed.required_child("SpeedActionTarget")?,
                        scope,
                    )?,
                    runtime: None,
                }
            }
            "LateralAction" => {
                let lane_change = child.child("LaneChangeAction").ok_or_else(|| {
                    let inner = child
                        .all_children()
                        .first()
                        .map(|c| c.name())
                        .unwrap_or("LateralAction");
                    Error::unsupported_element(inner, "LateralAction")
                })?;
                let target_node = lane_change.required_child("LaneChangeTarget")?;
                let target = if let Some(absolute) = target_node.child("AbsoluteTargetLane") {
                    LaneChangeTargetSpec::Absolute {
                        lanelet_id: read_attribute("value", absolute, scope)?,
                    }
                } else if let Some(relative) = target_node.child("RelativeTargetLane") {
                    LaneChangeTargetSpec::Relative {
                        entity_ref: read_attribute("entityRef", relative, scope)?,
                        value: read_attribute("value", relative, scope)?,
                    }
                } else {
                    return Err(Error::syntax(
                        "LaneChangeTarget carries neither AbsoluteTargetLane nor RelativeTargetLane",
                    ));
                };
                ActionKind::LaneChange { target }
            }
            "RoutingAction" => {
                if let Some(acquire) = child.child("AcquirePositionAction") {
                    ActionKind::AcquirePosition {
                        position: Position::from_xml(acquire.required_child("Position")?, scope)?,
                    }
                } else if let Some(assign) = child.child("AssignRouteAction") {
                    let route = assign.required_child("Route")?;
                    let mut lanelet_ids = Vec::new();
                    for waypoint in route.children("Waypoint") {
                        let position =
                            Position::from_xml(waypoint.required_child("Position")?, scope)?;
                        let lanelet_pose = position.lanelet_pose().ok_or_else(|| {
                            Error::syntax("AssignRouteAction waypoints must be lane positions")
                        })?;
                        lanelet_ids.push(lanelet_pose.lanelet_id);
                    }
                    ActionKind::AssignRoute { lanelet_ids }
                } else {
                    let inner = child
                        .all_children()
                        .first()
                        .map(|c| c.name())
                        .unwrap_or("RoutingAction");
                    return Err(Error::unsupported_element(inner, "RoutingAction"));
                }
            }
            other => return Err(Error::unsupported_element(other, "PrivateAction")),
        };
        Ok(Action { name, kind })
    }

    /// Begin execution for the given actors
    pub fn start(&mut self, ctx: &mut Context<'_>, actors: &[String]) -> Result<()> {
        match &mut self.kind {
            ActionKind::Teleport { position } => {
                for actor in actors {
                    teleport(ctx, actor, position)?;
                }
                Ok(())
            }
            ActionKind::Speed {
                dynamics,
                target,
                runtime,
            } => {
                let mut plans = Vec::with_capacity(actors.len());
                for actor in actors {
                    let from = ctx.simulator.entities.entity(actor)?.status()?.speed();
                    let to = target.resolve(ctx)?;
                    plans.push(SpeedPlan {
                        entity: actor.clone(),
                        from,
                        to,
                        duration: dynamics.duration(from, to),
                    });
                }
                *runtime = Some(SpeedRuntime {
                    elapsed: 0.0,
                    plans,
                });
                Ok(())
            }
            ActionKind::LaneChange { target } => {
                for actor in actors {
                    let lane_change_target = match target {
                        LaneChangeTargetSpec::Absolute { lanelet_id } => {
                            LaneChangeTarget::Lanelet(*lanelet_id)
                        }
                        LaneChangeTargetSpec::Relative { entity_ref, value } => {
                            let reference = ctx
                                .simulator
                                .entities
                                .entity(entity_ref)?
                                .status()?
                                .lanelet_pose
                                .ok_or_else(|| {
                                    Error::semantic(format!(
                                        "entity '{}' is not on a lanelet",
                                        entity_ref
                                    ))
                                })?;
                            let direction = if *value >= 0 {
                                crate::hdmap::map::LaneChangeDirection::Left
                            } else {
                                crate::hdmap::map::LaneChangeDirection::Right
                            };
                            let mut lanelet_id = reference.lanelet_id;
                            for _ in 0..value.unsigned_abs() {
                                lanelet_id = ctx
                                    .simulator
                                    .map
                                    .lane_changeable_lanelet(lanelet_id, direction)
                                    .ok_or_else(|| {
                                        Error::semantic(format!(
                                            "no adjacent lanelet {:?} of lanelet {}",
                                            direction, lanelet_id
                                        ))
                                    })?;
                            }
                            LaneChangeTarget::Lanelet(lanelet_id)
                        }
                    };
                    ctx.simulator.request_lane_change(actor, lane_change_target)?;
                }
                Ok(())
            }
            ActionKind::AcquirePosition { position } => {
                let lanelet_pose = position.lanelet_pose().ok_or_else(|| {
                    Error::syntax("AcquirePositionAction requires a lane position")
                })?;
                for actor in actors {
                    ctx.simulator.request_acquire_position(
                        actor,
                        lanelet_pose.lanelet_id,
                        lanelet_pose.s,
                        lanelet_pose.offset,
                    )?;
                }
                Ok(())
            }
            ActionKind::AssignRoute { lanelet_ids } => {
                for actor in actors {
                    ctx.simulator
                        .entities
                        .entity_mut(actor)?
                        .assign_route(lanelet_ids.clone());
                }
                Ok(())
            }
        }
    }

    /// Advance one tick; returns true when the action has completed
    pub fn update(&mut self, ctx: &mut Context<'_>, actors: &[String]) -> Result<bool> {
        match &mut self.kind {
            ActionKind::Teleport { .. }
            | ActionKind::AcquirePosition { .. }
            | ActionKind::AssignRoute { .. } => Ok(true),
            ActionKind::Speed {
                dynamics,
                target,
                runtime,
            } => {
                let continuous = target.continuous();
                let Some(runtime) = runtime.as_mut() else {
                    return Ok(false);
                };
                runtime.elapsed += ctx.simulator.clock.step_time();
                if continuous {
                    // Re-resolve against the reference entity forever.
                    for plan in &runtime.plans {
                        let value = target.resolve(ctx)?;
                        ctx.simulator.set_target_speed(&plan.entity, value, true)?;
                    }
                    return Ok(false);
                }
                let mut complete = true;
                for plan in &runtime.plans {
                    let f = if plan.duration > 0.0 {
                        (runtime.elapsed / plan.duration).min(1.0)
                    } else {
                        1.0
                    };
                    let value = dynamics.shape.profile(plan.from, plan.to, f);
                    ctx.simulator.set_target_speed(&plan.entity, value, true)?;
                    let actual = ctx.simulator.entities.entity(&plan.entity)?.status()?.speed();
                    if f < 1.0 || (actual - plan.to).abs() >= SPEED_COMPLETION_EPSILON {
                        complete = false;
                    }
                }
                Ok(complete)
            }
            ActionKind::LaneChange { .. } => {
                for actor in actors {
                    if ctx.simulator.entities.entity(actor)?.lane_change_active() {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Apply the action instantaneously (Init block semantics)
    pub fn apply_init(&mut self, ctx: &mut Context<'_>, actors: &[String]) -> Result<()> {
        match &mut self.kind {
            ActionKind::Speed { target, .. } => {
                for actor in actors {
                    let value = target.resolve(ctx)?;
                    let mut status = ctx.simulator.entity_status(actor)?;
                    status.twist.linear.x = value;
                    ctx.simulator.set_entity_status(actor, status)?;
                    ctx.simulator
                        .set_target_speed(actor, value, target.continuous())?;
                }
                Ok(())
            }
            _ => {
                self.start(ctx, actors)?;
                Ok(())
            }
        }
    }

    /// Drop runtime state so the action can run again
    pub fn reset(&mut self) {
        if let ActionKind::Speed { runtime, .. } = &mut self.kind {
            *runtime = None;
        }
    }
}

fn teleport(ctx: &mut Context<'_>, actor: &str, position: &Position) -> Result<()> {
    use crate::entity::status::EntityStatus;
    let previous_twist = ctx
        .simulator
        .entities
        .entity(actor)?
        .status()
        .map(|status| status.twist)
        .unwrap_or_default();
    let mut status = match position.lanelet_pose() {
        Some(lanelet_pose) => EntityStatus::at_lanelet_pose(lanelet_pose),
        None => EntityStatus::at_world_pose(position.resolve_pose(ctx.simulator)?),
    };
    status.twist = previous_twist;
    ctx.simulator.set_entity_status(actor, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::xml::parse_document;

    fn parse_action(xml: &str) -> Result<Action> {
        let node = parse_document(xml).unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        Action::from_story_xml(&node, &scope)
    }

    #[test]
    fn parses_teleport_action() {
        let action = parse_action(
            r#"<Action name="place">
                 <PrivateAction>
                   <TeleportAction>
                     <Position><LanePosition laneId="100" s="0" offset="0"/></Position>
                   </TeleportAction>
                 </PrivateAction>
               </Action>"#,
        )
        .unwrap();
        assert_eq!(action.name, "place");
    }

    #[test]
    fn parses_speed_action() {
        let action = parse_action(
            r#"<Action name="cruise">
                 <PrivateAction>
                   <LongitudinalAction>
                     <SpeedAction>
                       <SpeedActionDynamics dynamicsShape="linear" value="3" dynamicsDimension="time"/>
                       <SpeedActionTarget><AbsoluteTargetSpeed value="10"/></SpeedActionTarget>
                     </SpeedAction>
                   </LongitudinalAction>
                 </PrivateAction>
               </Action>"#,
        )
        .unwrap();
        assert_eq!(action.name, "cruise");
    }

    #[test]
    fn global_actions_are_rejected_at_load() {
        let err = parse_action(
            r#"<Action name="weather">
                 <GlobalAction><EnvironmentAction/></GlobalAction>
               </Action>"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedElement { .. }));
    }

    #[test]
    fn unsupported_private_action_is_rejected() {
        let err = parse_action(
            r#"<Action name="ghost">
                 <PrivateAction><VisibilityAction graphics="false"/></PrivateAction>
               </Action>"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedElement { .. }));
    }

    #[test]
    fn dynamics_durations() {
        let rate = SpeedActionDynamics {
            shape: DynamicsShape::Linear,
            value: 2.0,
            dimension: DynamicsDimension::Rate,
        };
        assert_eq!(rate.duration(0.0, 10.0), 5.0);
        let time = SpeedActionDynamics {
            shape: DynamicsShape::Sinusoidal,
            value: 4.0,
            dimension: DynamicsDimension::Time,
        };
        assert_eq!(time.duration(0.0, 10.0), 4.0);
        let step = SpeedActionDynamics {
            shape: DynamicsShape::Step,
            value: 9.0,
            dimension: DynamicsDimension::Time,
        };
        assert_eq!(step.duration(5.0, 10.0), 0.0);
    }

    #[test]
    fn profile_shapes_interpolate_endpoints() {
        for shape in [
            DynamicsShape::Linear,
            DynamicsShape::Sinusoidal,
            DynamicsShape::Cubic,
        ] {
            assert!((shape.profile(2.0, 8.0, 0.0) - 2.0).abs() < 1e-9);
            assert!((shape.profile(2.0, 8.0, 1.0) - 8.0).abs() < 1e-9);
            let mid = shape.profile(2.0, 8.0, 0.5);
            assert!(mid > 2.0 && mid < 8.0);
        }
        assert_eq!(DynamicsShape::Step.profile(2.0, 8.0, 0.0), 8.0);
    }
}
