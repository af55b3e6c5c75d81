//! Position variants used by teleports, routing and spatial conditions

use crate::entity::status::LaneletPose;
use crate::error::{Error, Result};
use crate::hdmap::geometry::{Point, Pose, Vector3};
use crate::parser::reader::{read_attribute, read_attribute_or};
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use crate::simulation::simulator::Simulator;

/// A scenario position, resolvable to a world pose against the live
/// simulation state
#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    /// Absolute map-frame pose
    World(Pose),
    /// Position along a lanelet centerline
    Lane(LaneletPose),
    /// Offset from another entity's pose, in that entity's frame
    RelativeObject { entity_ref: String, offset: Point },
}

impl Position {
    /// Parse a Position wrapper element
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let child = node
            .all_children()
            .first()
            .ok_or_else(|| Error::syntax("Position element has no child"))?;
        match child.name() {
            "WorldPosition" => Ok(Position::World(Pose::new(
                Point::new(
                    read_attribute("x", child, scope)?,
                    read_attribute("y", child, scope)?,
                    read_attribute_or("z", child, scope, 0.0)?,
                ),
                Vector3::new(
                    read_attribute_or("r", child, scope, 0.0)?,
                    read_attribute_or("p", child, scope, 0.0)?,
                    read_attribute_or("h", child, scope, 0.0)?,
                ),
            ))),
            "LanePosition" => {
                let rpy = match child.child("Orientation") {
                    Some(orientation) => Vector3::new(
                        read_attribute_or("r", orientation, scope, 0.0)?,
                        read_attribute_or("p", orientation, scope, 0.0)?,
                        read_attribute_or("h", orientation, scope, 0.0)?,
                    ),
                    None => Vector3::default(),
                };
                Ok(Position::Lane(LaneletPose {
                    lanelet_id: read_attribute("laneId", child, scope)?,
                    s: read_attribute("s", child, scope)?,
                    offset: read_attribute_or("offset", child, scope, 0.0)?,
                    rpy,
                }))
            }
            "RelativeObjectPosition" => Ok(Position::RelativeObject {
                entity_ref: read_attribute("entityRef", child, scope)?,
                offset: Point::new(
                    read_attribute("dx", child, scope)?,
                    read_attribute("dy", child, scope)?,
                    read_attribute_or("dz", child, scope, 0.0)?,
                ),
            }),
            other => Err(Error::unsupported_element(other, "Position")),
        }
    }

    /// Lanelet pose, when this position is lane-based
    pub fn lanelet_pose(&self) -> Option<LaneletPose> {
        match self {
            Position::Lane(pose) => Some(*pose),
            _ => None,
        }
    }

    /// Resolve to a world pose against the current simulation state
    pub fn resolve_pose(&self, simulator: &Simulator) -> Result<Pose> {
        match self {
            Position::World(pose) => Ok(*pose),
            Position::Lane(lanelet_pose) => simulator
                .map
                .to_map_pose(
                    lanelet_pose.lanelet_id,
                    lanelet_pose.s,
                    lanelet_pose.offset,
                    lanelet_pose.rpy,
                )
                .ok_or_else(|| {
                    Error::semantic(format!(
                        "lane position ({}, {}) cannot be mapped to a world pose",
                        lanelet_pose.lanelet_id, lanelet_pose.s
                    ))
                }),
            Position::RelativeObject { entity_ref, offset } => {
                let base = simulator
                    .entities
                    .entity(entity_ref)?
                    .world_pose(&simulator.map)
                    .ok_or_else(|| {
                        Error::semantic(format!("entity '{}' has no pose", entity_ref))
                    })?;
                let (sin, cos) = base.yaw().sin_cos();
                Ok(Pose::new(
                    Point::new(
                        base.position.x + cos * offset.x - sin * offset.y,
                        base.position.y + sin * offset.x + cos * offset.y,
                        base.position.z + offset.z,
                    ),
                    base.rpy,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::xml::parse_document;

    #[test]
    fn parses_world_position() {
        let node =
            parse_document(r#"<Position><WorldPosition x="1" y="2" z="3" h="0.5"/></Position>"#)
                .unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let position = Position::from_xml(&node, &scope).unwrap();
        match position {
            Position::World(pose) => {
                assert_eq!(pose.position.x, 1.0);
                assert_eq!(pose.yaw(), 0.5);
            }
            _ => panic!("expected world position"),
        }
    }

    #[test]
    fn parses_lane_position_with_orientation() {
        let node = parse_document(
            r#"<Position>
                 <LanePosition laneId="100" s="12.5" offset="-0.5">
                   <Orientation h="0.1"/>
                 </LanePosition>
               </Position>"#,
        )
        .unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let position = Position::from_xml(&node, &scope).unwrap();
        let lanelet_pose = position.lanelet_pose().unwrap();
        assert_eq!(lanelet_pose.lanelet_id, 100);
        assert_eq!(lanelet_pose.s, 12.5);
        assert_eq!(lanelet_pose.offset, -0.5);
        assert_eq!(lanelet_pose.rpy.z, 0.1);
    }

    #[test]
    fn route_position_is_unsupported() {
        let node = parse_document(r#"<Position><RoutePosition/></Position>"#).unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let err = Position::from_xml(&node, &scope).unwrap_err();
        assert!(matches!(err, Error::UnsupportedElement { .. }));
    }
}
