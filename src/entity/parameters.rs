//! Static entity parameters: bounding boxes, axles, performance limits
//!
//! These parse either from the scenario's inline Vehicle/Pedestrian elements
//! or from catalog entries, and travel over the RPC surface as JSON when an
//! external controller spawns entities.

use crate::error::{Error, Result};
use crate::hdmap::geometry::Point;
use crate::parser::reader::{read_attribute, read_attribute_or};
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use serde::{Deserialize, Serialize};

/// Entity kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Vehicle,
    Pedestrian,
}

/// Vehicle category from the OpenSCENARIO schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleCategory {
    Car,
    Truck,
    Bus,
    Motorbike,
    Bicycle,
    Trailer,
    Semitrailer,
    Train,
    Tram,
}

impl VehicleCategory {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "car" => Ok(VehicleCategory::Car),
            "truck" => Ok(VehicleCategory::Truck),
            "bus" => Ok(VehicleCategory::Bus),
            "motorbike" => Ok(VehicleCategory::Motorbike),
            "bicycle" => Ok(VehicleCategory::Bicycle),
            "trailer" => Ok(VehicleCategory::Trailer),
            "semitrailer" => Ok(VehicleCategory::Semitrailer),
            "train" => Ok(VehicleCategory::Train),
            "tram" => Ok(VehicleCategory::Tram),
            _ => Err(Error::invalid_enumeration("VehicleCategory", value)),
        }
    }
}

/// Pedestrian category from the OpenSCENARIO schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PedestrianCategory {
    Pedestrian,
    Wheelchair,
    Animal,
}

impl PedestrianCategory {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pedestrian" => Ok(PedestrianCategory::Pedestrian),
            "wheelchair" => Ok(PedestrianCategory::Wheelchair),
            "animal" => Ok(PedestrianCategory::Animal),
            _ => Err(Error::invalid_enumeration("PedestrianCategory", value)),
        }
    }
}

/// Entity bounding box: center offset from the reference point plus
/// dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub center: Point,
    pub width: f64,
    pub length: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        let center = node.required_child("Center")?;
        let dimensions = node.required_child("Dimensions")?;
        Ok(BoundingBox {
            center: Point::new(
                read_attribute("x", center, scope)?,
                read_attribute("y", center, scope)?,
                read_attribute("z", center, scope)?,
            ),
            width: read_attribute("width", dimensions, scope)?,
            length: read_attribute("length", dimensions, scope)?,
            height: read_attribute("height", dimensions, scope)?,
        })
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox {
            center: Point::default(),
            width: 2.0,
            length: 4.5,
            height: 1.8,
        }
    }
}

/// One axle of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axle {
    pub max_steering: f64,
    pub wheel_diameter: f64,
    pub track_width: f64,
    pub position_x: f64,
    pub position_z: f64,
}

impl Axle {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        Ok(Axle {
            max_steering: read_attribute("maxSteering", node, scope)?,
            wheel_diameter: read_attribute("wheelDiameter", node, scope)?,
            track_width: read_attribute("trackWidth", node, scope)?,
            position_x: read_attribute("positionX", node, scope)?,
            position_z: read_attribute("positionZ", node, scope)?,
        })
    }
}

/// Front and rear axle geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axles {
    pub front_axle: Axle,
    pub rear_axle: Axle,
}

impl Axles {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        Ok(Axles {
            front_axle: Axle::from_xml(node.required_child("FrontAxle")?, scope)?,
            rear_axle: Axle::from_xml(node.required_child("RearAxle")?, scope)?,
        })
    }
}

impl Default for Axles {
    fn default() -> Self {
        let axle = Axle {
            max_steering: 0.5,
            wheel_diameter: 0.6,
            track_width: 1.8,
            position_x: 0.0,
            position_z: 0.3,
        };
        Axles {
            front_axle: Axle {
                position_x: 2.8,
                ..axle
            },
            rear_axle: axle,
        }
    }
}

/// Performance limits of an entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub max_speed: f64,
    pub max_acceleration: f64,
    pub max_deceleration: f64,
}

impl Performance {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        Ok(Performance {
            max_speed: read_attribute("maxSpeed", node, scope)?,
            max_acceleration: read_attribute("maxAcceleration", node, scope)?,
            max_deceleration: read_attribute("maxDeceleration", node, scope)?,
        })
    }

    /// Limits assumed for pedestrians, which carry no Performance element
    pub fn pedestrian_default() -> Self {
        Performance {
            max_speed: 2.0,
            max_acceleration: 1.0,
            max_deceleration: 1.5,
        }
    }
}

impl Default for Performance {
    fn default() -> Self {
        Performance {
            max_speed: 55.0,
            max_acceleration: 5.0,
            max_deceleration: 9.0,
        }
    }
}

/// Static parameters of a vehicle entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleParameters {
    pub name: String,
    pub vehicle_category: VehicleCategory,
    pub bounding_box: BoundingBox,
    pub performance: Performance,
    pub axles: Axles,
}

impl VehicleParameters {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        Ok(VehicleParameters {
            name: read_attribute("name", node, scope)?,
            vehicle_category: VehicleCategory::parse(node.required_attribute("vehicleCategory")?)?,
            bounding_box: BoundingBox::from_xml(node.required_child("BoundingBox")?, scope)?,
            performance: Performance::from_xml(node.required_child("Performance")?, scope)?,
            axles: Axles::from_xml(node.required_child("Axles")?, scope)?,
        })
    }
}

/// Static parameters of a pedestrian entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedestrianParameters {
    pub name: String,
    pub pedestrian_category: PedestrianCategory,
    pub mass: f64,
    pub bounding_box: BoundingBox,
}

impl PedestrianParameters {
    pub fn from_xml(node: &XmlNode, scope: &Scope) -> Result<Self> {
        Ok(PedestrianParameters {
            name: read_attribute("name", node, scope)?,
            pedestrian_category: PedestrianCategory::parse(
                node.required_attribute("pedestrianCategory")?,
            )?,
            mass: read_attribute_or("mass", node, scope, 65.0)?,
            bounding_box: BoundingBox::from_xml(node.required_child("BoundingBox")?, scope)?,
        })
    }
}

/// Static parameters of any spawnable entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityParameters {
    Vehicle(VehicleParameters),
    Pedestrian(PedestrianParameters),
}

impl EntityParameters {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityParameters::Vehicle(_) => EntityKind::Vehicle,
            EntityParameters::Pedestrian(_) => EntityKind::Pedestrian,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityParameters::Vehicle(parameters) => &parameters.name,
            EntityParameters::Pedestrian(parameters) => &parameters.name,
        }
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        match self {
            EntityParameters::Vehicle(parameters) => &parameters.bounding_box,
            EntityParameters::Pedestrian(parameters) => &parameters.bounding_box,
        }
    }

    pub fn performance(&self) -> Performance {
        match self {
            EntityParameters::Vehicle(parameters) => parameters.performance,
            EntityParameters::Pedestrian(_) => Performance::pedestrian_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::xml::parse_document;

    const VEHICLE_XML: &str = r#"
        <Vehicle name="sedan" vehicleCategory="car">
          <BoundingBox>
            <Center x="1.4" y="0.0" z="0.9"/>
            <Dimensions width="2.0" length="4.5" height="1.8"/>
          </BoundingBox>
          <Performance maxSpeed="20" maxAcceleration="3" maxDeceleration="5"/>
          <Axles>
            <FrontAxle maxSteering="0.5" wheelDiameter="0.6" trackWidth="1.8" positionX="2.8" positionZ="0.3"/>
            <RearAxle maxSteering="0.0" wheelDiameter="0.6" trackWidth="1.8" positionX="0.0" positionZ="0.3"/>
          </Axles>
        </Vehicle>"#;

    #[test]
    fn parses_a_vehicle() {
        let node = parse_document(VEHICLE_XML).unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let vehicle = VehicleParameters::from_xml(&node, &scope).unwrap();
        assert_eq!(vehicle.name, "sedan");
        assert_eq!(vehicle.vehicle_category, VehicleCategory::Car);
        assert_eq!(vehicle.performance.max_speed, 20.0);
        assert_eq!(vehicle.axles.front_axle.position_x, 2.8);
        assert_eq!(vehicle.bounding_box.length, 4.5);
    }

    #[test]
    fn parses_a_pedestrian() {
        let xml = r#"
            <Pedestrian name="walker" pedestrianCategory="pedestrian" mass="70">
              <BoundingBox>
                <Center x="0.0" y="0.0" z="0.9"/>
                <Dimensions width="0.6" length="0.6" height="1.8"/>
              </BoundingBox>
            </Pedestrian>"#;
        let node = parse_document(xml).unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let pedestrian = PedestrianParameters::from_xml(&node, &scope).unwrap();
        assert_eq!(pedestrian.pedestrian_category, PedestrianCategory::Pedestrian);
        assert_eq!(pedestrian.mass, 70.0);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let node = parse_document(r#"<Vehicle name="x" vehicleCategory="hovercraft"/>"#).unwrap();
        let scope = Scope::make_root("/tmp/s.xosc");
        let err = VehicleParameters::from_xml(&node, &scope).unwrap_err();
        assert!(matches!(err, Error::InvalidEnumeration { .. }));
    }

    #[test]
    fn pedestrians_use_default_performance() {
        let parameters = EntityParameters::Pedestrian(PedestrianParameters {
            name: "walker".to_string(),
            pedestrian_category: PedestrianCategory::Pedestrian,
            mass: 65.0,
            bounding_box: BoundingBox::default(),
        });
        assert_eq!(parameters.performance().max_speed, 2.0);
        assert_eq!(parameters.kind(), EntityKind::Pedestrian);
    }
}
