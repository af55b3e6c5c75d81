//! Entity state, kinematics and registry

pub mod kinematics;
pub mod manager;
pub mod parameters;
pub mod status;

pub use kinematics::{Entity, SensorAttachment, TargetSpeed};
pub use manager::EntityManager;
pub use parameters::{
    Axle, Axles, BoundingBox, EntityKind, EntityParameters, PedestrianCategory,
    PedestrianParameters, Performance, VehicleCategory, VehicleParameters,
};
pub use status::{Accel, CoordinateFrame, EntityStatus, LaneletPose, Twist};
