//! HD-map geometry: lanelet network, splines and lane-change curves

pub mod geometry;
pub mod hermite;
pub mod map;
pub mod spline;

pub use geometry::{Point, Pose, Vector3};
pub use hermite::HermiteCurve;
pub use map::{
    LaneChangeDirection, Lanelet, LaneletData, LaneletMap, LaneletNetworkData, RegulatoryElement,
    TurnDirection,
};
pub use spline::CenterlineSpline;
