//! Geometric primitives shared by the map and entity layers
//!
//! Points and poses are in the map frame. Orientation is carried as
//! roll/pitch/yaw; the simulator is planar enough that yaw does all the work,
//! but roll/pitch survive round trips through entity status.

use serde::{Deserialize, Serialize};

/// A point in the map frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point { x, y, z }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }

    /// Planar (x, y) distance to another point
    pub fn distance_2d(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A free vector, also used for roll/pitch/yaw triples
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction; zero vectors are returned unchanged
    pub fn normalized(&self) -> Vector3 {
        let n = self.norm();
        if n == 0.0 {
            *self
        } else {
            Vector3::new(self.x / n, self.y / n, self.z / n)
        }
    }

    pub fn scaled(&self, factor: f64) -> Vector3 {
        Vector3::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

/// Position plus roll/pitch/yaw orientation in the map frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    /// Orientation as (roll, pitch, yaw)
    pub rpy: Vector3,
}

impl Pose {
    pub fn new(position: Point, rpy: Vector3) -> Self {
        Pose { position, rpy }
    }

    pub fn yaw(&self) -> f64 {
        self.rpy.z
    }

    /// Unit direction vector of the pose heading, scaled to `magnitude`
    pub fn direction_vector(&self, magnitude: f64) -> Vector3 {
        Vector3::new(
            magnitude * self.yaw().cos(),
            magnitude * self.yaw().sin(),
            0.0,
        )
    }

    /// Pose of `other` expressed in this pose's frame. Planar rotation by
    /// yaw; z is carried as a plain difference.
    pub fn relative_to(&self, other: &Pose) -> Pose {
        let dx = other.position.x - self.position.x;
        let dy = other.position.y - self.position.y;
        let (sin, cos) = self.yaw().sin_cos();
        Pose {
            position: Point::new(
                cos * dx + sin * dy,
                -sin * dx + cos * dy,
                other.position.z - self.position.z,
            ),
            rpy: Vector3::new(
                other.rpy.x - self.rpy.x,
                other.rpy.y - self.rpy.y,
                normalize_angle(other.rpy.z - self.rpy.z),
            ),
        }
    }

    /// The NaN-position sentinel returned for relative-pose queries whose
    /// operands are missing. Callers must let the NaN propagate.
    pub fn nan_sentinel() -> Pose {
        Pose {
            position: Point::new(f64::NAN, f64::NAN, f64::NAN),
            rpy: Vector3::default(),
        }
    }

    pub fn has_nan_position(&self) -> bool {
        self.position.x.is_nan() || self.position.y.is_nan() || self.position.z.is_nan()
    }
}

/// Wrap an angle into (-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * std::f64::consts::PI);
    if a > std::f64::consts::PI {
        a -= 2.0 * std::f64::consts::PI;
    } else if a <= -std::f64::consts::PI {
        a += 2.0 * std::f64::consts::PI;
    }
    a
}

/// Accumulated Euclidean distances along a polyline, starting at 0
pub fn accumulated_lengths(points: &[Point]) -> Vec<f64> {
    let mut lengths = Vec::with_capacity(points.len());
    lengths.push(0.0);
    for i in 0..points.len().saturating_sub(1) {
        let d = points[i].distance(&points[i + 1]);
        lengths.push(lengths[i] + d);
    }
    lengths
}

/// Total Euclidean length of a polyline
pub fn polyline_length(points: &[Point]) -> f64 {
    accumulated_lengths(points).last().copied().unwrap_or(0.0)
}

/// Planar intersection of two segments (a0–a1) and (b0–b1); returns the
/// intersection point if the segments properly cross or touch.
pub fn segment_intersection_2d(a0: &Point, a1: &Point, b0: &Point, b1: &Point) -> Option<Point> {
    let r = (a1.x - a0.x, a1.y - a0.y);
    let s = (b1.x - b0.x, b1.y - b0.y);
    let denominator = r.0 * s.1 - r.1 * s.0;
    if denominator.abs() < f64::EPSILON {
        return None;
    }
    let qp = (b0.x - a0.x, b0.y - a0.y);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denominator;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denominator;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(Point::new(a0.x + t * r.0, a0.y + t * r.1, 0.0))
    } else {
        None
    }
}

/// All intersections of a segment with a closed polygon outline
pub fn segment_polygon_intersections_2d(s0: &Point, s1: &Point, polygon: &[Point]) -> Vec<Point> {
    let mut crossings = Vec::new();
    if polygon.len() < 3 {
        return crossings;
    }
    for i in 0..polygon.len() {
        let p0 = &polygon[i];
        let p1 = &polygon[(i + 1) % polygon.len()];
        if let Some(point) = segment_intersection_2d(s0, s1, p0, p1) {
            crossings.push(point);
        }
    }
    crossings
}

/// Corners of an oriented rectangle (center pose, length along heading,
/// width across), counter-clockwise
pub fn oriented_rectangle(center: &Pose, length: f64, width: f64) -> [Point; 4] {
    let (sin, cos) = center.yaw().sin_cos();
    let hl = length / 2.0;
    let hw = width / 2.0;
    let corner = |dx: f64, dy: f64| {
        Point::new(
            center.position.x + cos * dx - sin * dy,
            center.position.y + sin * dx + cos * dy,
            center.position.z,
        )
    };
    [
        corner(hl, hw),
        corner(-hl, hw),
        corner(-hl, -hw),
        corner(hl, -hw),
    ]
}

fn project(corners: &[Point; 4], axis: (f64, f64)) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for c in corners {
        let d = c.x * axis.0 + c.y * axis.1;
        min = min.min(d);
        max = max.max(d);
    }
    (min, max)
}

/// Separating-axis overlap test for two oriented rectangles
pub fn rectangles_intersect(a: &[Point; 4], b: &[Point; 4]) -> bool {
    for corners in [a, b] {
        for i in 0..4 {
            let edge = (
                corners[(i + 1) % 4].x - corners[i].x,
                corners[(i + 1) % 4].y - corners[i].y,
            );
            let axis = (-edge.1, edge.0);
            let (amin, amax) = project(a, axis);
            let (bmin, bmax) = project(b, axis);
            if amax < bmin || bmax < amin {
                return false;
            }
        }
    }
    true
}

fn point_segment_distance_2d(p: &Point, s0: &Point, s1: &Point) -> f64 {
    let vx = s1.x - s0.x;
    let vy = s1.y - s0.y;
    let len2 = vx * vx + vy * vy;
    if len2 == 0.0 {
        return p.distance_2d(s0);
    }
    let t = (((p.x - s0.x) * vx + (p.y - s0.y) * vy) / len2).clamp(0.0, 1.0);
    p.distance_2d(&Point::new(s0.x + t * vx, s0.y + t * vy, 0.0))
}

/// Minimum planar distance between two oriented rectangles; `None` when the
/// rectangles overlap.
pub fn rectangle_distance(a: &[Point; 4], b: &[Point; 4]) -> Option<f64> {
    if rectangles_intersect(a, b) {
        return None;
    }
    let mut best = f64::INFINITY;
    for i in 0..4 {
        for j in 0..4 {
            best = best
                .min(point_segment_distance_2d(
                    &a[i],
                    &b[j],
                    &b[(j + 1) % 4],
                ))
                .min(point_segment_distance_2d(
                    &b[j],
                    &a[i],
                    &a[(i + 1) % 4],
                ));
        }
    }
    Some(best)
}
