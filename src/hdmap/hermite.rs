//! Cubic Hermite curves for lane-change trajectory synthesis

use crate::hdmap::geometry::{Point, Pose, Vector3};

const SAMPLE_COUNT: usize = 100;

/// A cubic Hermite curve between two posed endpoints
#[derive(Debug, Clone)]
pub struct HermiteCurve {
    start: Point,
    goal: Point,
    start_vector: Vector3,
    goal_vector: Vector3,
}

impl HermiteCurve {
    /// Build a curve from a start pose towards a goal pose, with tangent
    /// vectors controlling the departure and arrival directions
    pub fn new(start: &Pose, goal: &Pose, start_vector: Vector3, goal_vector: Vector3) -> Self {
        HermiteCurve {
            start: start.position,
            goal: goal.position,
            start_vector,
            goal_vector,
        }
    }

    /// Point on the curve at normalized parameter t in [0, 1]
    pub fn point_at(&self, t: f64) -> Point {
        let t = t.clamp(0.0, 1.0);
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        Point::new(
            h00 * self.start.x + h10 * self.start_vector.x + h01 * self.goal.x
                + h11 * self.goal_vector.x,
            h00 * self.start.y + h10 * self.start_vector.y + h01 * self.goal.y
                + h11 * self.goal_vector.y,
            h00 * self.start.z + h10 * self.start_vector.z + h01 * self.goal.z
                + h11 * self.goal_vector.z,
        )
    }

    fn derivative_at(&self, t: f64) -> Vector3 {
        let t2 = t * t;
        let d00 = 6.0 * t2 - 6.0 * t;
        let d10 = 3.0 * t2 - 4.0 * t + 1.0;
        let d01 = -6.0 * t2 + 6.0 * t;
        let d11 = 3.0 * t2 - 2.0 * t;
        Vector3::new(
            d00 * self.start.x + d10 * self.start_vector.x + d01 * self.goal.x
                + d11 * self.goal_vector.x,
            d00 * self.start.y + d10 * self.start_vector.y + d01 * self.goal.y
                + d11 * self.goal_vector.y,
            d00 * self.start.z + d10 * self.start_vector.z + d01 * self.goal.z
                + d11 * self.goal_vector.z,
        )
    }

    fn second_derivative_at(&self, t: f64) -> Vector3 {
        let d00 = 12.0 * t - 6.0;
        let d10 = 6.0 * t - 4.0;
        let d01 = -12.0 * t + 6.0;
        let d11 = 6.0 * t - 2.0;
        Vector3::new(
            d00 * self.start.x + d10 * self.start_vector.x + d01 * self.goal.x
                + d11 * self.goal_vector.x,
            d00 * self.start.y + d10 * self.start_vector.y + d01 * self.goal.y
                + d11 * self.goal_vector.y,
            d00 * self.start.z + d10 * self.start_vector.z + d01 * self.goal.z
                + d11 * self.goal_vector.z,
        )
    }

    /// Pose on the curve at parameter t, yaw aligned with the local tangent
    pub fn pose_at(&self, t: f64) -> Pose {
        let position = self.point_at(t);
        let derivative = self.derivative_at(t.clamp(0.0, 1.0));
        Pose::new(
            position,
            Vector3::new(0.0, 0.0, derivative.y.atan2(derivative.x)),
        )
    }

    /// Arc length approximated by chord summation over 100 uniform samples
    pub fn length(&self) -> f64 {
        let mut length = 0.0;
        let mut previous = self.point_at(0.0);
        for i in 1..=SAMPLE_COUNT {
            let current = self.point_at(i as f64 / SAMPLE_COUNT as f64);
            length += previous.distance(&current);
            previous = current;
        }
        length
    }

    /// Maximum planar curvature over the curve, evaluated analytically from
    /// the Hermite derivatives at 101 uniform parameter samples
    pub fn max_2d_curvature(&self) -> f64 {
        let mut max = 0.0f64;
        for i in 0..=SAMPLE_COUNT {
            let t = i as f64 / SAMPLE_COUNT as f64;
            let d = self.derivative_at(t);
            let dd = self.second_derivative_at(t);
            let speed2 = d.x * d.x + d.y * d.y;
            if speed2 < 1e-12 {
                continue;
            }
            let curvature = (d.x * dd.y - d.y * dd.x).abs() / speed2.powf(1.5);
            max = max.max(curvature);
        }
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdmap::geometry::Point;

    fn lane_change_curve() -> HermiteCurve {
        // Straight-ahead start, goal one lane (3.5 m) to the left, 40 m ahead.
        let start = Pose::default();
        let goal = Pose::new(Point::new(40.0, 3.5, 0.0), Vector3::default());
        let magnitude = start.position.distance(&goal.position) * 0.5;
        HermiteCurve::new(
            &start,
            &goal,
            Vector3::new(magnitude, 0.0, 0.0),
            Vector3::new(magnitude, 0.0, 0.0),
        )
    }

    #[test]
    fn endpoints_are_interpolated() {
        let curve = lane_change_curve();
        let p0 = curve.point_at(0.0);
        let p1 = curve.point_at(1.0);
        assert!(p0.distance(&Point::new(0.0, 0.0, 0.0)) < 1e-9);
        assert!(p1.distance(&Point::new(40.0, 3.5, 0.0)) < 1e-9);
    }

    #[test]
    fn length_is_at_least_the_chord() {
        let curve = lane_change_curve();
        let chord = 40.0f64.hypot(3.5);
        assert!(curve.length() >= chord - 1e-6);
        assert!(curve.length() < chord + 2.0);
    }

    #[test]
    fn gentle_lane_change_has_low_curvature() {
        let curve = lane_change_curve();
        assert!(curve.max_2d_curvature() < 1.0);
    }

    #[test]
    fn tight_curve_has_high_curvature() {
        // Goal right next to the start with opposing tangents.
        let start = Pose::default();
        let goal = Pose::new(
            Point::new(0.5, 1.0, 0.0),
            Vector3::new(0.0, 0.0, std::f64::consts::PI),
        );
        let curve = HermiteCurve::new(
            &start,
            &goal,
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(-2.0, 0.0, 0.0),
        );
        assert!(curve.max_2d_curvature() >= 1.0);
    }

    #[test]
    fn pose_yaw_follows_tangent() {
        let curve = lane_change_curve();
        let pose = curve.pose_at(0.0);
        assert!(pose.yaw().abs() < 1e-9);
        let mid = curve.pose_at(0.5);
        assert!(mid.yaw() > 0.0);
    }
}
