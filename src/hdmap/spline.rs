//! Natural cubic spline interpolation over centerline polylines
//!
//! Centerline sampling parameterizes the polyline by accumulated Euclidean
//! distance and fits one natural cubic spline per coordinate. The second
//! derivatives come out of a tridiagonal (Thomas) solve. Queries outside the
//! parameter range yield `None`; tangents are finite differences over
//! [s, s + 0.01] like the map queries that consume them.

use crate::error::{Error, Result};
use crate::hdmap::geometry::{accumulated_lengths, Point, Vector3};

const TANGENT_STEP: f64 = 0.01;

/// One-dimensional natural cubic spline over strictly increasing knots
#[derive(Debug, Clone)]
struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    second_derivatives: Vec<f64>,
}

impl CubicSpline {
    fn new(knots: Vec<f64>, values: Vec<f64>) -> Self {
        let n = knots.len();
        let mut m = vec![0.0; n];
        if n > 2 {
            // Thomas algorithm on the natural-spline tridiagonal system.
            let count = n - 2;
            let mut sub = vec![0.0; count];
            let mut diag = vec![0.0; count];
            let mut sup = vec![0.0; count];
            let mut rhs = vec![0.0; count];
            for i in 0..count {
                let h0 = knots[i + 1] - knots[i];
                let h1 = knots[i + 2] - knots[i + 1];
                sub[i] = h0;
                diag[i] = 2.0 * (h0 + h1);
                sup[i] = h1;
                rhs[i] = 6.0
                    * ((values[i + 2] - values[i + 1]) / h1 - (values[i + 1] - values[i]) / h0);
            }
            for i in 1..count {
                let factor = sub[i] / diag[i - 1];
                diag[i] -= factor * sup[i - 1];
                rhs[i] -= factor * rhs[i - 1];
            }
            m[count] = rhs[count - 1] / diag[count - 1];
            for i in (0..count - 1).rev() {
                m[i + 1] = (rhs[i] - sup[i] * m[i + 2]) / diag[i];
            }
        }
        CubicSpline {
            knots,
            values,
            second_derivatives: m,
        }
    }

    fn interval(&self, s: f64) -> Option<usize> {
        if s < self.knots[0] || s > *self.knots.last()? {
            return None;
        }
        let upper = self.knots.partition_point(|&k| k <= s);
        Some(upper.clamp(1, self.knots.len() - 1) - 1)
    }

    fn evaluate(&self, s: f64) -> Option<f64> {
        let i = self.interval(s)?;
        let h = self.knots[i + 1] - self.knots[i];
        let t = s - self.knots[i];
        let (m0, m1) = (self.second_derivatives[i], self.second_derivatives[i + 1]);
        let b = (self.values[i + 1] - self.values[i]) / h - h * (2.0 * m0 + m1) / 6.0;
        let c = m0 / 2.0;
        let d = (m1 - m0) / (6.0 * h);
        Some(self.values[i] + b * t + c * t * t + d * t * t * t)
    }
}

/// Natural cubic spline over a 3D polyline, parameterized by accumulated
/// Euclidean distance
#[derive(Debug, Clone)]
pub struct CenterlineSpline {
    x: CubicSpline,
    y: CubicSpline,
    z: CubicSpline,
    length: f64,
}

impl CenterlineSpline {
    /// Fit a spline through the given polyline points. Consecutive duplicate
    /// points are dropped; fewer than two distinct points is an error.
    pub fn new(points: &[Point]) -> Result<Self> {
        let mut distinct: Vec<Point> = Vec::with_capacity(points.len());
        for point in points {
            if distinct
                .last()
                .map(|last: &Point| last.distance(point) > 1e-9)
                .unwrap_or(true)
            {
                distinct.push(*point);
            }
        }
        if distinct.len() < 2 {
            return Err(Error::map(
                "centerline must contain at least two distinct points",
            ));
        }
        let base_s = accumulated_lengths(&distinct);
        let length = *base_s.last().unwrap_or(&0.0);
        let xs: Vec<f64> = distinct.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = distinct.iter().map(|p| p.y).collect();
        let zs: Vec<f64> = distinct.iter().map(|p| p.z).collect();
        Ok(CenterlineSpline {
            x: CubicSpline::new(base_s.clone(), xs),
            y: CubicSpline::new(base_s.clone(), ys),
            z: CubicSpline::new(base_s, zs),
            length,
        })
    }

    /// Total parameter range (arc length of the underlying polyline)
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Interpolated position at arc length `s`; `None` outside [0, length]
    pub fn position(&self, s: f64) -> Option<Point> {
        Some(Point::new(
            self.x.evaluate(s)?,
            self.y.evaluate(s)?,
            self.z.evaluate(s)?,
        ))
    }

    /// Finite-difference tangent over [s, s + 0.01], normalized. Near the
    /// end of the range the window is shifted backwards so both samples stay
    /// in range.
    pub fn tangent(&self, s: f64) -> Option<Vector3> {
        let (s0, s1) = if s + TANGENT_STEP <= self.length {
            (s, s + TANGENT_STEP)
        } else {
            ((s - TANGENT_STEP).max(0.0), s.min(self.length))
        };
        if s1 <= s0 {
            return None;
        }
        let p0 = self.position(s0)?;
        let p1 = self.position(s1)?;
        let diff = s1 - s0;
        Some(
            Vector3::new(
                (p1.x - p0.x) / diff,
                (p1.y - p0.y) / diff,
                (p1.z - p0.z) / diff,
            )
            .normalized(),
        )
    }
}
