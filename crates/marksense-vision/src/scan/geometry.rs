// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour shape measurements and small planar helpers for quadrilateral checks.

use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, oriented_contour_area};
use imageproc::point::Point;

/// A point in pixel coordinates.
pub type Pt = (f32, f32);

pub fn distance(a: Pt, b: Pt) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// `4 * pi * area / perimeter^2`: 1 for a disc, ~0.785 for a square.
pub fn circularity(area: f32, perimeter: f32) -> f32 {
    if perimeter <= 0.0 {
        return 0.0;
    }
    4.0 * std::f32::consts::PI * area / (perimeter * perimeter)
}

/// Area, closed arc length and Douglas-Peucker approximation of a traced
/// contour.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourShape {
    pub area: f32,
    pub perimeter: f32,
    pub approx: Vec<Point<i32>>,
}

impl ContourShape {
    /// Measure `points`, simplifying with a tolerance of `epsilon_frac` of the
    /// perimeter.
    pub fn measure(points: &[Point<i32>], epsilon_frac: f32) -> Self {
        let area = contour_area(points) as f32;
        let perimeter = arc_length(points, true);
        let approx = if points.len() < 3 || perimeter <= 0.0 {
            points.to_vec()
        } else {
            // The approximation panics on a zero tolerance.
            let epsilon = (f64::from(epsilon_frac) * perimeter).max(f64::EPSILON);
            approximate_polygon_dp(points, epsilon, true)
        };
        Self {
            area,
            perimeter: perimeter as f32,
            approx,
        }
    }

    pub fn circularity(&self) -> f32 {
        circularity(self.area, self.perimeter)
    }

    /// The approximation has four vertices turning the same way.
    pub fn is_convex_quad(&self) -> bool {
        self.approx.len() == 4 && is_convex(&self.approx)
    }
}

/// Area-weighted centroid (first-order moments). `None` for degenerate
/// contours.
pub fn centroid(points: &[Point<i32>]) -> Option<Pt> {
    let a = oriented_contour_area(points);
    if a.abs() < 1e-6 {
        return None;
    }
    let n = points.len();
    let (mut cx, mut cy) = (0.0f64, 0.0f64);
    for i in 0..n {
        let (p, q) = (points[(i + n - 1) % n], points[i]);
        let (px, py, qx, qy) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
        let cross = px * qy - py * qx;
        cx += (px + qx) * cross;
        cy += (py + qy) * cross;
    }
    Some(((cx / (6.0 * a)) as f32, (cy / (6.0 * a)) as f32))
}

/// Centre of the axis-aligned bounding box.
pub fn bbox_center(points: &[Point<i32>]) -> Pt {
    let (mut x0, mut y0) = (i32::MAX, i32::MAX);
    let (mut x1, mut y1) = (i32::MIN, i32::MIN);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    ((x0 + x1) as f32 / 2.0, (y0 + y1) as f32 / 2.0)
}

/// Every turn of the closed polygon has the same orientation.
pub fn is_convex(poly: &[Point<i32>]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0i64;
    for i in 0..n {
        let (a, b, c) = (poly[i], poly[(i + 1) % n], poly[(i + 2) % n]);
        let cross = i64::from(b.x - a.x) * i64::from(c.y - b.y) - i64::from(b.y - a.y) * i64::from(c.x - b.x);
        if cross == 0 {
            continue;
        }
        if sign == 0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0
}
