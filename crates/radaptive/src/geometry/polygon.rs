use super::{distance_to_segment, points_coincide, ring_edges, segment_intersection, Point2D, EPSILON};
use crate::error::{GeometryError, GeometryResult};
use geo::algorithm::euclidean_distance::EuclideanDistance;
use geo::{Coord, LineString};
use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// Orientation of a closed ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winding {
    CounterClockwise,
    Clockwise,
}

/// Where a point lies relative to a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Inside,
    OnBoundary,
    Outside,
}

/// A closed ring with at least three distinct vertices and non-zero area.
///
/// The closing edge is implicit; the first vertex is never repeated at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    points: Vec<Point2D>,
}

impl Polygon {
    /// Build a polygon from raw input, repairing what is unambiguous.
    ///
    /// Zero-length edges and a repeated closing vertex are dropped. Anything
    /// else that makes the ring invalid is a [`GeometryError::Degenerate`].
    pub fn repaired(points: &[Point2D]) -> GeometryResult<Self> {
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(GeometryError::Degenerate(format!(
                "non-finite coordinate ({}, {})",
                bad.x, bad.y
            )));
        }

        let mut clean: Vec<Point2D> = Vec::with_capacity(points.len());
        for &point in points {
            if clean.last().map_or(true, |&last| !points_coincide(last, point)) {
                clean.push(point);
            }
        }
        while clean.len() > 1 && points_coincide(clean[0], clean[clean.len() - 1]) {
            clean.pop();
        }

        if clean.len() < 3 {
            return Err(GeometryError::Degenerate(format!(
                "ring has {} distinct vertices, need at least 3",
                clean.len()
            )));
        }

        let polygon = Self { points: clean };
        if polygon.area() <= EPSILON {
            return Err(GeometryError::Degenerate("ring has zero area".into()));
        }
        if !polygon.is_simple() {
            return Err(GeometryError::Degenerate("ring is self-intersecting".into()));
        }
        Ok(polygon)
    }

    pub fn from_tuples(points: &[(f64, f64)]) -> GeometryResult<Self> {
        let points: Vec<Point2D> = points.iter().map(|&(x, y)| Point2D::new(x, y)).collect();
        Self::repaired(&points)
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shoelace area, positive for counter-clockwise rings.
    pub fn signed_area(&self) -> f64 {
        ring_edges(&self.points)
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum::<f64>()
            / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn winding(&self) -> Winding {
        if self.signed_area() >= 0.0 {
            Winding::CounterClockwise
        } else {
            Winding::Clockwise
        }
    }

    pub fn with_winding(mut self, winding: Winding) -> Self {
        if self.winding() != winding {
            self.points.reverse();
        }
        self
    }

    /// Same ring with the given winding, starting at its lowest-left vertex.
    ///
    /// Two rings tracing the same outline compare equal after this, however
    /// they were entered.
    pub fn canonicalized(self, winding: Winding) -> Self {
        let mut ring = self.with_winding(winding);
        let start = ring
            .points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)))
            .map_or(0, |(index, _)| index);
        ring.points.rotate_left(start);
        ring
    }

    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self { points }
    }

    pub fn perimeter(&self) -> f64 {
        ring_edges(&self.points).map(|(a, b)| a.distance(b)).sum()
    }

    pub fn bounding_box(&self) -> Rect {
        let first = self.points[0];
        self.points
            .iter()
            .skip(1)
            .fold(Rect::from_points(first, first), |rect, &p| rect.union_pt(p))
    }

    /// Distance from `p` to the nearest edge.
    pub fn distance_to(&self, p: Point2D) -> f64 {
        geo::Point::new(p.x, p.y).euclidean_distance(&self.to_line_string())
    }

    /// The ring as a closed `geo` line string.
    pub fn to_line_string(&self) -> LineString<f64> {
        let mut ring = LineString::from(
            self.points
                .iter()
                .map(|p| Coord { x: p.x, y: p.y })
                .collect::<Vec<_>>(),
        );
        ring.close();
        ring
    }

    /// Classify `p` against the ring; points within [`EPSILON`] of an edge
    /// are on the boundary.
    pub fn contains_point(&self, p: Point2D) -> Containment {
        let mut inside = false;
        for (a, b) in ring_edges(&self.points) {
            if distance_to_segment(p, a, b) <= EPSILON {
                return Containment::OnBoundary;
            }
            if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
        }
        if inside {
            Containment::Inside
        } else {
            Containment::Outside
        }
    }

    /// Whether `other` lies inside this ring (touching allowed, crossing not).
    pub fn contains_polygon(&self, other: &Polygon) -> bool {
        let (outer, inner) = (self.bounding_box().inflate(EPSILON, EPSILON), other.bounding_box());
        if inner.x0 < outer.x0 || inner.y0 < outer.y0 || inner.x1 > outer.x1 || inner.y1 > outer.y1 {
            return false;
        }
        let mut any_inside = false;
        for &p in &other.points {
            match self.contains_point(p) {
                Containment::Outside => return false,
                Containment::Inside => any_inside = true,
                Containment::OnBoundary => {}
            }
        }
        if !any_inside {
            // Every vertex touches: decide by an interior sample.
            if self.contains_point(other.interior_point()) == Containment::Outside {
                return false;
            }
        }
        !self.crosses(other)
    }

    /// Whether any edge of `self` properly crosses an edge of `other`.
    pub fn crosses(&self, other: &Polygon) -> bool {
        for (a1, a2) in ring_edges(&self.points) {
            for (b1, b2) in ring_edges(&other.points) {
                if let Some((t, u, _)) = segment_intersection(a1, a2, b1, b2) {
                    let interior = |v: f64| v > EPSILON && v < 1.0 - EPSILON;
                    if interior(t) && interior(u) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Area centroid. Falls back to the vertex mean for vanishing areas.
    pub fn centroid(&self) -> Point2D {
        let area = self.signed_area();
        if area.abs() <= EPSILON {
            let n = self.points.len() as f64;
            let sum = self
                .points
                .iter()
                .fold((0.0, 0.0), |acc, p| (acc.0 + p.x, acc.1 + p.y));
            return Point2D::new(sum.0 / n, sum.1 / n);
        }
        let origin = self.points[0];
        let (mut cx, mut cy) = (0.0, 0.0);
        for (a, b) in ring_edges(&self.points) {
            let (ax, ay) = (a.x - origin.x, a.y - origin.y);
            let (bx, by) = (b.x - origin.x, b.y - origin.y);
            let cross = ax * by - bx * ay;
            cx += (ax + bx) * cross;
            cy += (ay + by) * cross;
        }
        Point2D::new(origin.x + cx / (6.0 * area), origin.y + cy / (6.0 * area))
    }

    /// A point strictly inside the ring, near the midpoint of the first edge.
    pub fn interior_point(&self) -> Point2D {
        let centroid = self.centroid();
        if self.contains_point(centroid) == Containment::Inside {
            return centroid;
        }
        let (a, b) = (self.points[0], self.points[1]);
        let mid = a.midpoint(b);
        let edge = b - a;
        // Interior is on the left of a counter-clockwise edge.
        let mut normal = edge.turn_90().normalize();
        if self.winding() == Winding::Clockwise {
            normal = -normal;
        }
        let mut step = edge.hypot() * 0.25;
        while step > EPSILON {
            let candidate = mid + normal * step;
            if self.contains_point(candidate) == Containment::Inside {
                return candidate;
            }
            step *= 0.5;
        }
        mid
    }

    /// No two non-adjacent edges touch and no edge folds back onto its neighbour.
    pub fn is_simple(&self) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }

        for i in 0..n {
            let prev = self.points[(i + n - 1) % n];
            let here = self.points[i];
            let next = self.points[(i + 1) % n];
            let (incoming, outgoing) = (here - prev, next - here);
            if incoming.cross(outgoing).abs() <= EPSILON * incoming.hypot() * outgoing.hypot()
                && incoming.dot(outgoing) < 0.0
            {
                return false;
            }
        }
        if n == 3 {
            return true;
        }

        // Sweep edges by min x so only overlapping spans are compared.
        let mut edges: Vec<(usize, f64, f64)> = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                (i, a.x.min(b.x), a.x.max(b.x))
            })
            .collect();
        edges.sort_by(|l, r| l.1.total_cmp(&r.1));

        for (k, &(i, _, max_x)) in edges.iter().enumerate() {
            for &(j, min_x, _) in &edges[k + 1..] {
                if min_x > max_x + EPSILON {
                    break;
                }
                let adjacent = (i + 1) % n == j || (j + 1) % n == i;
                if adjacent {
                    continue;
                }
                let (a1, a2) = (self.points[i], self.points[(i + 1) % n]);
                let (b1, b2) = (self.points[j], self.points[(j + 1) % n]);
                if segment_intersection(a1, a2, b1, b2).is_some()
                    || distance_to_segment(a1, b1, b2) <= EPSILON
                    || distance_to_segment(b1, a1, a2) <= EPSILON
                {
                    return false;
                }
            }
        }
        true
    }
}
