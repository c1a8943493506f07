pub mod boolean;
pub mod offset;
pub mod polygon;
pub mod region;
pub mod sweep;

pub use boolean::{difference, union};
pub use offset::{offset_regions, regions_from_rings};
pub use polygon::{Containment, Polygon, Winding};
pub use region::Region;
pub use sweep::SweptArea;

use geo::{Coord, LineString, Simplify};

/// A 2D position in world units.
pub type Point2D = kurbo::Point;

/// A 2D displacement; feed directions are unit `Vector2D`s.
pub type Vector2D = kurbo::Vec2;

/// An ordered point sequence. Closedness is decided by the caller.
pub type Path = Vec<Point2D>;

/// Coincidence threshold shared by every kernel comparison.
pub const EPSILON: f64 = 1e-7;

pub fn points_coincide(a: Point2D, b: Point2D) -> bool {
    a.distance_squared(b) <= EPSILON * EPSILON
}

/// Closest point on segment `a`-`b` to `p`, with its segment parameter in [0, 1].
pub fn closest_point_on_segment(p: Point2D, a: Point2D, b: Point2D) -> (Point2D, f64) {
    let ab = b - a;
    let len2 = ab.hypot2();
    if len2 <= EPSILON * EPSILON {
        return (a, 0.0);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    (a + ab * t, t)
}

pub fn distance_to_segment(p: Point2D, a: Point2D, b: Point2D) -> f64 {
    let (closest, _) = closest_point_on_segment(p, a, b);
    p.distance(closest)
}

/// Proper intersection of segments `a1`-`a2` and `b1`-`b2`.
///
/// Returns the parameter along `a`, the parameter along `b` and the point.
/// Parallel and collinear segments report no intersection.
pub fn segment_intersection(
    a1: Point2D,
    a2: Point2D,
    b1: Point2D,
    b2: Point2D,
) -> Option<(f64, f64, Point2D)> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denom = r.cross(s);
    if denom.abs() <= EPSILON * r.hypot() * s.hypot() {
        return None;
    }
    let qp = b1 - a1;
    let t = qp.cross(s) / denom;
    let u = qp.cross(r) / denom;
    let slack = EPSILON;
    if t < -slack || t > 1.0 + slack || u < -slack || u > 1.0 + slack {
        return None;
    }
    let t = t.clamp(0.0, 1.0);
    Some((t, u.clamp(0.0, 1.0), a1 + r * t))
}

/// Iterate the edges of a closed ring, including the closing edge.
pub fn ring_edges(ring: &[Point2D]) -> impl Iterator<Item = (Point2D, Point2D)> + '_ {
    let n = ring.len();
    (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
}

pub fn rotate(v: Vector2D, angle: f64) -> Vector2D {
    let (sin, cos) = angle.sin_cos();
    Vector2D::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Smoothed heading of a short direction history.
///
/// Falls back to the latest direction when the history cancels out.
pub fn average_direction(history: &[Vector2D]) -> Option<Vector2D> {
    let last = *history.last()?;
    let sum = history
        .iter()
        .fold(Vector2D::ZERO, |acc, dir| acc + *dir);
    if sum.hypot() <= EPSILON {
        return Some(last);
    }
    Some(sum.normalize())
}

/// Drop near-duplicate points and simplify within `tolerance`.
///
/// Endpoints are preserved; interior points deviate from the result by at
/// most `tolerance` (Ramer-Douglas-Peucker).
pub fn clean_path(path: &[Point2D], tolerance: f64) -> Path {
    let mut deduped: Vec<Coord<f64>> = Vec::with_capacity(path.len());
    for &point in path {
        let coord = Coord { x: point.x, y: point.y };
        match deduped.last() {
            Some(last) if Point2D::new(last.x, last.y).distance(point) <= tolerance.max(EPSILON) => {}
            _ => deduped.push(coord),
        }
    }
    // Keep the true end of the path.
    if deduped.len() > 1 {
        if let (Some(last_in), Some(last_kept)) = (path.last(), deduped.last_mut()) {
            *last_kept = Coord { x: last_in.x, y: last_in.y };
        }
    }

    LineString::new(deduped)
        .simplify(&tolerance)
        .0
        .into_iter()
        .map(|c| Point2D::new(c.x, c.y))
        .collect()
}
