//! Model of the material already removed by the tool.
//!
//! Cleared material is the union of capsules (a disc swept along a segment).
//! Area queries integrate over parallel lanes across the tool disc: on each
//! lane every capsule covers a single interval, so the uncovered length of a
//! lane is exact and only the lane spacing introduces error.

use super::{distance_to_segment, Point2D, Vector2D, EPSILON};
use kurbo::Rect;
use rstar::{RTree, RTreeObject, AABB};

/// Lanes used to integrate across a tool disc.
const LANES: usize = 32;

/// A disc of `radius` swept from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub start: Point2D,
    pub end: Point2D,
    pub radius: f64,
}

impl Capsule {
    pub fn distance_to(&self, p: Point2D) -> f64 {
        distance_to_segment(p, self.start, self.end)
    }

    fn bounds(&self) -> Rect {
        Rect::from_points(self.start, self.end).inflate(self.radius, self.radius)
    }

    /// Express the capsule in the frame with `origin` and unit axes `u`, `v`.
    fn to_local(self, origin: Point2D, u: Vector2D, v: Vector2D) -> Capsule {
        let local = |p: Point2D| {
            let d = p - origin;
            Point2D::new(d.dot(u), d.dot(v))
        };
        Capsule {
            start: local(self.start),
            end: local(self.end),
            radius: self.radius,
        }
    }

    /// Span of a local-frame capsule on the horizontal line at height `y`.
    fn lane_span(&self, y: f64) -> Option<(f64, f64)> {
        let (a, b, r) = (self.start, self.end, self.radius);
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;

        for c in [a, b] {
            let dy = y - c.y;
            if dy.abs() < r {
                let w = (r * r - dy * dy).sqrt();
                lo = lo.min(c.x - w);
                hi = hi.max(c.x + w);
            }
        }

        let e = b - a;
        let len2 = e.hypot2();
        if len2 > EPSILON * EPSILON {
            // Projection onto the segment within [0, len2].
            let q = (y - a.y) * e.y;
            let along = if e.x.abs() > f64::EPSILON {
                let x0 = a.x - q / e.x;
                let x1 = a.x + (len2 - q) / e.x;
                Some((x0.min(x1), x0.max(x1)))
            } else if (0.0..=len2).contains(&q) {
                Some((f64::NEG_INFINITY, f64::INFINITY))
            } else {
                None
            };
            // Perpendicular distance to the segment line within r.
            let len = len2.sqrt();
            let p = (y - a.y) * e.x;
            let across = if e.y.abs() > f64::EPSILON {
                let x0 = a.x + (p - r * len) / e.y;
                let x1 = a.x + (p + r * len) / e.y;
                Some((x0.min(x1), x0.max(x1)))
            } else if p.abs() <= r * len {
                Some((f64::NEG_INFINITY, f64::INFINITY))
            } else {
                None
            };
            if let (Some(along), Some(across)) = (along, across) {
                let (l, h) = (along.0.max(across.0), along.1.min(across.1));
                if l < h {
                    lo = lo.min(l);
                    hi = hi.max(h);
                }
            }
        }

        (lo < hi).then_some((lo, hi))
    }
}

/// Length of `[from, to]` not covered by any span. Sorts `spans` in place.
fn uncovered_length(from: f64, to: f64, spans: &mut [(f64, f64)]) -> f64 {
    spans.sort_unstable_by(|l, r| l.0.total_cmp(&r.0));
    let mut cursor = from;
    let mut total = 0.0;
    for &(lo, hi) in spans.iter() {
        if cursor >= to || lo >= to {
            break;
        }
        if hi <= cursor {
            continue;
        }
        if lo > cursor {
            total += lo - cursor;
        }
        cursor = hi;
    }
    if cursor < to {
        total += to - cursor;
    }
    total
}

/// Capsules near one tool position, copied out for repeated queries.
#[derive(Debug, Clone, Default)]
pub struct LocalSweep {
    capsules: Vec<Capsule>,
}

impl LocalSweep {
    pub fn len(&self) -> usize {
        self.capsules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capsules.is_empty()
    }

    /// Area of the tool disc at `to` outside the disc at `from` and outside
    /// every cleared capsule.
    pub fn cut_area(&self, from: Point2D, to: Point2D, radius: f64) -> f64 {
        let d = to - from;
        let s = d.hypot();
        if s <= EPSILON || radius <= 0.0 {
            return 0.0;
        }
        let u = d / s;
        let v = u.turn_90();
        let local: Vec<Capsule> = self
            .capsules
            .iter()
            .filter(|c| c.distance_to(to) < radius + c.radius)
            .map(|c| c.to_local(from, u, v))
            .collect();

        let lane = 2.0 * radius / LANES as f64;
        let mut spans = Vec::with_capacity(local.len());
        let mut area = 0.0;
        for k in 0..LANES {
            let y = -radius + (k as f64 + 0.5) * lane;
            let h = (radius * radius - y * y).max(0.0).sqrt();
            let (lo, hi) = ((s - h).max(h), s + h);
            if lo >= hi {
                continue;
            }
            spans.clear();
            spans.extend(local.iter().filter_map(|c| c.lane_span(y)));
            area += uncovered_length(lo, hi, &mut spans) * lane;
        }
        area
    }

    /// Uncleared area of the capsule swept by a disc of `radius` from `a` to `b`.
    pub fn uncovered_area(&self, a: Point2D, b: Point2D, radius: f64) -> f64 {
        if radius <= 0.0 {
            return 0.0;
        }
        let d = b - a;
        let s = d.hypot();
        let u = if s <= EPSILON { Vector2D::new(1.0, 0.0) } else { d / s };
        let v = u.turn_90();
        let sweep = Capsule { start: a, end: b, radius };
        let local: Vec<Capsule> = self
            .capsules
            .iter()
            .filter(|c| segments_close(c, &sweep))
            .map(|c| c.to_local(a, u, v))
            .collect();

        let lane = 2.0 * radius / LANES as f64;
        let mut spans = Vec::with_capacity(local.len());
        let mut area = 0.0;
        for k in 0..LANES {
            let y = -radius + (k as f64 + 0.5) * lane;
            let h = (radius * radius - y * y).max(0.0).sqrt();
            spans.clear();
            spans.extend(local.iter().filter_map(|c| c.lane_span(y)));
            area += uncovered_length(-h, s + h, &mut spans) * lane;
        }
        area
    }

    pub fn covers(&self, p: Point2D) -> bool {
        self.capsules
            .iter()
            .any(|c| c.distance_to(p) <= c.radius + EPSILON)
    }
}

/// Conservative proximity test between two capsules.
fn segments_close(a: &Capsule, b: &Capsule) -> bool {
    let gap = distance_to_segment(a.start, b.start, b.end)
        .min(distance_to_segment(a.end, b.start, b.end))
        .min(distance_to_segment(b.start, a.start, a.end))
        .min(distance_to_segment(b.end, a.start, a.end));
    gap < a.radius + b.radius
        || super::segment_intersection(a.start, a.end, b.start, b.end).is_some()
}

/// R-tree entry: a capsule's position in insertion order plus its bounds.
#[derive(Debug, Clone, Copy)]
struct CapsuleEntry {
    index: usize,
    bounds: Rect,
}

impl RTreeObject for CapsuleEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(self.bounds)
    }
}

fn envelope_of(rect: Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.x0, rect.y0], [rect.x1, rect.y1])
}

/// Union of every tool sweep, indexed by an R*-tree over capsule bounds.
#[derive(Debug, Clone, Default)]
pub struct SweptArea {
    capsules: Vec<Capsule>,
    tree: RTree<CapsuleEntry>,
}

impl SweptArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.capsules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capsules.is_empty()
    }

    pub fn add_disc(&mut self, center: Point2D, radius: f64) {
        self.add_segment(center, center, radius);
    }

    pub fn add_segment(&mut self, start: Point2D, end: Point2D, radius: f64) {
        let capsule = Capsule { start, end, radius };
        self.tree.insert(CapsuleEntry {
            index: self.capsules.len(),
            bounds: capsule.bounds(),
        });
        self.capsules.push(capsule);
    }

    pub fn add_path(&mut self, path: &[Point2D], radius: f64) {
        match path {
            [] => {}
            [single] => self.add_disc(*single, radius),
            _ => {
                for pair in path.windows(2) {
                    self.add_segment(pair[0], pair[1], radius);
                }
            }
        }
    }

    /// Capsules whose bounds meet `rect`, in insertion order.
    fn intersecting(&self, rect: Rect) -> Vec<Capsule> {
        let mut indices: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope_of(rect))
            .map(|entry| entry.index)
            .collect();
        // Tree order depends on node splits; queries must not.
        indices.sort_unstable();
        indices.into_iter().map(|i| self.capsules[i]).collect()
    }

    /// Capsules that may reach within `reach` of `center`.
    pub fn around(&self, center: Point2D, reach: f64) -> LocalSweep {
        let query = Rect::from_points(center, center).inflate(reach, reach);
        let capsules = self
            .intersecting(query)
            .into_iter()
            .filter(|c| c.distance_to(center) <= reach + c.radius)
            .collect();
        LocalSweep { capsules }
    }

    /// See [`LocalSweep::cut_area`].
    pub fn cut_area(&self, from: Point2D, to: Point2D, radius: f64) -> f64 {
        self.around(to, radius).cut_area(from, to, radius)
    }

    /// See [`LocalSweep::uncovered_area`].
    pub fn uncovered_area(&self, a: Point2D, b: Point2D, radius: f64) -> f64 {
        let sweep = Capsule { start: a, end: b, radius };
        let capsules = self
            .intersecting(sweep.bounds())
            .into_iter()
            .filter(|c| segments_close(c, &sweep))
            .collect();
        LocalSweep { capsules }.uncovered_area(a, b, radius)
    }

    pub fn covers(&self, p: Point2D) -> bool {
        self.intersecting(Rect::from_points(p, p))
            .iter()
            .any(|c| c.distance_to(p) <= c.radius + EPSILON)
    }
}
