//! Walks the tool boundary looking for the next place to re-engage material.

use crate::geometry::{closest_point_on_segment, Path, Point2D, Region, SweptArea, Vector2D};

/// Cursor over the rings of a tool-bound region.
///
/// Rings are walked in their stored orientation (outer counter-clockwise,
/// holes clockwise), so the region interior is always on the left of travel.
#[derive(Debug, Clone)]
pub struct EngageWalker {
    rings: Vec<Path>,
    lengths: Vec<f64>,
    ring: usize,
    segment: usize,
    /// Distance along the current segment.
    offset: f64,
    /// Distance walked on the current ring since it was entered.
    travelled: f64,
    /// Extra distance allowed past one full lap before a ring counts as done.
    slack: f64,
    passes: usize,
}

impl EngageWalker {
    pub fn new(region: &Region, slack: f64) -> Self {
        let rings: Vec<Path> = region.rings().map(|ring| ring.points().to_vec()).collect();
        let lengths = region.rings().map(|ring| ring.perimeter()).collect();
        Self {
            rings,
            lengths,
            ring: 0,
            segment: 0,
            offset: 0.0,
            travelled: 0.0,
            slack,
            passes: 0,
        }
    }

    fn segment_points(&self) -> (Point2D, Point2D) {
        let ring = &self.rings[self.ring];
        (ring[self.segment], ring[(self.segment + 1) % ring.len()])
    }

    pub fn current_point(&self) -> Point2D {
        let (a, b) = self.segment_points();
        let length = a.distance(b);
        if length <= 0.0 {
            return a;
        }
        a + (b - a) * (self.offset / length)
    }

    /// Unit direction of travel at the cursor.
    pub fn current_dir(&self) -> Vector2D {
        let (a, b) = self.segment_points();
        let dir = b - a;
        let length = dir.hypot();
        if length <= 0.0 {
            return Vector2D::new(1.0, 0.0);
        }
        dir / length
    }

    /// Jump to the boundary point closest to `point` and restart lap counting.
    pub fn move_to_closest_point(&mut self, point: Point2D) {
        let mut best = f64::INFINITY;
        for (r, ring) in self.rings.iter().enumerate() {
            for s in 0..ring.len() {
                let (a, b) = (ring[s], ring[(s + 1) % ring.len()]);
                let (closest, t) = closest_point_on_segment(point, a, b);
                let distance = closest.distance(point);
                if distance < best {
                    best = distance;
                    self.ring = r;
                    self.segment = s;
                    self.offset = t * a.distance(b);
                }
            }
        }
        self.travelled = 0.0;
        self.passes = 0;
    }

    /// Move `distance` forward along the current ring.
    ///
    /// Returns `false` once the ring has been walked a full lap.
    fn advance(&mut self, distance: f64) -> bool {
        self.travelled += distance;
        let mut remaining = distance;
        loop {
            let (a, b) = self.segment_points();
            let left = a.distance(b) - self.offset;
            if remaining <= left {
                self.offset += remaining;
                break;
            }
            remaining -= left;
            self.offset = 0.0;
            self.segment = (self.segment + 1) % self.rings[self.ring].len();
        }
        self.travelled <= self.lengths[self.ring] + self.slack
    }

    /// Switch to the start of the next ring. Returns `false` on wrap-around.
    fn next_ring(&mut self) -> bool {
        self.ring += 1;
        self.segment = 0;
        self.offset = 0.0;
        self.travelled = 0.0;
        if self.ring >= self.rings.len() {
            self.ring = 0;
            return false;
        }
        true
    }

    /// Scan forward in `step` increments for a point where moving there from
    /// the current position would cut between `min_area` and `max_area`.
    ///
    /// Returns `false` when the scan wrapped over every ring twice without a
    /// match.
    pub fn next_engage_point(
        &mut self,
        cleared: &SweptArea,
        tool_radius: f64,
        step: f64,
        min_area: f64,
        max_area: f64,
    ) -> bool {
        if self.rings.is_empty() || step <= 0.0 {
            return false;
        }
        let initial = self.current_point();
        loop {
            if !self.advance(step) && !self.next_ring() {
                self.passes += 1;
                if self.passes > 1 {
                    return false;
                }
            }
            let area = cleared.cut_area(initial, self.current_point(), tool_radius);
            if area > min_area && area < max_area {
                return true;
            }
        }
    }
}
