use super::{segment_intersection, Containment, Point2D, Polygon, Winding, ring_edges, EPSILON};
use geo::Area;
use crate::error::{GeometryError, GeometryResult};
use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// A filled area: an outer boundary minus zero or more holes.
///
/// The outer ring is kept counter-clockwise and holes clockwise, so material
/// is always on the left of every ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// The outer boundary.
    pub outer: Polygon,
    /// Islands excluded from the region.
    pub holes: Vec<Polygon>,
}

impl Region {
    /// Create a new region with just an outer boundary.
    pub fn new(outer: Polygon) -> Self {
        Self {
            outer: outer.with_winding(Winding::CounterClockwise),
            holes: Vec::new(),
        }
    }

    /// Create a new region with an outer boundary and holes.
    pub fn with_holes(outer: Polygon, holes: Vec<Polygon>) -> Self {
        let mut region = Self::new(outer);
        for hole in holes {
            region.add_hole(hole);
        }
        region
    }

    /// Add a hole to the region.
    pub fn add_hole(&mut self, hole: Polygon) {
        self.holes.push(hole.with_winding(Winding::Clockwise));
    }

    /// Outer ring followed by every hole.
    pub fn rings(&self) -> impl Iterator<Item = &Polygon> {
        std::iter::once(&self.outer).chain(self.holes.iter())
    }

    pub fn area(&self) -> f64 {
        self.outer.area() - self.holes.iter().map(Polygon::area).sum::<f64>()
    }

    pub fn bounding_box(&self) -> Rect {
        self.outer.bounding_box()
    }

    /// Strictly inside the outer ring and strictly outside every hole.
    pub fn contains_point(&self, p: Point2D) -> bool {
        self.outer.contains_point(p) == Containment::Inside
            && self
                .holes
                .iter()
                .all(|hole| hole.contains_point(p) == Containment::Outside)
    }

    /// Inside or on the boundary.
    pub fn covers_point(&self, p: Point2D) -> bool {
        self.outer.contains_point(p) != Containment::Outside
            && self
                .holes
                .iter()
                .all(|hole| hole.contains_point(p) != Containment::Inside)
    }

    pub fn distance_to_boundary(&self, p: Point2D) -> f64 {
        self.rings()
            .map(|ring| ring.distance_to(p))
            .fold(f64::INFINITY, f64::min)
    }

    /// First point where the segment `from`-`to` meets any ring.
    pub fn first_boundary_crossing(&self, from: Point2D, to: Point2D) -> Option<Point2D> {
        self.rings()
            .flat_map(|ring| ring_edges(ring.points()))
            .filter_map(|(a, b)| segment_intersection(from, to, a, b))
            .min_by(|l, r| l.0.total_cmp(&r.0))
            .map(|(_, _, point)| point)
    }

    pub fn to_geo(&self) -> geo::Polygon<f64> {
        geo::Polygon::new(
            self.outer.to_line_string(),
            self.holes.iter().map(Polygon::to_line_string).collect(),
        )
    }

    /// Convert a `geo` polygon back.
    ///
    /// Holes that collapse below [`EPSILON`] are dropped; a larger hole that
    /// cannot be repaired is an inconsistency, not material.
    pub fn from_geo(polygon: &geo::Polygon<f64>) -> GeometryResult<Self> {
        let ring = |line: &geo::LineString<f64>| {
            let points: Vec<Point2D> = line.coords().map(|c| Point2D::new(c.x, c.y)).collect();
            Polygon::repaired(&points)
        };
        let outer = ring(polygon.exterior()).map_err(|err| {
            GeometryError::Inconsistent(format!("boolean result has invalid exterior: {err}"))
        })?;
        let mut holes = Vec::with_capacity(polygon.interiors().len());
        for interior in polygon.interiors() {
            match ring(interior) {
                Ok(hole) => holes.push(hole),
                Err(err) => {
                    let area = geo::Polygon::new(interior.clone(), Vec::new()).unsigned_area();
                    if area > EPSILON {
                        return Err(GeometryError::Inconsistent(format!(
                            "boolean result has invalid hole of area {area:.6}: {err}"
                        )));
                    }
                    tracing::debug!(%err, "dropping collapsed hole");
                }
            }
        }
        Ok(Self::with_holes(outer, holes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(min: f64, max: f64) -> Polygon {
        Polygon::from_tuples(&[(min, min), (max, min), (max, max), (min, max)]).expect("square")
    }

    #[test]
    fn test_region_creation() {
        let region = Region::new(square(0.0, 10.0).reversed());
        assert_eq!(region.outer.winding(), Winding::CounterClockwise);
        assert_eq!(region.holes.len(), 0);
    }

    #[test]
    fn test_region_with_holes() {
        let region = Region::with_holes(square(0.0, 100.0), vec![square(10.0, 20.0), square(40.0, 60.0)]);
        assert_eq!(region.holes.len(), 2);
        assert!(region.holes.iter().all(|h| h.winding() == Winding::Clockwise));
        assert_relative_eq!(region.area(), 10000.0 - 100.0 - 400.0);
        assert_eq!(region.rings().count(), 3);
    }

    #[test]
    fn test_region_containment_and_distance() {
        let mut region = Region::new(square(0.0, 100.0));
        region.add_hole(square(30.0, 70.0));
        assert!(region.contains_point(Point2D::new(10.0, 10.0)));
        assert!(!region.contains_point(Point2D::new(50.0, 50.0)));
        assert!(!region.contains_point(Point2D::new(0.0, 50.0)));
        assert!(region.covers_point(Point2D::new(0.0, 50.0)));
        assert!(region.covers_point(Point2D::new(30.0, 50.0)));
        assert!(!region.covers_point(Point2D::new(50.0, 50.0)));
        assert_relative_eq!(region.distance_to_boundary(Point2D::new(25.0, 50.0)), 5.0);
    }

    #[test]
    fn test_first_boundary_crossing() {
        let region = Region::with_holes(square(0.0, 100.0), vec![square(30.0, 70.0)]);
        let hit = region
            .first_boundary_crossing(Point2D::new(10.0, 50.0), Point2D::new(120.0, 50.0))
            .expect("crossing");
        assert_relative_eq!(hit.x, 30.0);
        assert!(region
            .first_boundary_crossing(Point2D::new(10.0, 10.0), Point2D::new(20.0, 20.0))
            .is_none());
    }

    #[test]
    fn test_region_serialization() {
        let region = Region::with_holes(square(0.0, 10.0), vec![square(2.0, 4.0)]);
        let serialized = serde_json::to_string(&region).expect("serialize");
        let deserialized: Region = serde_json::from_str(&serialized).expect("deserialize");
        assert_eq!(region, deserialized);
    }

    #[test]
    fn test_geo_round_trip() {
        let region = Region::with_holes(square(0.0, 10.0), vec![square(2.0, 4.0)]);
        let back = Region::from_geo(&region.to_geo()).expect("valid");
        assert_relative_eq!(back.area(), region.area());
        assert_eq!(back.holes.len(), 1);
    }

    fn geo_ring(points: &[(f64, f64)]) -> geo::LineString<f64> {
        geo::LineString::from(points.to_vec())
    }

    #[test]
    fn test_from_geo_drops_sliver_holes() {
        let polygon = geo::Polygon::new(
            geo_ring(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![geo_ring(&[(5.0, 5.0), (6.0, 5.0), (5.5, 5.0 + 1e-10)])],
        );
        let region = Region::from_geo(&polygon).expect("sliver dropped");
        assert!(region.holes.is_empty());
    }

    #[test]
    fn test_from_geo_rejects_invalid_holes() {
        let polygon = geo::Polygon::new(
            geo_ring(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![geo_ring(&[(2.0, 2.0), (6.0, 6.0), (6.0, 2.0), (2.0, 3.0)])],
        );
        assert!(matches!(
            Region::from_geo(&polygon),
            Err(GeometryError::Inconsistent(_))
        ));
    }
}
