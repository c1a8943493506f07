use super::{Containment, Point2D, Polygon, Region, EPSILON};
use crate::error::{GeometryError, GeometryResult};
use cavalier_contours::polyline::{PlineSource, PlineSourceMut, PlineVertex, Polyline};
use cavalier_contours::shape_algorithms::{Shape, ShapeOffsetOptions};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Offset every region by `delta`.
///
/// Positive `delta` removes material (the outer ring moves inward and holes
/// grow), negative `delta` adds it. Arcs produced by the offset are flattened
/// to within `tolerance`. Rings that collapse are dropped, so an empty result
/// means the region vanished.
pub fn offset_regions(
    regions: &[Region],
    delta: f64,
    tolerance: f64,
) -> GeometryResult<Vec<Region>> {
    if !delta.is_finite() {
        return Err(GeometryError::Inconsistent(format!("non-finite offset {delta}")));
    }

    let mut result = Vec::new();
    for region in regions {
        if delta.abs() <= EPSILON {
            result.push(region.clone());
            continue;
        }

        // 1. Convert the region to polylines: outer CCW, holes CW.
        let plines: Vec<Polyline> = region.rings().map(create_polyline).collect();
        let shape = Shape::from_plines(plines);

        // 2. Perform the offset. The kernel asserts internally on invalid
        //    topology, which surfaces here as a panic.
        let offset = catch_unwind(AssertUnwindSafe(|| {
            shape.parallel_offset(delta, ShapeOffsetOptions::new())
        }))
        .map_err(|_| {
            tracing::warn!(delta, "offset kernel panicked");
            GeometryError::Inconsistent(format!("offset by {delta} failed inside the kernel"))
        })?;

        // 3. Reconstruct rings.
        let mut outers = Vec::new();
        let mut holes = Vec::new();
        for indexed in &offset.ccw_plines {
            if let Some(ring) = ring_from_polyline(&indexed.polyline, tolerance)? {
                outers.push(ring);
            }
        }
        for indexed in &offset.cw_plines {
            if let Some(ring) = ring_from_polyline(&indexed.polyline, tolerance)? {
                holes.push(ring);
            }
        }

        result.extend(regions_from_rings(outers, holes)?);
    }
    Ok(result)
}

/// Match holes to the smallest outer ring that contains them.
///
/// A hole with no enclosing outer ring is only dropped when it is a sliver
/// below [`EPSILON`]; anything larger means the rings are inconsistent.
pub fn regions_from_rings(outers: Vec<Polygon>, holes: Vec<Polygon>) -> GeometryResult<Vec<Region>> {
    let mut regions: Vec<Region> = outers.into_iter().map(Region::new).collect();
    for hole in holes {
        let anchor = hole.points()[0];
        let owner = regions
            .iter_mut()
            .filter(|region| region.outer.contains_point(anchor) != Containment::Outside)
            .filter(|region| region.outer.contains_polygon(&hole))
            .min_by(|l, r| l.outer.area().total_cmp(&r.outer.area()));
        match owner {
            Some(region) => region.add_hole(hole),
            None if hole.area() <= EPSILON => {
                tracing::debug!(area = hole.area(), "dropping orphan sliver hole");
            }
            None => {
                tracing::warn!(area = hole.area(), x = anchor.x, y = anchor.y, "hole has no outer ring");
                return Err(GeometryError::Inconsistent(format!(
                    "hole of area {:.6} at ({:.3}, {:.3}) has no enclosing ring",
                    hole.area(),
                    anchor.x,
                    anchor.y
                )));
            }
        }
    }
    Ok(regions)
}

fn create_polyline(ring: &Polygon) -> Polyline {
    let mut pline = Polyline::new();
    for p in ring.points() {
        pline.add_vertex(PlineVertex::new(p.x, p.y, 0.0));
    }
    pline.set_is_closed(true);
    pline
}

/// Flatten an offset loop and validate it.
///
/// `Ok(None)` means the loop collapsed below the kernel tolerance.
fn ring_from_polyline(pline: &Polyline, tolerance: f64) -> GeometryResult<Option<Polygon>> {
    let points = extract_points(pline, tolerance);
    if points.iter().any(|p| !p.is_finite()) {
        return Err(GeometryError::Inconsistent(
            "offset produced a non-finite coordinate".into(),
        ));
    }
    match Polygon::repaired(&points) {
        Ok(ring) => Ok(Some(ring)),
        Err(_) if pline.area().abs() <= tolerance * tolerance => Ok(None),
        Err(err) => Err(GeometryError::Inconsistent(format!(
            "offset produced an invalid ring: {err}"
        ))),
    }
}

fn extract_points(pline: &Polyline, tolerance: f64) -> Vec<Point2D> {
    let vertex_count = pline.vertex_count();
    let mut points = Vec::with_capacity(vertex_count);
    for i in 0..vertex_count {
        let v = pline.at(i);
        points.push(Point2D::new(v.x, v.y));

        if !pline.is_closed() && i == vertex_count - 1 {
            break;
        }

        let next = pline.at((i + 1) % vertex_count);
        if v.bulge.abs() > EPSILON {
            points.extend(tessellate_arc(
                Point2D::new(v.x, v.y),
                Point2D::new(next.x, next.y),
                v.bulge,
                tolerance,
            ));
        }
    }
    points
}

/// Interior points of the arc from `start` to `end` with the given bulge
/// (`tan(sweep / 4)`, positive counter-clockwise), with chord error at most
/// `tolerance`.
pub(crate) fn tessellate_arc(start: Point2D, end: Point2D, bulge: f64, tolerance: f64) -> Vec<Point2D> {
    let chord = end - start;
    let chord_len = chord.hypot();
    if chord_len <= EPSILON || bulge.abs() <= EPSILON {
        return Vec::new();
    }

    let sweep = 4.0 * bulge.atan();
    let radius = chord_len * (1.0 + bulge * bulge) / (4.0 * bulge.abs());
    let apothem = chord_len * (1.0 - bulge * bulge) / (4.0 * bulge);
    let center = start.midpoint(end) + chord.turn_90().normalize() * apothem;

    let max_step = if tolerance >= radius {
        std::f64::consts::FRAC_PI_2
    } else {
        2.0 * (1.0 - tolerance / radius).acos()
    };
    let segments = ((sweep.abs() / max_step.max(EPSILON)).ceil() as usize).clamp(1, 4096);

    let start_angle = (start - center).atan2();
    (1..segments)
        .map(|i| {
            let angle = start_angle + sweep * i as f64 / segments as f64;
            center + kurbo::Vec2::from_angle(angle) * radius
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Winding;
    use approx::assert_relative_eq;

    fn square(min: f64, max: f64) -> Polygon {
        Polygon::from_tuples(&[(min, min), (max, min), (max, max), (min, max)]).expect("square")
    }

    #[test]
    fn test_inward_offset_of_square() {
        let region = Region::new(square(0.0, 100.0));
        let inset = offset_regions(&[region], 10.0, 0.01).expect("offset");
        assert_eq!(inset.len(), 1);
        assert_relative_eq!(inset[0].area(), 80.0 * 80.0, max_relative = 1e-6);
    }

    #[test]
    fn test_outward_offset_rounds_corners() {
        let region = Region::new(square(0.0, 10.0));
        let grown = offset_regions(&[region], -1.0, 0.001).expect("offset");
        assert_eq!(grown.len(), 1);
        let expected = 100.0 + 4.0 * 10.0 + std::f64::consts::PI;
        assert_relative_eq!(grown[0].area(), expected, max_relative = 1e-3);
    }

    #[test]
    fn test_holes_grow_when_shrinking_material() {
        let region = Region::with_holes(square(0.0, 100.0), vec![square(40.0, 60.0)]);
        let inset = offset_regions(&[region], 5.0, 0.01).expect("offset");
        assert_eq!(inset.len(), 1);
        assert_eq!(inset[0].holes.len(), 1);
        assert!(inset[0].holes[0].area() > 400.0);
    }

    #[test]
    fn test_collapsed_region_is_empty() {
        let region = Region::new(square(0.0, 4.0));
        let inset = offset_regions(&[region], 2.5, 0.01).expect("offset");
        assert!(inset.is_empty());
    }

    #[test]
    fn test_region_consumed_by_island_is_empty() {
        let region = Region::with_holes(square(0.0, 20.0), vec![square(3.0, 17.0)]);
        let inset = offset_regions(&[region], 2.55, 0.01).expect("offset");
        assert!(inset.is_empty());
    }

    #[test]
    fn test_tessellate_semicircle() {
        let points = tessellate_arc(Point2D::new(1.0, 0.0), Point2D::new(-1.0, 0.0), 1.0, 0.001);
        assert!(!points.is_empty());
        for p in &points {
            assert_relative_eq!(p.to_vec2().hypot(), 1.0, epsilon = 1e-9);
            // Counter-clockwise from (1, 0) to (-1, 0) passes through the upper half.
            assert!(p.y > 0.0);
        }
    }

    #[test]
    fn test_regions_from_rings_assigns_holes() {
        let regions = regions_from_rings(
            vec![square(0.0, 10.0), square(20.0, 40.0)],
            vec![square(25.0, 30.0).reversed()],
        )
        .expect("regroup");
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].holes.len(), 0);
        assert_eq!(regions[1].holes.len(), 1);
        assert_eq!(regions[1].holes[0].winding(), Winding::Clockwise);
    }

    #[test]
    fn test_orphan_hole_is_inconsistent() {
        let err = regions_from_rings(vec![square(0.0, 10.0)], vec![square(50.0, 60.0).reversed()])
            .expect_err("orphan hole");
        assert!(matches!(err, GeometryError::Inconsistent(_)));
    }
}
