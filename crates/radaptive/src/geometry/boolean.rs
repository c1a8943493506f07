use super::Region;
use crate::error::{GeometryError, GeometryResult};
use geo::{BooleanOps, MultiPolygon};
use std::panic::{catch_unwind, AssertUnwindSafe};

fn to_multi(regions: &[Region]) -> MultiPolygon<f64> {
    MultiPolygon::new(regions.iter().map(Region::to_geo).collect())
}

fn from_multi(multi: &MultiPolygon<f64>) -> GeometryResult<Vec<Region>> {
    let mut regions = Vec::new();
    for polygon in &multi.0 {
        match Region::from_geo(polygon) {
            Ok(region) => regions.push(region),
            // Slivers below the kernel epsilon are not material.
            Err(err) if geo::Area::unsigned_area(polygon) <= super::EPSILON => {
                tracing::debug!(%err, "dropping collapsed boolean result");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(regions)
}

fn apply<F>(name: &str, a: &[Region], b: &[Region], op: F) -> GeometryResult<Vec<Region>>
where
    F: Fn(&MultiPolygon<f64>, &MultiPolygon<f64>) -> MultiPolygon<f64>,
{
    let (lhs, rhs) = (to_multi(a), to_multi(b));
    let result = catch_unwind(AssertUnwindSafe(|| op(&lhs, &rhs))).map_err(|_| {
        tracing::warn!(op = name, "boolean kernel panicked");
        GeometryError::Inconsistent(format!("{name} failed inside the kernel"))
    })?;
    from_multi(&result)
}

pub fn union(a: &[Region], b: &[Region]) -> GeometryResult<Vec<Region>> {
    apply("union", a, b, |l, r| l.union(r))
}

/// Material of `a` not covered by `b`.
pub fn difference(a: &[Region], b: &[Region]) -> GeometryResult<Vec<Region>> {
    apply("difference", a, b, |l, r| l.difference(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use approx::assert_relative_eq;

    fn square(min: f64, max: f64) -> Region {
        Region::new(
            Polygon::from_tuples(&[(min, min), (max, min), (max, max), (min, max)]).expect("square"),
        )
    }

    fn total_area(regions: &[Region]) -> f64 {
        regions.iter().map(Region::area).sum()
    }

    #[test]
    fn test_difference_makes_hole() {
        let result = difference(&[square(0.0, 10.0)], &[square(3.0, 7.0)]).expect("difference");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].holes.len(), 1);
        assert_relative_eq!(total_area(&result), 100.0 - 16.0, epsilon = 1e-9);
    }

    #[test]
    fn test_overlapping_union() {
        let a = [square(0.0, 10.0)];
        let b = [square(5.0, 15.0)];
        assert_relative_eq!(total_area(&union(&a, &b).expect("union")), 175.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_union_keeps_both() {
        let result = union(&[square(0.0, 1.0)], &[square(5.0, 6.0)]).expect("union");
        assert_eq!(result.len(), 2);
    }
}
