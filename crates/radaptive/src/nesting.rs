//! Containment forest of boundaries and islands.
//!
//! Callers hand over closed paths in any order and with any winding. The
//! resolver reads the nesting from containment alone: depth 0 is a boundary,
//! depth 1 an island inside it, depth 2 a boundary inside that island, and so
//! on.

use crate::error::{GeometryError, GeometryResult};
use crate::geometry::{Path, Polygon, Region, Winding};
use crate::types::{DroppedPolygon, NestingReport};
use tracing::{debug, warn};

/// One polygon of the forest together with everything nested directly in it.
#[derive(Debug, Clone, PartialEq)]
pub struct NestingNode {
    /// Counter-clockwise for boundaries, clockwise for islands.
    pub polygon: Polygon,
    /// Position of the polygon in the caller's input.
    pub source_index: usize,
    pub depth: usize,
    pub children: Vec<NestingNode>,
}

impl NestingNode {
    /// Even depths enclose material, odd depths exclude it.
    pub fn is_boundary(&self) -> bool {
        self.depth % 2 == 0
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(NestingNode::count).sum::<usize>()
    }

    fn deepest(&self) -> usize {
        self.children
            .iter()
            .map(NestingNode::deepest)
            .max()
            .unwrap_or(self.depth)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestingForest {
    pub roots: Vec<NestingNode>,
}

impl NestingForest {
    /// Build the forest for a set of closed paths.
    ///
    /// Every path is repaired first; one that cannot be repaired fails the
    /// whole call with an error naming its index.
    pub fn resolve(paths: &[Path]) -> GeometryResult<Self> {
        // Step 1: Repair the input rings.
        let mut polygons: Vec<(usize, Polygon)> = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let polygon = Polygon::repaired(path).map_err(|err| match err {
                GeometryError::Degenerate(msg) => {
                    GeometryError::Degenerate(format!("path {index}: {msg}"))
                }
                other => other,
            })?;
            polygons.push((index, polygon));
        }

        // Step 2: Largest first, so every parent is placed before its children.
        polygons.sort_by(|(ia, a), (ib, b)| b.area().total_cmp(&a.area()).then(ia.cmp(ib)));

        // Step 3: Parent of each ring is the smallest placed ring containing it.
        // Placed rings are in descending area order, so that is the last match.
        let mut parents: Vec<Option<usize>> = Vec::with_capacity(polygons.len());
        for i in 0..polygons.len() {
            let (index, polygon) = &polygons[i];
            let parent = (0..i)
                .rev()
                .find(|&j| polygons[j].1.contains_polygon(polygon));
            if parent.is_none() {
                for (other, placed) in polygons[..i].iter() {
                    if placed.crosses(polygon) {
                        warn!(
                            first = other,
                            second = index,
                            "input paths overlap; treating them as siblings"
                        );
                    }
                }
            }
            parents.push(parent);
        }

        // Step 4: Assemble the tree with windings normalized by depth.
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); polygons.len()];
        let mut root_indices = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => children[*p].push(i),
                None => root_indices.push(i),
            }
        }
        let roots = root_indices
            .into_iter()
            .map(|i| build_node(i, 0, &children, &polygons))
            .collect::<Vec<_>>();

        let forest = Self { roots };
        debug!(
            polygons = forest.node_count(),
            depth = forest.max_depth(),
            "resolved nesting forest"
        );
        Ok(forest)
    }

    pub fn node_count(&self) -> usize {
        self.roots.iter().map(NestingNode::count).sum()
    }

    /// Depth of the deepest node, 0 for a flat or empty forest.
    pub fn max_depth(&self) -> usize {
        self.roots.iter().map(NestingNode::deepest).max().unwrap_or(0)
    }

    /// Regions to plan under a nesting limit.
    ///
    /// With `limit == 0` every boundary is planned. Otherwise a boundary at
    /// depth `d` is planned only when `d < limit`, always together with its
    /// direct islands. A boundary past the limit is dropped along with its
    /// whole subtree, and each dropped ring is listed in the report.
    pub fn planning_regions(&self, limit: usize) -> (Vec<Region>, NestingReport) {
        let mut regions = Vec::new();
        let mut report = NestingReport::default();
        for root in &self.roots {
            collect_boundary(root, limit, &mut regions, &mut report);
        }
        report.dropped.sort_by_key(|dropped| dropped.source_index);
        if !report.dropped.is_empty() {
            warn!(
                dropped = report.dropped.len(),
                limit, "polygons beyond the nesting limit are excluded from planning"
            );
        }
        (regions, report)
    }
}

fn build_node(
    slot: usize,
    depth: usize,
    children: &[Vec<usize>],
    polygons: &[(usize, Polygon)],
) -> NestingNode {
    let nested = children[slot]
        .iter()
        .map(|&child| build_node(child, depth + 1, children, polygons))
        .collect();
    let (source_index, polygon) = &polygons[slot];
    let winding = if depth % 2 == 0 {
        Winding::CounterClockwise
    } else {
        Winding::Clockwise
    };
    NestingNode {
        polygon: polygon.clone().canonicalized(winding),
        source_index: *source_index,
        depth,
        children: nested,
    }
}

fn collect_boundary(
    node: &NestingNode,
    limit: usize,
    regions: &mut Vec<Region>,
    report: &mut NestingReport,
) {
    if limit != 0 && node.depth >= limit {
        drop_subtree(node, report);
        return;
    }

    let holes: Vec<Polygon> = node.children.iter().map(|c| c.polygon.clone()).collect();
    report.planned_boundaries += 1;
    report.islands += holes.len();
    regions.push(Region::with_holes(node.polygon.clone(), holes));

    for island in &node.children {
        for inner in &island.children {
            collect_boundary(inner, limit, regions, report);
        }
    }
}

fn drop_subtree(node: &NestingNode, report: &mut NestingReport) {
    report.dropped.push(DroppedPolygon {
        source_index: node.source_index,
        depth: node.depth,
    });
    for child in &node.children {
        drop_subtree(child, report);
    }
}
