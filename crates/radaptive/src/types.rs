use crate::geometry::{Path, Point2D, Vector2D};
use serde::{Deserialize, Serialize};

/// What kind of material the planner clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperationType {
    /// Clear everything enclosed by boundaries, minus islands.
    #[default]
    Clearing,
    /// Clear a band of one helix width along the inside of every boundary.
    ProfilingInside,
    /// Clear a band of one helix width around the outside of every boundary.
    ProfilingOutside,
}

/// Classification of a toolpath segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionType {
    /// The tool removes material.
    Cutting,
    /// Link over already cleared material; the tool can stay down.
    LinkClear,
    /// Link that would cross uncut material; the tool must retract.
    LinkNotClear,
    /// Link that is clear at the previous pass depth.
    LinkClearAtPrevPass,
}

impl MotionType {
    pub fn is_link(self) -> bool {
        !matches!(self, MotionType::Cutting)
    }
}

/// A continuous run of tool motion of a single kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolpathSegment {
    pub motion: MotionType,
    pub points: Path,
}

impl ToolpathSegment {
    pub fn new(motion: MotionType, points: Path) -> Self {
        Self { motion, points }
    }

    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance(w[1])).sum()
    }
}

/// The toolpath for one planning region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveOutput {
    /// Center of the entry helix.
    pub helix_center: Point2D,
    /// First point of the first cutting segment (end of the helix ramp).
    pub start_point: Point2D,
    /// Cutting passes and links, in machining order.
    pub segments: Vec<ToolpathSegment>,
    /// How to move from the last point back to the helix center.
    pub return_motion: MotionType,
}

impl AdaptiveOutput {
    pub fn cutting_segments(&self) -> impl Iterator<Item = &ToolpathSegment> {
        self.segments
            .iter()
            .filter(|segment| segment.motion == MotionType::Cutting)
    }

    pub fn last_point(&self) -> Option<Point2D> {
        self.segments
            .iter()
            .rev()
            .find_map(|segment| segment.points.last().copied())
    }
}

/// Engagement data captured for one accepted planning step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementRecord {
    /// Global step counter across the whole call, starting at 1.
    pub step: usize,
    /// Tool center after the step.
    pub position: Point2D,
    /// Unit feed direction of the step.
    pub direction: Vector2D,
    /// Angle the feed direction was turned by, in radians (positive = left).
    pub rotation: f64,
    /// Newly removed area.
    pub cut_area: f64,
    /// Removed area per unit of travel.
    pub area_per_distance: f64,
    /// Equivalent radial engagement angle of the tool, in radians.
    pub engagement_angle: f64,
}

/// Engagement angle of a straight cut that removes `area_per_distance`
/// per unit of travel with a tool of radius `tool_radius`.
pub fn engagement_angle(area_per_distance: f64, tool_radius: f64) -> f64 {
    if tool_radius <= 0.0 {
        return 0.0;
    }
    let width = (area_per_distance / tool_radius).clamp(0.0, 2.0);
    (1.0 - width).clamp(-1.0, 1.0).acos()
}

/// A polygon excluded from planning by the nesting limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedPolygon {
    /// Index into the polygon list passed to `execute`.
    pub source_index: usize,
    /// Depth in the nesting forest (0 = outermost boundary).
    pub depth: usize,
}

/// How the nesting forest was turned into planning regions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestingReport {
    pub planned_boundaries: usize,
    pub islands: usize,
    pub dropped: Vec<DroppedPolygon>,
}

impl NestingReport {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

/// Lifecycle of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlannerState {
    #[default]
    Idle,
    Initializing,
    Stepping,
    Completed,
    Failed,
}

/// Everything produced by a planning call, complete or partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanOutput {
    pub final_state: PlannerState,
    /// One entry per planned region.
    pub outputs: Vec<AdaptiveOutput>,
    /// Every accepted tool position, in order.
    pub current_path: Path,
    /// One record per accepted step, parallel to `current_path`.
    pub engagements: Vec<EngagementRecord>,
    pub nesting: NestingReport,
    /// Regions too small for the tool.
    pub skipped_regions: usize,
}

impl PlanOutput {
    pub fn total_steps(&self) -> usize {
        self.current_path.len()
    }

    pub fn max_engagement_angle(&self) -> f64 {
        self.engagements
            .iter()
            .map(|record| record.engagement_angle)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_engagement_angle_bounds() {
        assert_relative_eq!(engagement_angle(0.0, 2.5), 0.0);
        assert_relative_eq!(engagement_angle(2.5, 2.5), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(engagement_angle(5.0, 2.5), PI, epsilon = 1e-12);
        // Slotting wider than the tool saturates.
        assert_relative_eq!(engagement_angle(50.0, 2.5), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_segment_length() {
        let segment = ToolpathSegment::new(
            MotionType::Cutting,
            vec![
                Point2D::new(0.0, 0.0),
                Point2D::new(3.0, 4.0),
                Point2D::new(3.0, 10.0),
            ],
        );
        assert_relative_eq!(segment.length(), 11.0);
        assert!(!segment.motion.is_link());
        assert!(MotionType::LinkClear.is_link());
    }

    #[test]
    fn test_output_serialization() {
        let output = AdaptiveOutput {
            helix_center: Point2D::new(50.0, 50.0),
            start_point: Point2D::new(50.0, 47.5),
            segments: vec![ToolpathSegment::new(
                MotionType::Cutting,
                vec![Point2D::new(50.0, 47.5), Point2D::new(51.0, 47.5)],
            )],
            return_motion: MotionType::LinkClear,
        };
        let serialized = serde_json::to_string(&output).expect("serialize");
        let deserialized: AdaptiveOutput = serde_json::from_str(&serialized).expect("deserialize");
        assert_eq!(output, deserialized);
        assert_eq!(deserialized.last_point(), Some(Point2D::new(51.0, 47.5)));
    }
}
