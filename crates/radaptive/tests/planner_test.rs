use radaptive::geometry::{distance_to_segment, SweptArea};
use radaptive::*;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn square(min: f64, max: f64) -> Path {
    vec![
        Point2D::new(min, min),
        Point2D::new(max, min),
        Point2D::new(max, max),
        Point2D::new(min, max),
    ]
}

fn reversed(mut path: Path) -> Path {
    path.reverse();
    path
}

/// Distance from `p` to the nearest cutting segment of the output.
fn distance_to_cut(output: &AdaptiveOutput, p: Point2D) -> f64 {
    output
        .cutting_segments()
        .flat_map(|segment| segment.points.windows(2))
        .map(|w| distance_to_segment(p, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn test_square_pocket_is_cleared() {
    let config = AdaptiveConfig::default().with_tool_diameter(5.0);
    let mut planner = Adaptive2d::new(config.clone());
    let output = planner
        .execute(&[square(0.0, 40.0)])
        .expect("square pocket should plan");

    assert_eq!(output.final_state, PlannerState::Completed);
    assert_eq!(planner.state(), PlannerState::Completed);
    assert_eq!(output.outputs.len(), 1);
    assert_eq!(output.skipped_regions, 0);
    assert!(output.total_steps() > 0);
    assert_eq!(output.engagements.len(), output.current_path.len());

    let region = &output.outputs[0];
    assert!(region.helix_center.x > 15.0 && region.helix_center.x < 25.0);
    assert!(region.helix_center.y > 15.0 && region.helix_center.y < 25.0);
    assert!((region.start_point.y - (region.helix_center.y - config.helix_radius())).abs() < 1e-9);
    assert_eq!(region.segments[0].motion, MotionType::Cutting);

    // The tool center never leaves the pocket minus its radius.
    let r = config.tool_radius();
    for segment in region.cutting_segments() {
        for p in &segment.points {
            assert!(p.x >= r - 0.2 && p.x <= 40.0 - r + 0.2, "x out of bounds: {p:?}");
            assert!(p.y >= r - 0.2 && p.y <= 40.0 - r + 0.2, "y out of bounds: {p:?}");
        }
    }

    // Material away from the corners is reached by the tool.
    let helix_reach = config.helix_radius() + r;
    let mut covered = 0;
    let mut total = 0;
    let mut y = 3.0;
    while y <= 37.0 {
        let mut x = 3.0;
        while x <= 37.0 {
            let p = Point2D::new(x, y);
            total += 1;
            if distance_to_cut(region, p) <= r + config.tolerance
                || p.distance(region.helix_center) <= helix_reach
            {
                covered += 1;
            }
            x += 1.0;
        }
        y += 1.0;
    }
    let ratio = covered as f64 / total as f64;
    assert!(ratio > 0.9, "only {:.1}% of the pocket reached", ratio * 100.0);
}

#[test]
fn test_large_square_is_fully_reached() {
    let config = AdaptiveConfig::default().with_tool_diameter(5.0);
    let output = plan_adaptive(&[square(0.0, 100.0)], config.clone()).expect("plan");
    assert_eq!(output.final_state, PlannerState::Completed);
    let region = &output.outputs[0];
    let r = config.tool_radius();

    // Finishing ring included: it is appended as a cutting segment.
    let mut reach = SweptArea::new();
    for segment in region.cutting_segments() {
        reach.add_path(&segment.points, r + config.tolerance);
    }
    reach.add_disc(region.helix_center, config.helix_radius() + r);

    let corners = square(0.0, 100.0);
    let mut y = 0.5;
    while y < 100.0 {
        let mut x = 0.5;
        while x < 100.0 {
            let p = Point2D::new(x, y);
            let near_corner = corners.iter().any(|c| c.distance(p) <= r);
            assert!(near_corner || reach.covers(p), "material left at {p:?}");
            x += 1.0;
        }
        y += 1.0;
    }
}

#[test]
fn test_engagement_stays_bounded() {
    let output = plan_adaptive(&[square(0.0, 30.0)], AdaptiveConfig::default()).expect("plan");
    // Never a full slot (180 degrees) while stepping.
    assert!(output.max_engagement_angle() < std::f64::consts::PI);
    for (index, record) in output.engagements.iter().enumerate() {
        assert_eq!(record.step, index + 1);
        assert!(record.cut_area > 0.0);
        assert_eq!(record.position, output.current_path[index]);
    }
}

#[test]
fn test_island_consuming_region_completes_empty() {
    let mut planner = Adaptive2d::default();
    let output = planner
        .execute(&[square(0.0, 20.0), square(3.0, 17.0)])
        .expect("nothing to clear is not an error");
    assert_eq!(output.final_state, PlannerState::Completed);
    assert!(output.outputs.is_empty());
    assert!(output.current_path.is_empty());
    assert_eq!(output.skipped_regions, 0);
    assert_eq!(output.nesting.islands, 1);
}

#[test]
fn test_cancel_on_second_step() {
    let mut planner = Adaptive2d::default();
    planner.set_progress_callback(|event| {
        if event.step == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    let failure = planner
        .execute(&[square(0.0, 40.0)])
        .expect_err("observer cancels");
    assert_eq!(failure.kind(), &PlanError::Cancelled);
    assert_eq!(failure.partial.final_state, PlannerState::Failed);
    assert_eq!(failure.partial.current_path.len(), 2);
    assert_eq!(planner.state(), PlannerState::Failed);
}

#[test]
fn test_nesting_limit_excludes_deep_boundary() {
    let config = AdaptiveConfig::default().with_nesting_limit(1);
    let paths = [square(0.0, 50.0), reversed(square(15.0, 35.0)), square(20.0, 30.0)];
    let output = plan_adaptive(&paths, config).expect("plan");

    assert_eq!(output.nesting.planned_boundaries, 1);
    assert_eq!(output.nesting.islands, 1);
    assert_eq!(output.nesting.dropped_count(), 1);
    assert_eq!(output.nesting.dropped[0].source_index, 2);
    assert_eq!(output.outputs.len(), 1);

    // No cutting inside the island.
    for segment in output.outputs[0].cutting_segments() {
        for p in &segment.points {
            let inside = p.x > 16.0 && p.x < 34.0 && p.y > 16.0 && p.y < 34.0;
            assert!(!inside, "cut inside the island at {p:?}");
        }
    }
}

#[test]
fn test_tool_too_large() {
    let failure = plan_adaptive(&[square(0.0, 4.0)], AdaptiveConfig::default())
        .expect_err("tool does not fit");
    assert_eq!(
        failure.kind(),
        &PlanError::ToolTooLarge { tool_diameter: 5.0 }
    );
    assert_eq!(failure.partial.skipped_regions, 1);
    assert!(failure.partial.outputs.is_empty());
}

#[test]
fn test_helix_that_does_not_fit_is_too_large() {
    // The tool fits, but the entry helix does not.
    let failure = plan_adaptive(&[square(0.0, 8.0)], AdaptiveConfig::default())
        .expect_err("helix does not fit");
    assert!(matches!(failure.kind(), PlanError::ToolTooLarge { .. }));
}

#[test]
fn test_small_region_skipped_when_another_is_planned() {
    let output = plan_adaptive(&[square(0.0, 30.0), square(50.0, 53.0)], AdaptiveConfig::default())
        .expect("the large region plans");
    assert_eq!(output.outputs.len(), 1);
    assert_eq!(output.skipped_regions, 1);
}

#[test]
fn test_degenerate_input_is_rejected() {
    let bad = vec![Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0), Point2D::new(20.0, 0.0)];
    let failure = plan_adaptive(&[square(0.0, 30.0), bad], AdaptiveConfig::default())
        .expect_err("collinear ring");
    assert!(matches!(failure.kind(), PlanError::DegenerateGeometry(_)));
    assert!(failure.partial.current_path.is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = AdaptiveConfig::default().with_tool_diameter(-1.0);
    let failure = plan_adaptive(&[square(0.0, 30.0)], config).expect_err("invalid");
    assert_eq!(
        failure.kind(),
        &PlanError::InvalidConfig(ConfigError::ToolDiameter(-1.0))
    );
}

#[test]
fn test_execute_is_deterministic_and_reusable() {
    let mut planner = Adaptive2d::default();
    let first = planner.execute(&[square(0.0, 25.0)]).expect("first");
    let second = planner.execute(&[square(0.0, 25.0)]).expect("second");
    assert_eq!(first, second);
}

#[derive(Default)]
struct Recorder {
    clears: usize,
    circles: Vec<DebugColor>,
    paths: Vec<DebugColor>,
}

struct SharedRecorder(Arc<Mutex<Recorder>>);

impl ProgressObserver for SharedRecorder {
    fn draw_circle(&mut self, _center: Point2D, _radius: f64, color: DebugColor) {
        if let Ok(mut recorder) = self.0.lock() {
            recorder.circles.push(color);
        }
    }

    fn draw_path(&mut self, _path: &[Point2D], color: DebugColor) {
        if let Ok(mut recorder) = self.0.lock() {
            recorder.paths.push(color);
        }
    }

    fn clear_screen(&mut self) {
        if let Ok(mut recorder) = self.0.lock() {
            recorder.clears += 1;
        }
    }
}

#[test]
fn test_observer_sees_debug_primitives() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let steps = Arc::new(AtomicUsize::new(0));

    let mut planner = Adaptive2d::default();
    planner.set_observer(SharedRecorder(Arc::clone(&recorder)));
    let counter = Arc::clone(&steps);
    planner.set_progress_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        ControlFlow::Continue(())
    });

    let output = planner.execute(&[square(0.0, 30.0)]).expect("plan");
    assert_eq!(steps.load(Ordering::SeqCst), output.total_steps());

    let recorder = recorder.lock().expect("recorder");
    assert_eq!(recorder.clears, 1);
    assert_eq!(recorder.circles, vec![DebugColor::Green]);
    assert!(recorder.paths.contains(&DebugColor::Black));
    assert!(recorder.paths.contains(&DebugColor::Blue));
    assert!(recorder.paths.contains(&DebugColor::Red));
    assert!(recorder.paths.contains(&DebugColor::Yellow));
}

#[test]
fn test_profiling_inside_stays_in_band() {
    let config = AdaptiveConfig::default().with_operation(OperationType::ProfilingInside);
    let output = plan_adaptive(&[square(0.0, 60.0)], config).expect("plan");
    assert_eq!(output.outputs.len(), 1);

    for segment in output.outputs[0].cutting_segments() {
        for p in &segment.points {
            let in_center = p.x > 8.0 && p.x < 52.0 && p.y > 8.0 && p.y < 52.0;
            assert!(!in_center, "profiling cut the center at {p:?}");
        }
    }
}

#[test]
fn test_profiling_outside_stays_in_band() {
    let config = AdaptiveConfig::default().with_operation(OperationType::ProfilingOutside);
    let r = config.tool_radius();
    let band = 2.0 * (config.helix_radius() + r);
    let output = plan_adaptive(&[square(0.0, 40.0)], config).expect("plan");
    assert_eq!(output.outputs.len(), 1);

    let mut points = 0;
    for segment in output.outputs[0].cutting_segments() {
        for p in &segment.points {
            let dx = (-p.x).max(p.x - 40.0).max(0.0);
            let dy = (-p.y).max(p.y - 40.0).max(0.0);
            let d = dx.hypot(dy);
            assert!(d >= r - 0.2, "cut inside the part at {p:?}");
            assert!(d <= band - r + 0.2, "cut beyond the band at {p:?}");
            points += 1;
        }
    }
    assert!(points > 0);
}

#[test]
fn test_output_serializes_to_json() {
    let output = plan_adaptive(&[square(0.0, 25.0)], AdaptiveConfig::default()).expect("plan");
    let json = serde_json::to_string(&output).expect("serialize");
    let back: PlanOutput = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.outputs.len(), output.outputs.len());
    assert_eq!(back.final_state, PlannerState::Completed);
}
