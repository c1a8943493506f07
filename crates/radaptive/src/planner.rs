//! The adaptive clearing engine.
//!
//! [`Adaptive2d::execute`] takes every planning region through an entry
//! helix, a series of stepping passes, re-engagement along the tool boundary
//! and a finishing contour. On every step the tool is steered so that the
//! material removed per unit of travel stays close to an optimal value
//! derived from the stepover.

use crate::config::AdaptiveConfig;
use crate::engage::EngageWalker;
use crate::error::{PlanError, PlanFailure};
use crate::geometry::sweep::LocalSweep;
use crate::geometry::{
    self, average_direction, clean_path, offset_regions, points_coincide, rotate, Path,
    Point2D, Region, SweptArea, Vector2D,
};
use crate::interpolation::{clamp_angle, AngleInterpolator, MAX_ANGLE, MIN_ANGLE};
use crate::nesting::NestingForest;
use crate::progress::{CallbackObserver, DebugColor, Fanout, ProgressObserver, StepEvent};
use crate::types::{
    engagement_angle, AdaptiveOutput, EngagementRecord, MotionType, OperationType, PlanOutput,
    PlannerState, ToolpathSegment,
};
use std::f64::consts::FRAC_PI_4;
use std::ops::ControlFlow;
use std::slice;
use tracing::{debug, info, warn};

/// Angle probes per step.
const MAX_ITERATIONS: usize = 16;
/// Accepted deviation from the target cut rate, relative to the optimal rate.
const AREA_ERROR_FACTOR: f64 = 0.05;
const ANGLE_HISTORY_POINTS: usize = 3;
const DIRECTION_SMOOTHING_BUFLEN: usize = 3;
const ENGAGE_AREA_THR_FACTOR: f64 = 0.2;
const ENGAGE_SCAN_DISTANCE_FACTOR: f64 = 0.2;
/// Passes removing less than this share of a reference cut are discarded.
const MIN_CUT_AREA_FACTOR: f64 = 0.02;
/// Steps removing less than this share of an optimal minimum step end the pass.
const MIN_STEP_AREA_FACTOR: f64 = 0.01;
/// Simplification tolerances, relative to the configured tolerance.
const CLEAN_PATH_FACTOR: f64 = 0.125;
const FINISHING_CLEAN_PATH_FACTOR: f64 = 0.0625;
/// Extra probe taken after the first in-band hit, turned away from material.
const IN_BAND_REFINE_ANGLE: f64 = 0.02;
/// Runaway guards. Reaching one fails the call instead of leaving material.
const PASSES_LIMIT: usize = 1_000_000;
const POINTS_PER_PASS_LIMIT: usize = 1_000_000;
const ENTRY_SEARCH_ITERATIONS: usize = 48;

/// Quantities derived once per call from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CutParameters {
    tool_radius: f64,
    helix_radius: f64,
    finish_offset: f64,
    tolerance: f64,
    /// Chord tolerance for arcs produced by offsets.
    arc_tolerance: f64,
    stepover: f64,
    /// Area removed by a half-radius step into fresh stock.
    reference_area: f64,
    /// Target area per unit of travel.
    optimal_pd: f64,
    /// Target area per unit of travel right at the tool boundary.
    min_pd: f64,
}

impl CutParameters {
    fn new(config: &AdaptiveConfig) -> Self {
        let tool_radius = config.tool_radius();
        let reference_area = SweptArea::new().cut_area(
            Point2D::ORIGIN,
            Point2D::new(tool_radius / 2.0, 0.0),
            tool_radius,
        );
        let mut optimal_pd = 2.0 * config.stepover_factor * reference_area / tool_radius;
        if let Some(angle) = config.max_engagement_angle {
            optimal_pd = optimal_pd.min(tool_radius * (1.0 - angle.cos()));
        }
        Self {
            tool_radius,
            helix_radius: config.helix_radius(),
            finish_offset: config.tolerance / 2.0,
            tolerance: config.tolerance,
            arc_tolerance: config.tolerance / 4.0,
            stepover: config.stepover_factor,
            reference_area,
            optimal_pd,
            min_pd: optimal_pd / 3.0,
        }
    }

    /// Inset from the material boundary to the tool center.
    fn tool_inset(&self) -> f64 {
        self.tool_radius + self.finish_offset
    }

    /// Target cut rate, eased off towards the boundary at the end of a cut.
    fn target_area_pd(&self, to_boundary: f64, to_engage: f64) -> f64 {
        let relative = 2.0 * to_boundary / self.tool_radius;
        if relative < 1.0 && to_engage > self.tool_radius {
            relative * (self.optimal_pd - self.min_pd) + self.min_pd
        } else {
            self.optimal_pd
        }
    }

    /// Short steps near the boundary, near the engage point and in tight turns.
    fn step_size(&self, to_boundary: f64, to_engage: f64, angle: f64) -> f64 {
        let min_step = 2.0 * self.tolerance;
        let step = if to_boundary < self.tool_radius || to_engage < self.tool_radius {
            min_step
        } else if angle.abs() > 1e-5 {
            self.tolerance / angle.abs()
        } else {
            4.0 * self.tolerance
        };
        step.clamp(min_step, (self.tool_radius / 2.0).max(min_step))
    }

    fn min_step_area(&self) -> f64 {
        MIN_STEP_AREA_FACTOR * self.optimal_pd * 2.0 * self.tolerance
    }
}

/// One probed steering angle.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    angle: f64,
    direction: Vector2D,
    position: Point2D,
    area: f64,
    area_per_distance: f64,
}

/// Pick the probe to commit to.
///
/// Probes inside the error band win, lightest engagement first. Without one
/// the probe closest to the target wins. Ties go to the smallest turn.
fn select_candidate(candidates: &[Candidate], target: f64, max_error: f64) -> Option<Candidate> {
    let in_band = |c: &&Candidate| (c.area_per_distance - target).abs() < max_error;
    let smaller_turn = |a: &Candidate, b: &Candidate| a.angle.abs().total_cmp(&b.angle.abs());
    if candidates.iter().any(|c| in_band(&c)) {
        candidates
            .iter()
            .filter(in_band)
            .min_by(|a, b| {
                a.area_per_distance
                    .total_cmp(&b.area_per_distance)
                    .then_with(|| smaller_turn(a, b))
            })
            .copied()
    } else {
        candidates
            .iter()
            .min_by(|a, b| {
                let (ea, eb) = (
                    (a.area_per_distance - target).abs(),
                    (b.area_per_distance - target).abs(),
                );
                ea.total_cmp(&eb).then_with(|| smaller_turn(a, b))
            })
            .copied()
    }
}

/// Probe steering angles for one step until one lands inside the error band.
///
/// After the first in-band hit one more probe is taken, turned slightly away
/// from material, so [`select_candidate`] can prefer the lighter cut.
/// Returns whether any probe landed inside the band.
#[allow(clippy::too_many_arguments)]
fn search_step(
    local: &LocalSweep,
    cursor: &ToolCursor,
    radius: f64,
    predicted: f64,
    target: f64,
    max_error: f64,
    interp: &mut AngleInterpolator,
    candidates: &mut Vec<Candidate>,
) -> bool {
    interp.clear();
    candidates.clear();
    let mut refine = None;
    let mut converged = false;
    for iteration in 0..MAX_ITERATIONS {
        let probe = match (refine.take(), iteration) {
            (Some(angle), _) => angle,
            (None, 0) => predicted,
            (None, 1) => MIN_ANGLE,
            (None, 3) => MAX_ANGLE,
            (None, 5 | 9) => interp.probe_angle(),
            _ if interp.len() < 2 => interp.probe_angle(),
            _ => interp.interpolate(target),
        };
        let probe = clamp_angle(probe);
        let direction = rotate(cursor.dir, probe);
        let position = cursor.pos + direction * cursor.step;
        let area = local.cut_area(cursor.pos, position, radius);
        let candidate = Candidate {
            angle: probe,
            direction,
            position,
            area,
            area_per_distance: area / cursor.step,
        };
        interp.add_sample(candidate.area_per_distance, probe);
        candidates.push(candidate);
        if converged {
            break;
        }
        if (candidate.area_per_distance - target).abs() < max_error {
            converged = true;
            let lighter = clamp_angle(probe + IN_BAND_REFINE_ANGLE);
            if lighter <= probe {
                break;
            }
            refine = Some(lighter);
        }
    }
    converged
}

/// Position and heading of the tool while stepping.
#[derive(Debug, Clone, Copy)]
struct ToolCursor {
    pos: Point2D,
    dir: Vector2D,
    step: f64,
}

/// Raw result of one pass before it is cleaned and appended.
#[derive(Debug, Default)]
struct Pass {
    path: Path,
    cut_area: f64,
    /// Where the last probe ended, accepted or not.
    last_position: Option<Point2D>,
}

/// Runaway guards for one call.
#[derive(Debug, Clone, Copy)]
struct Limits {
    passes: usize,
    points_per_pass: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            passes: PASSES_LIMIT,
            points_per_pass: POINTS_PER_PASS_LIMIT,
        }
    }
}

#[derive(Debug, Default)]
struct RegionStats {
    passes: usize,
    points: usize,
    iterations: usize,
    exceeded: usize,
}

/// Adaptive clearing planner.
///
/// Holds the configuration and the registered observers between calls. All
/// planning state lives inside a single [`execute`](Self::execute) call, so
/// one engine can plan any number of inputs in sequence.
pub struct Adaptive2d {
    config: AdaptiveConfig,
    callbacks: CallbackObserver,
    observer: Option<Box<dyn ProgressObserver + Send>>,
    state: PlannerState,
}

impl Default for Adaptive2d {
    fn default() -> Self {
        Self::new(AdaptiveConfig::default())
    }
}

impl std::fmt::Debug for Adaptive2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adaptive2d")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("observer", &self.observer.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl Adaptive2d {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            callbacks: CallbackObserver::new(),
            observer: None,
            state: PlannerState::Idle,
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// State reached by the last call, `Idle` before the first one.
    pub fn state(&self) -> PlannerState {
        self.state
    }

    /// Called after every accepted step. Return `ControlFlow::Break(())` to cancel.
    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&StepEvent<'_>) -> ControlFlow<()> + Send + 'static,
    {
        self.callbacks.set_step(callback);
    }

    pub fn set_draw_circle_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Point2D, f64, DebugColor) + Send + 'static,
    {
        self.callbacks.set_draw_circle(callback);
    }

    pub fn set_draw_path_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&[Point2D], DebugColor) + Send + 'static,
    {
        self.callbacks.set_draw_path(callback);
    }

    pub fn set_clear_screen_callback<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.callbacks.set_clear_screen(callback);
    }

    /// Register a trait-object observer alongside the closure callbacks.
    pub fn set_observer<O>(&mut self, observer: O)
    where
        O: ProgressObserver + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Plan adaptive clearing for a set of closed paths.
    ///
    /// Paths may come in any order and winding; containment decides which
    /// are boundaries and which are islands. On failure the returned
    /// [`PlanFailure`] carries everything planned up to that point.
    pub fn execute(&mut self, paths: &[Path]) -> Result<PlanOutput, PlanFailure> {
        let config = self.config.clone();
        self.state = PlannerState::Initializing;
        debug!(state = ?self.state, paths = paths.len(), "execute");

        let mut observers: Vec<&mut (dyn ProgressObserver + Send)> = Vec::new();
        observers.push(&mut self.callbacks);
        if let Some(observer) = self.observer.as_mut() {
            observers.push(&mut **observer);
        }
        let mut fanout = Fanout::new(observers);

        let mut ctx = PlanContext::new(&config, &mut fanout);
        let result = ctx.run(paths);
        let mut output = ctx.output;

        match result {
            Ok(()) => {
                self.state = PlannerState::Completed;
                output.final_state = PlannerState::Completed;
                info!(
                    regions = output.outputs.len(),
                    steps = output.total_steps(),
                    skipped = output.skipped_regions,
                    "planning completed"
                );
                Ok(output)
            }
            Err(error) => {
                self.state = PlannerState::Failed;
                output.final_state = PlannerState::Failed;
                warn!(%error, steps = output.total_steps(), "planning failed");
                Err(PlanFailure {
                    error,
                    partial: output,
                })
            }
        }
    }
}

/// Everything owned by one `execute` call.
struct PlanContext<'a, O: ProgressObserver> {
    config: &'a AdaptiveConfig,
    params: CutParameters,
    limits: Limits,
    observer: &'a mut O,
    state: PlannerState,
    output: PlanOutput,
}

impl<'a, O: ProgressObserver> PlanContext<'a, O> {
    fn new(config: &'a AdaptiveConfig, observer: &'a mut O) -> Self {
        Self {
            config,
            params: CutParameters::new(config),
            limits: Limits::default(),
            observer,
            state: PlannerState::Initializing,
            output: PlanOutput {
                final_state: PlannerState::Initializing,
                ..PlanOutput::default()
            },
        }
    }

    fn set_state(&mut self, state: PlannerState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "planner state");
            self.state = state;
            self.output.final_state = state;
        }
    }

    fn run(&mut self, paths: &[Path]) -> Result<(), PlanError> {
        // Step 1: Validate the configuration and resolve the nesting forest.
        self.config.validate()?;
        let forest = NestingForest::resolve(paths)?;
        let (regions, report) = forest.planning_regions(self.config.poly_tree_nesting_limit);
        self.output.nesting = report;

        // Step 2: Material to remove for the requested operation.
        let material = self.material_regions(regions)?;
        info!(
            regions = material.len(),
            dropped = self.output.nesting.dropped_count(),
            tool_diameter = self.config.tool_diameter,
            optimal_width = self.params.optimal_pd,
            "planning started"
        );

        // Step 3: Plan every region the tool fits into.
        let (tolerance, inset) = (self.params.arc_tolerance, self.params.tool_inset());
        let mut planned = 0;
        let mut too_small = 0;
        for (index, region) in material.iter().enumerate() {
            let tool_bounds = offset_regions(slice::from_ref(region), inset, tolerance)?;
            if tool_bounds.is_empty() {
                if self.consumed_by_islands(region)? {
                    debug!(region = index, "islands leave nothing to clear");
                } else {
                    warn!(region = index, area = region.area(), "region is too small for the tool");
                    too_small += 1;
                }
                continue;
            }
            for tool_bound in &tool_bounds {
                match self.entry_point(tool_bound)? {
                    Some((entry, bound)) => {
                        self.set_state(PlannerState::Stepping);
                        self.plan_region(tool_bound, &bound, entry)?;
                        planned += 1;
                    }
                    None => {
                        warn!(region = index, "entry helix does not fit");
                        too_small += 1;
                    }
                }
            }
        }

        self.output.skipped_regions = too_small;
        if planned == 0 && too_small > 0 {
            return Err(PlanError::ToolTooLarge {
                tool_diameter: self.config.tool_diameter,
            });
        }
        Ok(())
    }

    fn material_regions(&self, regions: Vec<Region>) -> Result<Vec<Region>, PlanError> {
        let band = 2.0 * (self.params.helix_radius + self.params.tool_radius);
        let tolerance = self.params.arc_tolerance;
        let material = match self.config.operation_type {
            OperationType::Clearing => regions,
            OperationType::ProfilingInside => {
                let inner = offset_regions(&regions, band, tolerance)?;
                geometry::difference(&regions, &inner)?
            }
            OperationType::ProfilingOutside => {
                let mut grown: Vec<Region> = Vec::new();
                for region in offset_regions(&regions, -band, tolerance)? {
                    grown = geometry::union(&grown, slice::from_ref(&region))?;
                }
                geometry::difference(&grown, &regions)?
            }
        };
        Ok(material)
    }

    /// Whether the tool would fit without the islands.
    fn consumed_by_islands(&self, region: &Region) -> Result<bool, PlanError> {
        if region.holes.is_empty() {
            return Ok(false);
        }
        let outer_only = Region::new(region.outer.clone());
        let inset = offset_regions(
            slice::from_ref(&outer_only),
            self.params.tool_inset(),
            self.params.arc_tolerance,
        )?;
        Ok(!inset.is_empty())
    }

    /// Entry point and bound region for one tool-bound region.
    ///
    /// The entry is the deepest point of the tool-bound region, found by
    /// bisecting on the inset distance. `None` when the helix does not fit.
    fn entry_point(&self, tool_bound: &Region) -> Result<Option<(Point2D, Region)>, PlanError> {
        let p = self.params;
        let bound = offset_regions(slice::from_ref(tool_bound), -p.tool_inset(), p.arc_tolerance)?
            .into_iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()));
        let Some(bound) = bound else {
            return Ok(None);
        };

        let bbox = tool_bound.bounding_box();
        let (mut lo, mut hi) = (0.0, bbox.width().min(bbox.height()) / 2.0 + p.tolerance);
        let mut deepest = tool_bound.clone();
        for _ in 0..ENTRY_SEARCH_ITERATIONS {
            if hi - lo <= p.tolerance / 4.0 {
                break;
            }
            let mid = (lo + hi) / 2.0;
            let inset = offset_regions(slice::from_ref(tool_bound), mid, p.arc_tolerance)?
                .into_iter()
                .max_by(|a, b| a.area().total_cmp(&b.area()));
            match inset {
                Some(region) => {
                    lo = mid;
                    deepest = region;
                }
                None => hi = mid,
            }
        }

        let centroid = deepest.outer.centroid();
        let entry = if deepest.contains_point(centroid) {
            centroid
        } else {
            deepest.outer.points()[0]
        };

        // The helix may reach into the finishing allowance, not past it.
        let clearance = bound.distance_to_boundary(entry) + p.finish_offset + p.tolerance;
        if !bound.contains_point(entry) || clearance < p.helix_radius + p.tool_radius {
            debug!(clearance, depth = lo, "helix clearance too small");
            return Ok(None);
        }
        Ok(Some((entry, bound)))
    }

    fn plan_region(
        &mut self,
        tool_bound: &Region,
        bound: &Region,
        entry: Point2D,
    ) -> Result<(), PlanError> {
        let p = self.params;
        let r = p.tool_radius;
        let tolerance = p.tolerance;
        let start = entry - Vector2D::new(0.0, p.helix_radius);
        let mut output = AdaptiveOutput {
            helix_center: entry,
            start_point: start,
            segments: Vec::new(),
            return_motion: MotionType::LinkClear,
        };
        info!(x = entry.x, y = entry.y, area = bound.area(), "planning region");

        // Step 1: Seed the cleared model with the helix and draw the scene.
        let mut cleared = SweptArea::new();
        cleared.add_disc(entry, p.helix_radius + r);

        self.observer.clear_screen();
        for ring in bound.rings() {
            self.observer.draw_path(ring.points(), DebugColor::Black);
        }
        for ring in tool_bound.rings() {
            self.observer.draw_path(ring.points(), DebugColor::Blue);
        }
        self.observer
            .draw_circle(entry, p.helix_radius + r, DebugColor::Green);

        // Step 2: Passes, each followed by a search for the next engage point.
        let mut cursor = ToolCursor {
            pos: start,
            dir: Vector2D::new(1.0, 0.0),
            step: 2.0 * tolerance,
        };
        let mut engage = EngageWalker::new(tool_bound, tolerance);
        let mut first_engage = true;
        let move_distance = ENGAGE_SCAN_DISTANCE_FACTOR * p.stepover * r + tolerance / 8.0;
        let min_engage_area = ENGAGE_AREA_THR_FACTOR * p.optimal_pd * move_distance;
        let max_engage_area = 2.0 * p.optimal_pd * move_distance;
        let mut stats = RegionStats::default();

        let mut pass_index = 0;
        loop {
            if pass_index == self.limits.passes {
                warn!(limit = pass_index, "pass limit reached with material left");
                return Err(PlanError::LimitReached {
                    what: "pass",
                    limit: pass_index,
                });
            }
            let pass = self.run_pass(tool_bound, &mut cleared, &mut cursor, &mut stats)?;

            let min_cut = MIN_CUT_AREA_FACTOR * cursor.step * p.stepover * p.reference_area;
            if pass.cut_area > min_cut {
                let cleaned = clean_path(&pass.path, tolerance * CLEAN_PATH_FACTOR);
                self.append_toolpath(&mut output, cleaned, &cleared, DebugColor::Red);
                stats.passes += 1;
            } else if !pass.path.is_empty() {
                debug!(pass = pass_index, area = pass.cut_area, "discarding pass below minimum cut");
            }

            if first_engage {
                engage.move_to_closest_point(pass.last_position.unwrap_or(cursor.pos));
                first_engage = false;
            } else if !engage.next_engage_point(
                &cleared,
                r,
                move_distance,
                min_engage_area,
                max_engage_area,
            ) {
                break;
            }
            cursor.pos = engage.current_point();
            cursor.dir = engage.current_dir();
            pass_index += 1;
        }

        // Step 3: Finishing contour along the walls.
        let finishing = offset_regions(slice::from_ref(bound), r, p.arc_tolerance)?;
        for region in &finishing {
            for ring in region.rings() {
                let mut closed = ring.points().to_vec();
                closed.push(ring.points()[0]);
                let cleaned = clean_path(&closed, tolerance * FINISHING_CLEAN_PATH_FACTOR);
                self.append_toolpath(&mut output, cleaned, &cleared, DebugColor::Yellow);
                cleared.add_path(&closed, r);
            }
        }

        // Step 4: Classify the move back to the helix.
        let last = output.last_point().unwrap_or(output.start_point);
        output.return_motion = self.link_motion(&cleared, last, entry);

        info!(
            passes = stats.passes,
            points = stats.points,
            iterations = stats.iterations,
            exceeded = stats.exceeded,
            segments = output.segments.len(),
            "region planned"
        );
        self.output.outputs.push(output);
        Ok(())
    }

    /// Step the tool until it leaves material or reaches the boundary.
    fn run_pass(
        &mut self,
        tool_bound: &Region,
        cleared: &mut SweptArea,
        cursor: &mut ToolCursor,
        stats: &mut RegionStats,
    ) -> Result<Pass, PlanError> {
        let p = self.params;
        let r = p.tool_radius;
        let engage_pos = cursor.pos;
        let engage_dir = cursor.dir;
        let max_error = AREA_ERROR_FACTOR * p.optimal_pd;
        let min_step_area = p.min_step_area();

        let mut pass = Pass::default();
        let mut history: Vec<f64> = Vec::with_capacity(ANGLE_HISTORY_POINTS + 1);
        let mut gyro = vec![cursor.dir; DIRECTION_SMOOTHING_BUFLEN];
        let mut interp = AngleInterpolator::new();
        let mut angle = FRAC_PI_4;
        let mut candidates: Vec<Candidate> = Vec::with_capacity(MAX_ITERATIONS);

        for point_index in 0.. {
            if point_index == self.limits.points_per_pass {
                warn!(limit = point_index, "point limit reached inside one pass");
                return Err(PlanError::LimitReached {
                    what: "point per pass",
                    limit: point_index,
                });
            }
            stats.points += 1;
            if let Some(dir) = average_direction(&gyro) {
                cursor.dir = dir;
            }
            let to_boundary = tool_bound.distance_to_boundary(cursor.pos);
            let to_engage = cursor.pos.distance(engage_pos);
            let target = p.target_area_pd(to_boundary, to_engage);
            cursor.step = p.step_size(to_boundary, to_engage, angle);

            // Angle vs. area iterations.
            let local = cleared.around(cursor.pos, cursor.step + r);
            let predicted = if history.is_empty() {
                0.0
            } else {
                history.iter().sum::<f64>() / history.len() as f64
            };
            let converged = search_step(
                &local,
                cursor,
                r,
                predicted,
                target,
                max_error,
                &mut interp,
                &mut candidates,
            );
            stats.iterations += candidates.len();
            let Some(chosen) = select_candidate(&candidates, target, max_error) else {
                break;
            };
            angle = chosen.angle;
            if converged {
                history.push(angle);
                if history.len() > ANGLE_HISTORY_POINTS {
                    history.remove(0);
                }
            } else {
                stats.exceeded += 1;
            }

            // Clip the step at the tool boundary.
            let mut position = chosen.position;
            let mut area = chosen.area;
            let mut reached_boundary = false;
            if to_boundary < r && !tool_bound.covers_point(position) {
                reached_boundary = true;
                match tool_bound.first_boundary_crossing(cursor.pos, position) {
                    Some(hit) => {
                        position = hit;
                        area = local.cut_area(cursor.pos, hit, r);
                    }
                    None => {
                        position = cursor.pos;
                        area = 0.0;
                    }
                }
            }
            pass.last_position = Some(position);

            let area_pd = area / cursor.step;
            if area_pd > 2.0 * p.optimal_pd + p.tolerance {
                warn!(area_pd, optimal = p.optimal_pd, "over cut, ending pass");
                break;
            }
            if area <= min_step_area {
                break;
            }

            pass.cut_area += area;
            if pass.path.is_empty() {
                pass.path.push(cursor.pos);
            }
            pass.path.push(position);
            cleared.add_segment(cursor.pos, position, r);
            cursor.pos = position;
            gyro.push(chosen.direction);
            gyro.remove(0);
            self.record_step(engage_pos, engage_dir, cursor, angle, area)?;

            if reached_boundary {
                break;
            }
        }
        Ok(pass)
    }

    /// Record an accepted step and notify the observers.
    fn record_step(
        &mut self,
        engage_pos: Point2D,
        engage_dir: Vector2D,
        cursor: &ToolCursor,
        rotation: f64,
        area: f64,
    ) -> Result<(), PlanError> {
        let area_per_distance = area / cursor.step;
        let angle = engagement_angle(area_per_distance, self.params.tool_radius);
        self.output.current_path.push(cursor.pos);
        let step = self.output.current_path.len();
        self.output.engagements.push(EngagementRecord {
            step,
            position: cursor.pos,
            direction: cursor.dir,
            rotation,
            cut_area: area,
            area_per_distance,
            engagement_angle: angle,
        });

        let event = StepEvent {
            step,
            current_path: &self.output.current_path,
            engage_pos,
            engage_dir,
            tool_pos: cursor.pos,
            tool_dir: cursor.dir,
            engagement_angle: angle,
        };
        if self.observer.on_step(&event).is_break() {
            info!(step, "planning cancelled by observer");
            return Err(PlanError::Cancelled);
        }
        Ok(())
    }

    /// Append a cutting run, linking it to the previous one.
    fn append_toolpath(
        &mut self,
        output: &mut AdaptiveOutput,
        path: Path,
        cleared: &SweptArea,
        color: DebugColor,
    ) {
        let Some(&first) = path.first() else {
            return;
        };
        let previous = output.last_point().unwrap_or(output.start_point);
        if !points_coincide(previous, first) {
            let motion = self.link_motion(cleared, previous, first);
            let link = vec![previous, first];
            self.observer.draw_path(&link, DebugColor::Magenta);
            output.segments.push(ToolpathSegment::new(motion, link));
        }
        self.observer.draw_path(&path, color);
        output
            .segments
            .push(ToolpathSegment::new(MotionType::Cutting, path));
    }

    /// `LinkClear` when the straight move stays over cleared material.
    fn link_motion(&self, cleared: &SweptArea, from: Point2D, to: Point2D) -> MotionType {
        let p = self.params;
        let radius = p.tool_radius - p.tolerance / 4.0;
        let uncut = cleared.uncovered_area(from, to, radius);
        if uncut <= p.tolerance * p.tolerance * 0.01 {
            MotionType::LinkClear
        } else {
            MotionType::LinkNotClear
        }
    }
}
