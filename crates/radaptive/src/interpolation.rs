use std::f64::consts::FRAC_PI_4;

/// Steering angle with the largest engagement (hard turn into material).
pub const MIN_ANGLE: f64 = -FRAC_PI_4;
/// Steering angle with the smallest engagement (turn away from material).
pub const MAX_ANGLE: f64 = FRAC_PI_4;

const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;

/// Maps a target cut rate back to a steering angle from the samples probed so far.
///
/// Samples are kept sorted by cut rate. Cut rate falls monotonically as the
/// angle grows, so linear interpolation between neighbours converges quickly.
#[derive(Debug, Default, Clone)]
pub struct AngleInterpolator {
    /// (area per distance, angle), ascending by area.
    samples: Vec<(f64, f64)>,
    probes: usize,
}

impl AngleInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.probes = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn add_sample(&mut self, area_per_distance: f64, angle: f64) {
        let index = self
            .samples
            .partition_point(|&(area, _)| area <= area_per_distance);
        self.samples.insert(index, (area_per_distance, angle));
    }

    /// Angle expected to produce `target` area per distance.
    ///
    /// Targets above every sample ask for maximum engagement, targets below
    /// every sample for minimum engagement.
    pub fn interpolate(&self, target: f64) -> f64 {
        let (first, last) = match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => (*first, *last),
            _ => return MIN_ANGLE,
        };
        if target > last.0 {
            return MIN_ANGLE;
        }
        if target < first.0 {
            return MAX_ANGLE;
        }
        for pair in self.samples.windows(2) {
            let ((a0, g0), (a1, g1)) = (pair[0], pair[1]);
            if a0 <= target && target < a1 {
                let t = (target - a0) / (a1 - a0);
                return g0 + t * (g1 - g0);
            }
        }
        // target equals the largest sample
        last.1
    }

    /// Next angle of a low-discrepancy sequence over the steering range.
    ///
    /// Used to escape interpolation plateaus; deterministic, so identical
    /// inputs always plan identical paths.
    pub fn probe_angle(&mut self) -> f64 {
        self.probes += 1;
        let unit = (0.5 + self.probes as f64 * GOLDEN_RATIO_CONJUGATE).fract();
        MIN_ANGLE + (MAX_ANGLE - MIN_ANGLE) * unit
    }
}

pub fn clamp_angle(angle: f64) -> f64 {
    angle.clamp(MIN_ANGLE, MAX_ANGLE)
}
