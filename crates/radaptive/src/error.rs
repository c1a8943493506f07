use thiserror::Error;

use crate::types::PlanOutput;

/// Errors raised by the geometry kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Input geometry that cannot be repaired (too few vertices, zero area,
    /// self-intersection, non-finite coordinates).
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    /// A kernel primitive produced a topologically invalid result.
    #[error("kernel inconsistency: {0}")]
    Inconsistent(String),
}

/// Errors raised while validating an [`AdaptiveConfig`](crate::AdaptiveConfig).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tool diameter must be positive and finite, got {0}")]
    ToolDiameter(f64),

    #[error("tolerance must be positive and finite, got {0}")]
    Tolerance(f64),

    #[error("stepover factor must be in (0, 1], got {0}")]
    Stepover(f64),

    #[error("helix ramp diameter must be non-negative and finite, got {0}")]
    HelixDiameter(f64),

    #[error("max engagement angle must be in (0, pi/2] radians, got {0}")]
    EngagementAngle(f64),
}

/// Terminal reasons for a failed planning call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// An input polygon is malformed beyond repair.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// No planning region admits a valid initial engagement.
    #[error("tool diameter {tool_diameter} is too large for every region")]
    ToolTooLarge { tool_diameter: f64 },

    /// A progress observer requested early termination.
    #[error("planning cancelled by observer")]
    Cancelled,

    /// An offset or containment query returned an invalid result mid-planning.
    #[error("kernel inconsistency: {0}")]
    KernelInconsistency(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A runaway guard tripped before the region was cleared.
    #[error("{what} limit of {limit} reached before the region was cleared")]
    LimitReached { what: &'static str, limit: usize },
}

impl From<GeometryError> for PlanError {
    fn from(err: GeometryError) -> Self {
        match err {
            GeometryError::Degenerate(msg) => PlanError::DegenerateGeometry(msg),
            GeometryError::Inconsistent(msg) => PlanError::KernelInconsistency(msg),
        }
    }
}

/// A failed `execute` call: the reason plus everything planned before it.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct PlanFailure {
    #[source]
    pub error: PlanError,
    pub partial: PlanOutput,
}

impl PlanFailure {
    pub fn kind(&self) -> &PlanError {
        &self.error
    }
}

pub type GeometryResult<T> = Result<T, GeometryError>;
