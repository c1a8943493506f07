pub mod config;
pub mod engage;
pub mod error;
pub mod geometry;
pub mod interpolation;
pub mod nesting;
pub mod planner;
pub mod progress;
mod types;

pub use config::AdaptiveConfig;
pub use error::{ConfigError, GeometryError, PlanError, PlanFailure};
pub use geometry::{Path, Point2D, Polygon, Region, Vector2D};
pub use nesting::{NestingForest, NestingNode};
pub use planner::Adaptive2d;
pub use progress::{CallbackObserver, DebugColor, NoopObserver, ProgressObserver, StepEvent};
pub use types::*;

/// Plan adaptive clearing for `paths` with a fresh engine and no observers.
pub fn plan_adaptive(paths: &[Path], config: AdaptiveConfig) -> Result<PlanOutput, PlanFailure> {
    Adaptive2d::new(config).execute(paths)
}
