use crate::error::ConfigError;
use crate::types::OperationType;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Tunable parameters of the adaptive planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub tool_diameter: f64,
    /// Diameter of the entry helix. Zero means "same as the tool".
    pub helix_ramp_diameter: f64,
    /// Optimal cut width as a fraction of the tool diameter.
    pub stepover_factor: f64,
    /// Optional hard cap on the radial engagement angle, in radians.
    pub max_engagement_angle: Option<f64>,
    /// Deepest boundary level that is planned. Zero means unlimited.
    pub poly_tree_nesting_limit: usize,
    /// Geometric resolution in world units.
    pub tolerance: f64,
    pub operation_type: OperationType,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            tool_diameter: 5.0,
            helix_ramp_diameter: 0.0,
            stepover_factor: 0.2,
            max_engagement_angle: None,
            poly_tree_nesting_limit: 0,
            tolerance: 0.1,
            operation_type: OperationType::Clearing,
        }
    }
}

impl AdaptiveConfig {
    pub fn with_tool_diameter(mut self, diameter: f64) -> Self {
        self.tool_diameter = diameter;
        self
    }

    pub fn with_nesting_limit(mut self, limit: usize) -> Self {
        self.poly_tree_nesting_limit = limit;
        self
    }

    pub fn with_operation(mut self, operation: OperationType) -> Self {
        self.operation_type = operation;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tool_diameter.is_finite() && self.tool_diameter > 0.0) {
            return Err(ConfigError::ToolDiameter(self.tool_diameter));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::Tolerance(self.tolerance));
        }
        if !(self.stepover_factor.is_finite()
            && self.stepover_factor > 0.0
            && self.stepover_factor <= 1.0)
        {
            return Err(ConfigError::Stepover(self.stepover_factor));
        }
        if !(self.helix_ramp_diameter.is_finite() && self.helix_ramp_diameter >= 0.0) {
            return Err(ConfigError::HelixDiameter(self.helix_ramp_diameter));
        }
        if let Some(angle) = self.max_engagement_angle {
            if !(angle.is_finite() && angle > 0.0 && angle <= FRAC_PI_2) {
                return Err(ConfigError::EngagementAngle(angle));
            }
        }
        Ok(())
    }

    pub fn tool_radius(&self) -> f64 {
        self.tool_diameter / 2.0
    }

    /// Helix radius, falling back to the tool radius and never exceeding it.
    pub fn helix_radius(&self) -> f64 {
        if self.helix_ramp_diameter <= 0.0 {
            self.tool_radius()
        } else {
            (self.helix_ramp_diameter / 2.0).min(self.tool_radius())
        }
    }
}
