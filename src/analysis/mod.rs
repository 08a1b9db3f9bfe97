//! Recalculation options and physical constants

use serde::{Deserialize, Serialize};

/// Density of air in kg/m³
pub const RHO_AIR: f64 = 1.2;

/// Drag coefficient of a round line in cross flow
pub const DEFAULT_LINE_CW: f64 = 1.1;

/// Force assigned to a line whose force cannot be derived (N)
pub const FALLBACK_FORCE: f64 = 10.0;

/// Options for a line-set recalculation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalcOptions {
    /// Number of outer iterations (geometry pass + force/sag pass)
    pub iterations: usize,
    /// Solve the drag-induced sag of every line
    pub calculate_sag: bool,
    /// Fraction of the residual-force correction applied to knots
    pub correction_damping: f64,
    /// Force used when the projection of a canopy load is degenerate
    pub fallback_force: f64,
}

impl Default for RecalcOptions {
    fn default() -> Self {
        Self {
            iterations: 5,
            calculate_sag: true,
            correction_damping: 0.5,
            fallback_force: FALLBACK_FORCE,
        }
    }
}

impl RecalcOptions {
    /// Straight lines only (forces, no sag)
    pub fn without_sag(mut self) -> Self {
        self.calculate_sag = false;
        self
    }

    /// Set the number of outer iterations
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the force used for degenerate projections
    pub fn with_fallback_force(mut self, force: f64) -> Self {
        self.fallback_force = force;
        self
    }

    /// Set the residual-force damping factor
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.correction_damping = damping;
        self
    }
}
