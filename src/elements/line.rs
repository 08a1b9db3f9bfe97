//! Line element - a loaded segment between two nodes

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{LineType, NodeId};
use crate::error::{LineSetError, LineSetResult};
use crate::math::{SagCurve, Vec3};

/// Stable index of a line inside its line set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineId(pub usize);

/// Axial force of a line
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LineForce {
    /// Not computed since the last reset
    #[default]
    Unsolved,
    /// Tension in N
    Solved(f64),
}

impl LineForce {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Unsolved => None,
            Self::Solved(f) => Some(*f),
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Solved(_))
    }
}

/// A line between a lower and an upper node
#[derive(Debug, Clone)]
pub struct Line {
    /// Line name (see `LineSet::rename_lines`)
    pub name: String,
    /// Node below (towards the pilot)
    pub lower_node: NodeId,
    /// Node above (towards the canopy)
    pub upper_node: NodeId,
    /// Line product
    pub line_type: Arc<LineType>,
    /// Unstretched length in m
    pub init_length: f64,
    /// Design length for length fitting
    pub target_length: Option<f64>,
    /// Colour variant name
    pub color: Option<String>,

    pub(crate) force: LineForce,
    pub(crate) sag: Option<SagCurve>,
    /// Unit vector from lower to upper node, refreshed after node moves
    pub(crate) diff_vector: Vec3,
    pub(crate) chord_length: f64,
}

impl Line {
    /// Create a new line between two nodes
    pub fn new(
        name: &str,
        lower_node: NodeId,
        upper_node: NodeId,
        line_type: Arc<LineType>,
        init_length: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            lower_node,
            upper_node,
            line_type,
            init_length,
            target_length: None,
            color: None,
            force: LineForce::Unsolved,
            sag: None,
            diff_vector: Vec3::zeros(),
            chord_length: 0.0,
        }
    }

    pub fn with_target_length(mut self, target_length: f64) -> Self {
        self.target_length = Some(target_length);
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    /// Current force state
    pub fn force(&self) -> LineForce {
        self.force
    }

    /// Solved sag profile, if any
    pub fn sag(&self) -> Option<&SagCurve> {
        self.sag.as_ref()
    }

    /// Solved sag parameters `(c1, c2)`
    pub fn sag_parameters(&self) -> Option<(f64, f64)> {
        self.sag.map(|s| (s.c1, s.c2))
    }

    /// Unit direction from the lower to the upper node
    pub fn diff_vector(&self) -> Vec3 {
        self.diff_vector
    }

    /// Straight distance between both nodes
    pub fn length_no_sag(&self) -> f64 {
        self.chord_length
    }

    /// Length along the sagged line, falls back to the chord
    pub fn length_with_sag(&self) -> f64 {
        match &self.sag {
            Some(sag) => sag.arc_length(),
            None => self.chord_length,
        }
    }

    pub(crate) fn update_geometry(&mut self, lower: &Vec3, upper: &Vec3) {
        let diff = upper - lower;
        self.chord_length = diff.norm();
        self.diff_vector = diff.try_normalize(1e-12).unwrap_or_else(Vec3::zeros);
    }

    /// Production length under the current force.
    ///
    /// `init_length` scaled by the stretch of the line type at the current
    /// force; with `sag` the elongation of the solved sag curve over the
    /// chord is applied as well. Without a computed force the sag variant
    /// fails, the straight variant assumes no load.
    pub fn get_stretched_length(&self, sag: bool) -> LineSetResult<f64> {
        let force = match self.force {
            LineForce::Solved(f) => f,
            LineForce::Unsolved if sag => {
                return Err(LineSetError::ForceNotComputed(self.name.clone()));
            }
            LineForce::Unsolved => {
                log::warn!("force not set for line {}, assuming unloaded", self.name);
                0.0
            }
        };

        let mut length = self.init_length * self.line_type.stretch_factor(force);
        if sag {
            if let Some(curve) = &self.sag {
                length *= curve.elongation();
            }
        }
        Ok(length)
    }

    /// Lateral stiffness of this line against a residual force at its upper node.
    ///
    /// A line under tension `f` with length `l` resists a sideways shift of
    /// its end by `f / l` per metre; only the part of the residual acting
    /// across the line counts.
    pub fn get_correction_influence(&self, residual_force: &Vec3) -> f64 {
        let force = match self.force {
            LineForce::Solved(f) => f,
            LineForce::Unsolved => return 0.0,
        };
        if self.chord_length < 1e-12 {
            return 0.0;
        }
        let across = match residual_force.try_normalize(1e-12) {
            Some(r) => 1.0 - self.diff_vector.dot(&r).powi(2),
            None => 1.0,
        };
        force / self.chord_length * across
    }

    /// Weight of the line in g
    pub fn get_weight(&self) -> f64 {
        let length = self.get_stretched_length(false).unwrap_or(self.init_length);
        self.line_type.weight * length
    }
}
