//! Global sag system of a line set
//!
//! Every line carries a parabolic sag profile in the plane spanned by its
//! projected chord and the inflow direction:
//!
//! ```text
//! y(u) = -q / (2 H) * u² + c1 * u + c2,    u ∈ [0, Lp]
//! ```
//!
//! - `u`  - abscissa along the chord projected perpendicular to the inflow
//! - `Lp` - projected chord length
//! - `H`  - line force projected onto that plane
//! - `q`  - drag load per unit length perpendicular to the line
//!
//! The two unknowns `c1`, `c2` of line `i` live at `2*i` and `2*i + 1`.
//! Row `2*i` holds the condition at the upper end of the line, row `2*i + 1`
//! the condition at its lower end.

use crate::error::{LineSetError, LineSetResult};

use super::{simpson, Mat, Vec};

/// Relative size of the smallest LU pivot accepted as non-singular
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Projected lengths below this are treated as degenerate (m)
pub const MIN_PROJECTED_LENGTH: f64 = 1e-6;

/// Number of Simpson intervals used for arc lengths
const ARC_INTERVALS: usize = 32;

/// Per-line quantities entering the sag system
#[derive(Debug, Clone, Copy)]
pub struct SagLine {
    /// Index of the line in the line set
    pub index: usize,
    /// Line force projected perpendicular to the inflow (N)
    pub force_projected: f64,
    /// Chord length projected perpendicular to the inflow (m)
    pub length_projected: f64,
    /// Drag load per unit length (N/m)
    pub ortho_pressure: f64,
}

impl SagLine {
    fn upper_row(&self) -> usize {
        2 * self.index
    }

    fn lower_row(&self) -> usize {
        2 * self.index + 1
    }

    fn c1(&self) -> usize {
        2 * self.index
    }

    fn c2(&self) -> usize {
        2 * self.index + 1
    }

    /// Curvature term `q / H`
    pub fn q_over_h(&self) -> f64 {
        self.ortho_pressure / self.force_projected
    }

    /// Sag offset of the unloaded parabola at the upper end, `q Lp² / (2H)`
    fn end_offset(&self) -> f64 {
        self.q_over_h() * self.length_projected.powi(2) / 2.0
    }
}

/// Dense linear system coupling the sag parameters of all lines
#[derive(Debug, Clone)]
pub struct SagMatrix {
    labels: std::vec::Vec<String>,
    matrix: Mat,
    rhs: Vec,
    solution: Option<Vec>,
}

impl SagMatrix {
    /// Create an empty system for the given lines (one label per line)
    pub fn new(labels: std::vec::Vec<String>) -> Self {
        let size = labels.len() * 2;
        Self {
            labels,
            matrix: Mat::zeros(size, size),
            rhs: Vec::zeros(size),
            solution: None,
        }
    }

    /// Number of unknowns
    pub fn size(&self) -> usize {
        self.rhs.len()
    }

    /// Lower end fixed at an anchor: `c2 = 0`
    pub fn insert_type_0_lower(&mut self, line: &SagLine) {
        let row = line.lower_row();
        self.matrix[(row, line.c2())] = 1.0;
        self.rhs[row] = 0.0;
    }

    /// Lower end continues the single line below the knot.
    ///
    /// The offset at the start of `line` equals the offset at the end of
    /// `lower`: `c2_i - Lp_j c1_j - c2_j = -q_j Lp_j² / (2 H_j)`.
    pub fn insert_type_1_lower(&mut self, line: &SagLine, lower: &SagLine) {
        let row = line.lower_row();
        self.matrix[(row, line.c2())] = 1.0;
        self.matrix[(row, lower.c1())] = -lower.length_projected;
        self.matrix[(row, lower.c2())] = -1.0;
        self.rhs[row] = -lower.end_offset();
    }

    /// Upper end is a knot: transverse force balance with the lines above.
    ///
    /// `H_i y_i'(Lp_i) = Σ H_u y_u'(0)` which reads
    /// `H_i c1_i - Σ H_u c1_u = q_i Lp_i`.
    pub fn insert_type_1_upper(&mut self, line: &SagLine, upper: &[SagLine]) {
        let row = line.upper_row();
        self.matrix[(row, line.c1())] = line.force_projected;
        for u in upper {
            self.matrix[(row, u.c1())] = -u.force_projected;
        }
        self.rhs[row] = line.ortho_pressure * line.length_projected;
    }

    /// Upper end attached to the canopy: `Lp c1 + c2 = q Lp² / (2H)`
    pub fn insert_type_2_upper(&mut self, line: &SagLine) {
        let row = line.upper_row();
        self.matrix[(row, line.c1())] = line.length_projected;
        self.matrix[(row, line.c2())] = 1.0;
        self.rhs[row] = line.end_offset();
    }

    /// Solve the system with partial-pivoting LU.
    ///
    /// An empty row or a vanishing pivot is mapped back to the line owning
    /// that equation or unknown.
    pub fn solve(&mut self) -> LineSetResult<()> {
        self.solution = None;
        if self.size() == 0 {
            self.solution = Some(Vec::zeros(0));
            return Ok(());
        }

        // an empty equation points straight at the line that produced it
        if let Some(row) = self
            .matrix
            .row_iter()
            .position(|r| r.iter().all(|v| v.abs() < f64::MIN_POSITIVE))
        {
            return Err(self.singular_at(row));
        }

        let lu = self.matrix.clone().lu();
        let pivots = lu.u().diagonal();
        let scale = pivots.iter().fold(0.0_f64, |acc, p| acc.max(p.abs()));
        if let Some(k) = pivots
            .iter()
            .position(|p| !p.is_finite() || p.abs() <= PIVOT_TOLERANCE * scale)
        {
            return Err(self.singular_at(k));
        }

        let x = lu.solve(&self.rhs).ok_or_else(|| self.singular_at(0))?;
        if let Some(k) = x.iter().position(|v| !v.is_finite()) {
            return Err(self.singular_at(k));
        }

        self.solution = Some(x);
        Ok(())
    }

    fn singular_at(&self, unknown: usize) -> LineSetError {
        let label = self
            .labels
            .get(unknown / 2)
            .cloned()
            .unwrap_or_else(|| format!("#{}", unknown / 2));
        LineSetError::SingularSagMatrix(label)
    }

    /// Solved parameters `(c1, c2)` of a line
    pub fn sag_parameters(&self, line: usize) -> Option<(f64, f64)> {
        self.solution
            .as_ref()
            .map(|x| (x[2 * line], x[2 * line + 1]))
    }
}

/// Solved sag profile of a single line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SagCurve {
    pub c1: f64,
    pub c2: f64,
    /// Curvature term `q / H`
    pub q_over_h: f64,
    /// Chord length projected perpendicular to the inflow
    pub length_projected: f64,
    /// Straight chord length between both nodes
    pub chord_length: f64,
    /// Component of the chord along the inflow direction
    pub chord_along_inflow: f64,
}

impl SagCurve {
    pub fn new(line: &SagLine, (c1, c2): (f64, f64), chord_length: f64, chord_along_inflow: f64) -> Self {
        Self {
            c1,
            c2,
            q_over_h: line.q_over_h(),
            length_projected: line.length_projected,
            chord_length,
            chord_along_inflow,
        }
    }

    /// Offset along the inflow at projected abscissa `u`
    pub fn offset(&self, u: f64) -> f64 {
        -self.q_over_h / 2.0 * u * u + self.c1 * u + self.c2
    }

    /// Offset at the relative position `t ∈ [0, 1]` along the line
    pub fn offset_at(&self, t: f64) -> f64 {
        self.offset(t * self.length_projected)
    }

    /// Slope `dy/du`
    pub fn slope(&self, u: f64) -> f64 {
        -self.q_over_h * u + self.c1
    }

    /// Length of the sagged line.
    ///
    /// A line (nearly) parallel to the inflow has no sag plane, its length
    /// is the chord.
    pub fn arc_length(&self) -> f64 {
        let lp = self.length_projected;
        if lp <= MIN_PROJECTED_LENGTH {
            return self.chord_length;
        }
        let incline = self.chord_along_inflow / lp;
        simpson(
            |u| (1.0 + (incline + self.slope(u)).powi(2)).sqrt(),
            0.0,
            lp,
            ARC_INTERVALS,
        )
    }

    /// Ratio between sagged and straight length
    pub fn elongation(&self) -> f64 {
        if self.chord_length < 1e-9 {
            return 1.0;
        }
        self.arc_length() / self.chord_length
    }
}
