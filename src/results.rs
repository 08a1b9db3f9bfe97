//! Result types for line-set analysis and reporting

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Length of a line broken into its components (all in m)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LineLength {
    /// Stretched length (with or without sag)
    pub length: f64,
    /// Sewn loops at both ends (line type constant)
    pub seam_correction: f64,
    /// Length consumed by the canopy loop / brake offset
    pub loop_correction: f64,
    /// Length consumed in the knot at the lower end
    pub knot_correction: f64,
    /// User trim
    pub manual_correction: f64,
}

impl LineLength {
    /// Length as measured on the finished line: stretch, loop and trim
    pub fn get_checklength(&self) -> f64 {
        self.length + self.loop_correction + self.manual_correction
    }

    /// Cutting length including seam and knot allowances
    pub fn get_length(&self) -> f64 {
        self.get_checklength() + self.seam_correction + self.knot_correction
    }
}

/// Outer-iteration residuals of one `recalc` iteration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IterationResidual {
    pub iteration: usize,
    /// Largest knot movement in this iteration (m)
    pub max_displacement: f64,
    /// Largest change of a line force (N)
    pub max_force_change: f64,
}

/// Diagnostics of a `recalc` run.
///
/// Purely informational: the iteration count is fixed and nothing here
/// changes the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecalcReport {
    pub iterations: Vec<IterationResidual>,
    /// Sag solves that failed and fell back to straight lines
    pub sag_errors: Vec<String>,
}

impl RecalcReport {
    /// Residuals of the last iteration
    pub fn last(&self) -> Option<&IterationResidual> {
        self.iterations.last()
    }

    /// Whether the last iteration moved knots and forces by less than the tolerances
    pub fn converged(&self, displacement_tol: f64, force_tol: f64) -> bool {
        self.last().is_some_and(|r| {
            r.max_displacement <= displacement_tol && r.max_force_change <= force_tol
        })
    }
}

/// One row of the length table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthRow {
    pub name: String,
    pub line_type: String,
    pub color: Option<String>,
    pub init_length: f64,
    pub length_no_sag: LineLength,
    pub length_with_sag: LineLength,
}

/// One row of the force table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceRow {
    pub name: String,
    pub line_type: String,
    /// Line force (N); `None` if not computed
    pub force: Option<f64>,
    /// Force in percent of the breaking strength
    pub utilization: Option<f64>,
}

/// One row of the checklength table (anchor to canopy)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklengthRow {
    /// Canopy attachment point
    pub node: String,
    /// Line names from the attachment point down to the anchor
    pub lines: Vec<String>,
    pub checklength: f64,
}

/// Material needed for one line type
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    /// Summed cutting length (m)
    pub length: f64,
    /// Weight (g)
    pub weight: f64,
}

/// Material consumption by line type name
pub type Consumption = BTreeMap<String, ConsumptionEntry>;

/// Lines above a node as a nested tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineTree {
    pub line: String,
    pub upper_node: String,
    pub children: Vec<LineTree>,
}

impl LineTree {
    /// Number of lines in this subtree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(LineTree::count).sum::<usize>()
    }

    /// Longest path in lines
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(LineTree::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_line_length_components() {
        let l = LineLength {
            length: 2.0,
            seam_correction: 0.04,
            loop_correction: 0.1,
            knot_correction: 0.015,
            manual_correction: -0.01,
        };
        assert_relative_eq!(l.get_checklength(), 2.09, epsilon = 1e-12);
        assert_relative_eq!(l.get_length(), 2.145, epsilon = 1e-12);
    }

    #[test]
    fn test_report_convergence() {
        let mut report = RecalcReport::default();
        assert!(!report.converged(1.0, 1.0));
        report.iterations.push(IterationResidual {
            iteration: 0,
            max_displacement: 1e-4,
            max_force_change: 0.5,
        });
        assert!(report.converged(1e-3, 1.0));
        assert!(!report.converged(1e-3, 0.1));
    }

    #[test]
    fn test_tree_shape() {
        let leaf = |n: &str| LineTree {
            line: n.into(),
            upper_node: n.into(),
            children: vec![],
        };
        let tree = LineTree {
            line: "main".into(),
            upper_node: "k1".into(),
            children: vec![leaf("A1"), leaf("A2")],
        };
        assert_eq!(tree.count(), 3);
        assert_eq!(tree.depth(), 2);
    }
}
