//! Line set - the tree of lines below a canopy and its equilibrium solver

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::analysis::{RecalcOptions, RHO_AIR};
use crate::canopy::Canopy;
use crate::elements::{Line, LineForce, LineId, LineType, Node, NodeId};
use crate::error::{LineSetError, LineSetResult};
use crate::knots::KnotCorrections;
use crate::math::sag::MIN_PROJECTED_LENGTH;
use crate::math::{perpendicular, proj_force, SagCurve, SagLine, SagMatrix, Vec3};
use crate::results::{IterationResidual, RecalcReport};

/// Projected forces below this cannot carry a sag profile (N)
const MIN_PROJECTED_FORCE: f64 = 1e-6;

/// Incremental construction of a line set with name-based wiring
#[derive(Debug, Clone)]
pub struct LineSetBuilder {
    nodes: Vec<Node>,
    node_names: HashMap<String, NodeId>,
    lines: Vec<Line>,
    v_inf: Vec3,
    trim_corrections: BTreeMap<String, f64>,
    knot_corrections: Option<Arc<KnotCorrections>>,
}

impl Default for LineSetBuilder {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            node_names: HashMap::new(),
            lines: Vec::new(),
            v_inf: Vec3::zeros(),
            trim_corrections: BTreeMap::new(),
            knot_corrections: None,
        }
    }
}

impl LineSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; names must be unique
    pub fn add_node(&mut self, node: Node) -> LineSetResult<NodeId> {
        if self.node_names.contains_key(&node.name) {
            return Err(LineSetError::DuplicateName(node.name));
        }
        let id = NodeId(self.nodes.len());
        self.node_names.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Look up a node added earlier
    pub fn node_id(&self, name: &str) -> LineSetResult<NodeId> {
        self.node_names
            .get(name)
            .copied()
            .ok_or_else(|| LineSetError::NodeNotFound(name.to_string()))
    }

    /// Add a line between two named nodes
    pub fn add_line(
        &mut self,
        name: &str,
        lower: &str,
        upper: &str,
        line_type: Arc<LineType>,
        init_length: f64,
    ) -> LineSetResult<LineId> {
        let lower = self.node_id(lower)?;
        let upper = self.node_id(upper)?;
        self.push_line(Line::new(name, lower, upper, line_type, init_length))
    }

    /// Add a fully configured line
    pub fn push_line(&mut self, line: Line) -> LineSetResult<LineId> {
        for node in [line.lower_node, line.upper_node] {
            if node.0 >= self.nodes.len() {
                return Err(LineSetError::NodeNotFound(format!("#{}", node.0)));
            }
        }
        if line.init_length <= 0.0 || !line.init_length.is_finite() {
            return Err(LineSetError::InvalidInput(format!(
                "line '{}' has invalid length {}",
                line.name, line.init_length
            )));
        }
        let id = LineId(self.lines.len());
        self.lines.push(line);
        Ok(id)
    }

    pub fn with_inflow(mut self, v_inf: Vec3) -> Self {
        self.v_inf = v_inf;
        self
    }

    pub fn set_inflow(&mut self, v_inf: Vec3) {
        self.v_inf = v_inf;
    }

    pub fn add_trim_correction(&mut self, line_name: &str, correction: f64) {
        self.trim_corrections.insert(line_name.to_string(), correction);
    }

    pub fn with_knot_corrections(mut self, knots: Arc<KnotCorrections>) -> Self {
        self.knot_corrections = Some(knots);
        self
    }

    /// Validate the network and create the line set
    pub fn build(self) -> LineSetResult<LineSet> {
        let mut lineset = LineSet::new(self.nodes, self.lines, self.v_inf)?;
        lineset.trim_corrections = self.trim_corrections;
        if let Some(knots) = self.knot_corrections {
            lineset.knot_corrections = knots;
        }
        Ok(lineset)
    }
}

/// Set of lines forming a forest of trees rooted at lower attachment points.
///
/// Nodes and lines live in arenas and reference each other by index, so
/// `clone()` is a complete, independent copy of the network.
#[derive(Debug, Clone)]
pub struct LineSet {
    pub(crate) nodes: Vec<Node>,
    pub(crate) lines: Vec<Line>,
    pub(crate) v_inf: Vec3,
    /// Manual length corrections by line name (m)
    pub trim_corrections: BTreeMap<String, f64>,
    pub(crate) knot_corrections: Arc<KnotCorrections>,

    /// Lines starting at each node
    upper_lines: Vec<Vec<LineId>>,
    /// Lines ending at each node (at most one)
    lower_lines: Vec<Vec<LineId>>,
    /// Lines ordered from the anchors upwards
    order: Vec<LineId>,
}

impl LineSet {
    /// Create a line set from wired nodes and lines.
    ///
    /// Fails if the network is not a forest of trees rooted at lower nodes
    /// with canopy attachment points as leaves.
    pub fn new(nodes: Vec<Node>, lines: Vec<Line>, v_inf: Vec3) -> LineSetResult<Self> {
        let mut lineset = Self::assemble(nodes, lines, v_inf)?;
        lineset.validate()?;
        lineset.refresh_geometry();
        Ok(lineset)
    }

    /// Index the network without checking the tree invariants
    pub(crate) fn assemble(nodes: Vec<Node>, lines: Vec<Line>, v_inf: Vec3) -> LineSetResult<Self> {
        let mut upper_lines = vec![Vec::new(); nodes.len()];
        let mut lower_lines = vec![Vec::new(); nodes.len()];

        for (i, line) in lines.iter().enumerate() {
            for node in [line.lower_node, line.upper_node] {
                if node.0 >= nodes.len() {
                    return Err(LineSetError::NodeNotFound(format!("#{}", node.0)));
                }
            }
            upper_lines[line.lower_node.0].push(LineId(i));
            lower_lines[line.upper_node.0].push(LineId(i));
        }

        let mut lineset = Self {
            nodes,
            lines,
            v_inf,
            trim_corrections: BTreeMap::new(),
            knot_corrections: KnotCorrections::builtin(),
            upper_lines,
            lower_lines,
            order: Vec::new(),
        };
        lineset.order = lineset.traversal_order();
        Ok(lineset)
    }

    /// Breadth-first line order starting at the lower attachment points
    fn traversal_order(&self) -> Vec<LineId> {
        let mut order = Vec::with_capacity(self.lines.len());
        let mut visited = HashSet::new();
        let mut queue: std::collections::VecDeque<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_lower())
            .map(|(i, _)| NodeId(i))
            .collect();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            for &line in &self.upper_lines[node.0] {
                order.push(line);
                queue.push_back(self.lines[line.0].upper_node);
            }
        }
        order
    }

    fn validate(&self) -> LineSetResult<()> {
        for line in &self.lines {
            let lower = &self.nodes[line.lower_node.0];
            let upper = &self.nodes[line.upper_node.0];
            if line.lower_node == line.upper_node {
                return Err(LineSetError::CycleDetected(lower.name.clone()));
            }
            if lower.is_upper() {
                return Err(LineSetError::InvalidTopology(format!(
                    "line '{}' starts at canopy attachment point '{}'",
                    line.name, lower.name
                )));
            }
            if upper.is_lower() {
                return Err(LineSetError::InvalidTopology(format!(
                    "line '{}' ends at lower attachment point '{}'",
                    line.name, upper.name
                )));
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if self.lower_lines[i].len() > 1 {
                return Err(LineSetError::MultipleLowerLines(node.name.clone()));
            }
            if node.is_knot() && !self.lower_lines[i].is_empty() && self.upper_lines[i].is_empty() {
                return Err(LineSetError::InvalidTopology(format!(
                    "knot '{}' has no upper lines",
                    node.name
                )));
            }
        }

        if self.order.len() == self.lines.len() {
            return Ok(());
        }

        // some line is unreachable from the anchors: walk down to find out why
        let reached: HashSet<LineId> = self.order.iter().copied().collect();
        let missing = (0..self.lines.len())
            .map(LineId)
            .find(|id| !reached.contains(id))
            .ok_or_else(|| LineSetError::InvalidTopology("inconsistent line order".into()))?;

        let mut seen = HashSet::new();
        let mut node = self.lines[missing.0].lower_node;
        while let Some(&below) = self.lower_lines[node.0].first() {
            if !seen.insert(node) {
                return Err(LineSetError::CycleDetected(self.nodes[node.0].name.clone()));
            }
            node = self.lines[below.0].lower_node;
        }
        Err(LineSetError::Disconnected(self.lines[missing.0].name.clone()))
    }

    // ========================
    // Accessors
    // ========================

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn line(&self, id: LineId) -> &Line {
        &self.lines[id.0]
    }

    pub fn line_ids(&self) -> impl Iterator<Item = LineId> {
        (0..self.lines.len()).map(LineId)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn node_id(&self, name: &str) -> LineSetResult<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(NodeId)
            .ok_or_else(|| LineSetError::NodeNotFound(name.to_string()))
    }

    /// First line with the given name
    pub fn line_by_name(&self, name: &str) -> LineSetResult<LineId> {
        self.lines
            .iter()
            .position(|l| l.name == name)
            .map(LineId)
            .ok_or_else(|| LineSetError::LineNotFound(name.to_string()))
    }

    pub fn v_inf(&self) -> Vec3 {
        self.v_inf
    }

    pub fn set_v_inf(&mut self, v_inf: Vec3) {
        self.v_inf = v_inf;
    }

    pub fn knot_corrections(&self) -> &KnotCorrections {
        &self.knot_corrections
    }

    pub fn set_knot_corrections(&mut self, knots: Arc<KnotCorrections>) {
        self.knot_corrections = knots;
    }

    /// Move a node; geometry of the attached lines is refreshed
    pub fn set_node_position(&mut self, id: NodeId, position: Vec3) {
        self.nodes[id.0].position = position;
        self.refresh_node_lines(id);
    }

    /// Set the external force of a canopy attachment point
    pub fn set_node_force(&mut self, id: NodeId, force: Vec3) -> LineSetResult<()> {
        let node = &mut self.nodes[id.0];
        if !node.is_upper() {
            return Err(LineSetError::InvalidInput(format!(
                "node '{}' is not a canopy attachment point",
                node.name
            )));
        }
        node.force = force;
        Ok(())
    }

    pub fn set_init_length(&mut self, id: LineId, init_length: f64) {
        self.lines[id.0].init_length = init_length;
    }

    pub fn set_target_length(&mut self, id: LineId, target_length: Option<f64>) {
        self.lines[id.0].target_length = target_length;
    }

    pub fn set_line_name(&mut self, id: LineId, name: &str) {
        self.lines[id.0].name = name.to_string();
    }

    pub fn set_line_color(&mut self, id: LineId, color: Option<String>) {
        self.lines[id.0].color = color;
    }

    fn refresh_geometry(&mut self) {
        let nodes = &self.nodes;
        for line in &mut self.lines {
            let lower = nodes[line.lower_node.0].position;
            let upper = nodes[line.upper_node.0].position;
            line.update_geometry(&lower, &upper);
        }
    }

    fn refresh_node_lines(&mut self, id: NodeId) {
        let touching: Vec<LineId> = self.connected_lines(id);
        for line_id in touching {
            let line = &self.lines[line_id.0];
            let lower = self.nodes[line.lower_node.0].position;
            let upper = self.nodes[line.upper_node.0].position;
            self.lines[line_id.0].update_geometry(&lower, &upper);
        }
    }

    // ========================
    // Topology
    // ========================

    /// Lines starting at a lower attachment point
    pub fn lowest_lines(&self) -> Vec<LineId> {
        self.line_ids()
            .filter(|&id| self.nodes[self.lines[id.0].lower_node.0].is_lower())
            .collect()
    }

    /// Lines ending at a canopy attachment point
    pub fn uppermost_lines(&self) -> Vec<LineId> {
        self.line_ids()
            .filter(|&id| self.nodes[self.lines[id.0].upper_node.0].is_upper())
            .collect()
    }

    /// Canopy attachment points used by lines
    pub fn attachment_points(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.nodes[id.0].is_upper() && !self.lower_lines[id.0].is_empty())
            .collect()
    }

    /// Anchors used by lines
    pub fn lower_attachment_points(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.nodes[id.0].is_lower() && !self.upper_lines[id.0].is_empty())
            .collect()
    }

    /// Lines starting at `node`
    pub fn upper_connected_lines(&self, node: NodeId) -> &[LineId] {
        &self.upper_lines[node.0]
    }

    /// Lines ending at `node`
    pub fn lower_connected_lines(&self, node: NodeId) -> &[LineId] {
        &self.lower_lines[node.0]
    }

    pub fn connected_lines(&self, node: NodeId) -> Vec<LineId> {
        let mut lines = self.upper_lines[node.0].clone();
        lines.extend_from_slice(&self.lower_lines[node.0]);
        lines
    }

    /// All lines above `node`, recursively
    pub fn upper_lines(&self, node: NodeId) -> Vec<LineId> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            for &line in &self.upper_lines[current.0] {
                result.push(line);
                stack.push(self.lines[line.0].upper_node);
            }
        }
        result
    }

    /// Canopy attachment points at or above `node`
    pub fn upper_influence_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if self.nodes[current.0].is_upper() {
                result.push(current);
                continue;
            }
            // reversed so attachment points come out in line order
            for &line in self.upper_lines[current.0].iter().rev() {
                stack.push(self.lines[line.0].upper_node);
            }
        }
        result
    }

    /// Canopy attachment points pulling on a line
    pub fn line_influence_nodes(&self, line: LineId) -> Vec<NodeId> {
        self.upper_influence_nodes(self.lines[line.0].upper_node)
    }

    /// The lower attachment point named "main" (or "0")
    pub fn main_attachment_point(&self) -> LineSetResult<NodeId> {
        let lower = self.lower_attachment_points();
        lower
            .iter()
            .rev()
            .find(|id| self.nodes[id.0].name.eq_ignore_ascii_case("main"))
            .or_else(|| lower.iter().rev().find(|id| self.nodes[id.0].name == "0"))
            .copied()
            .ok_or(LineSetError::MissingMainAttachment)
    }

    /// Number of line levels above a node
    pub fn floor_count(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut level = vec![node];
        loop {
            let next: Vec<NodeId> = level
                .iter()
                .flat_map(|n| self.upper_lines[n.0].iter())
                .map(|l| self.lines[l.0].upper_node)
                .collect();
            if next.is_empty() {
                return depth;
            }
            depth += 1;
            level = next;
        }
    }

    /// Number of line levels above every lower attachment point
    pub fn floors(&self) -> BTreeMap<NodeId, usize> {
        self.lower_attachment_points()
            .into_iter()
            .map(|n| (n, self.floor_count(n)))
            .collect()
    }

    /// Lines `target_floor` levels above `node`.
    ///
    /// With `en_style` (EN 926-1) branches ending below that floor contribute
    /// their uppermost line instead.
    pub fn lines_by_floor(&self, target_floor: usize, node: NodeId, en_style: bool) -> Vec<LineId> {
        fn level(ls: &LineSet, node: NodeId, current: usize, target: usize, en_style: bool) -> Vec<LineId> {
            let lines = ls.upper_connected_lines(node);
            if lines.is_empty() && en_style {
                return ls.lower_connected_lines(node).to_vec();
            }
            if current == target {
                return lines.to_vec();
            }
            lines
                .iter()
                .flat_map(|l| level(ls, ls.lines[l.0].upper_node, current + 1, target, en_style))
                .collect()
        }
        level(self, node, 0, target_floor, en_style)
    }

    /// Summed breaking strength of every floor above `node`
    pub fn floor_strength(&self, node: NodeId) -> Vec<f64> {
        (0..self.floor_count(node))
            .map(|floor| {
                self.lines_by_floor(floor, node, true)
                    .iter()
                    .map(|l| {
                        let line_type = &self.lines[l.0].line_type;
                        line_type.min_break_load.unwrap_or_else(|| {
                            log::warn!("no min_break_load set for {}", line_type.name);
                            0.0
                        })
                    })
                    .sum()
            })
            .collect()
    }

    // ========================
    // Forces
    // ========================

    fn force_or_zero(&self, line: LineId) -> f64 {
        let line = &self.lines[line.0];
        line.force.value().unwrap_or_else(|| {
            log::warn!("force not set for line {}", line.name);
            0.0
        })
    }

    /// Vector sum of the forces of all lines starting at `node`
    pub fn upper_connected_force(&self, node: NodeId) -> Vec3 {
        self.upper_lines[node.0]
            .iter()
            .map(|&l| self.lines[l.0].diff_vector * self.force_or_zero(l))
            .sum()
    }

    /// Net force on a node left over by the straight-line force pass
    pub fn residual_force(&self, node: NodeId) -> Vec3 {
        let below: Vec3 = self.lower_lines[node.0]
            .iter()
            .map(|&l| self.lines[l.0].diff_vector * self.force_or_zero(l))
            .sum();
        self.upper_connected_force(node) - below
    }

    /// Line forces, from the canopy down to the anchors.
    ///
    /// A line ending at the canopy takes the external load projected onto
    /// its direction; any other line takes the sum of the lines above its
    /// upper node projected onto its direction.
    pub fn calc_forces(&mut self, fallback_force: f64) {
        for i in (0..self.order.len()).rev() {
            let id = self.order[i];
            let line = &self.lines[id.0];
            let upper = &self.nodes[line.upper_node.0];
            let direction = line.diff_vector;

            let force = match upper.external_force() {
                Some(load) => proj_force(&load, &direction).unwrap_or_else(|| {
                    log::error!(
                        "invalid line: {} ({}), load at {} is perpendicular to the line, using {} N",
                        line.name,
                        line.line_type.name,
                        upper.name,
                        fallback_force
                    );
                    fallback_force
                }),
                None => self.upper_connected_force(line.upper_node).dot(&direction),
            };
            self.lines[id.0].force = LineForce::Solved(force);
        }
    }

    /// Forget all computed forces
    pub fn reset_forces(&mut self) {
        for line in &mut self.lines {
            line.force = LineForce::Unsolved;
        }
    }

    // ========================
    // Geometry
    // ========================

    /// Direction of a line as seen from its lower point `pos`.
    ///
    /// With forces from a previous pass the current direction is corrected
    /// by the residual force at the upper node, weighted with the lateral
    /// stiffness of all lines meeting there. Without forces the pull of all
    /// canopy attachment points above the line is summed up.
    pub fn get_tangential_comp(&self, id: LineId, pos: &Vec3, damping: f64) -> Vec3 {
        let line = &self.lines[id.0];

        if line.force.is_solved() && line.chord_length > MIN_PROJECTED_LENGTH {
            let residual = self.residual_force(line.upper_node);
            let mut stiffness = line.get_correction_influence(&residual);
            for connected in self.connected_lines(line.upper_node) {
                stiffness += self.lines[connected.0].get_correction_influence(&residual);
            }
            if stiffness > 1e-12 {
                let shifted = line.diff_vector * line.chord_length + residual * (damping / stiffness);
                if let Some(direction) = shifted.try_normalize(1e-12) {
                    return direction;
                }
            }
            return line.diff_vector;
        }

        let influence_nodes = self.upper_influence_nodes(line.upper_node);
        let tangent: Vec3 = influence_nodes
            .iter()
            .filter_map(|n| self.nodes[n.0].calc_force_influence(pos))
            .sum();
        if let Some(direction) = tangent.try_normalize(1e-12) {
            return direction;
        }

        // unloaded canopy: point towards the attachment points
        log::warn!("no load above line {}, using attachment point centroid", line.name);
        let centroid: Vec3 = influence_nodes.iter().map(|n| self.nodes[n.0].position).sum::<Vec3>()
            / influence_nodes.len().max(1) as f64;
        (centroid - pos)
            .try_normalize(1e-12)
            .unwrap_or_else(|| Vec3::new(0.0, 0.0, 1.0))
    }

    /// Position every knot at `init_length` from its lower node, anchors first.
    ///
    /// Canopy attachment points and anchors are never moved.
    pub fn calc_geo(&mut self, damping: f64) {
        for i in 0..self.order.len() {
            let id = self.order[i];
            let (lower, upper, length) = {
                let line = &self.lines[id.0];
                (line.lower_node, line.upper_node, line.init_length)
            };
            if !self.nodes[upper.0].is_knot() {
                continue;
            }
            log::trace!("geometry of line {}", self.lines[id.0].name);
            let lower_pos = self.nodes[lower.0].position;
            let direction = self.get_tangential_comp(id, &lower_pos, damping);
            self.set_node_position(upper, lower_pos + direction * length);
        }
    }

    // ========================
    // Sag
    // ========================

    fn sag_line(&self, id: LineId, inflow: &Vec3, fallback_force: f64) -> SagLine {
        let line = &self.lines[id.0];
        let chord = line.diff_vector * line.chord_length;

        let mut length_projected = perpendicular(&chord, inflow).norm();
        if length_projected < MIN_PROJECTED_LENGTH {
            log::error!("line {} is parallel to the inflow, sag undefined", line.name);
            length_projected = MIN_PROJECTED_LENGTH;
        }

        let v_perp = perpendicular(&self.v_inf, &line.diff_vector);
        let line_type = &line.line_type;
        let ortho_pressure =
            0.5 * RHO_AIR * line_type.cw * line_type.diameter() * v_perp.norm_squared();

        let force = self.force_or_zero(id);
        let mut force_projected = if line.chord_length > MIN_PROJECTED_LENGTH {
            force * length_projected / line.chord_length
        } else {
            0.0
        };
        if force_projected.abs() < MIN_PROJECTED_FORCE {
            log::error!(
                "line {} carries no projected force ({:.3e} N), using {} N for sag",
                line.name,
                force_projected,
                fallback_force
            );
            force_projected = fallback_force;
        }

        SagLine {
            index: id.0,
            force_projected,
            length_projected,
            ortho_pressure,
        }
    }

    /// Assemble and solve the global sag system from the current forces.
    ///
    /// Every line contributes one lower and one upper condition, chosen by
    /// what its end nodes are attached to.
    pub fn calc_sag(&mut self, fallback_force: f64) -> LineSetResult<()> {
        let inflow = self.v_inf.try_normalize(1e-12).unwrap_or_else(Vec3::zeros);
        let sag_lines: Vec<SagLine> = self
            .line_ids()
            .map(|id| self.sag_line(id, &inflow, fallback_force))
            .collect();

        let mut mat = SagMatrix::new(self.lines.iter().map(|l| l.name.clone()).collect());
        for &id in &self.order {
            let line = &self.lines[id.0];
            let sag_line = &sag_lines[id.0];

            match self.lower_lines[line.lower_node.0].first() {
                Some(lower) if !self.nodes[line.lower_node.0].is_lower() => {
                    mat.insert_type_1_lower(sag_line, &sag_lines[lower.0]);
                }
                _ => mat.insert_type_0_lower(sag_line),
            }

            if self.nodes[line.upper_node.0].is_knot() {
                let upper: Vec<SagLine> = self.upper_lines[line.upper_node.0]
                    .iter()
                    .map(|u| sag_lines[u.0])
                    .collect();
                mat.insert_type_1_upper(sag_line, &upper);
            } else {
                mat.insert_type_2_upper(sag_line);
            }
        }

        mat.solve()?;

        for (i, line) in self.lines.iter_mut().enumerate() {
            let along = line.diff_vector.dot(&inflow) * line.chord_length;
            line.sag = mat
                .sag_parameters(i)
                .map(|params| SagCurve::new(&sag_lines[i], params, line.chord_length, along));
        }
        Ok(())
    }

    /// Drop all sag profiles (straight lines)
    pub fn clear_sag(&mut self) {
        for line in &mut self.lines {
            line.sag = None;
        }
    }

    // ========================
    // Recalculation
    // ========================

    /// Take positions, loads and inflow of the attachment points from the canopy
    pub fn update_from_canopy(&mut self, canopy: &dyn Canopy) {
        for id in self.attachment_points() {
            match canopy.attachment(&self.nodes[id.0]) {
                Some(attachment) => {
                    self.nodes[id.0].position = attachment.position;
                    self.nodes[id.0].force = attachment.force;
                }
                None => log::warn!("canopy has no attachment point {}", self.nodes[id.0].name),
            }
        }
        if let Some(v_inf) = canopy.inflow() {
            self.v_inf = v_inf;
        }
        self.refresh_geometry();
    }

    /// Recalculate geometry, forces and (optionally) sag.
    ///
    /// Runs a fixed number of outer iterations; the returned report records
    /// how much knots and forces still moved in each of them.
    pub fn recalc(&mut self, options: &RecalcOptions, canopy: Option<&dyn Canopy>) -> RecalcReport {
        if options.iterations > 1 {
            self.reset_forces();
        }

        if let Some(canopy) = canopy {
            log::info!("get positions");
            self.update_from_canopy(canopy);
        }

        log::info!("calc geo ({} iterations)", options.iterations);
        let mut report = RecalcReport::default();
        for iteration in 0..options.iterations {
            let positions: Vec<Vec3> = self.nodes.iter().map(|n| n.position).collect();
            let forces: Vec<Option<f64>> = self.lines.iter().map(|l| l.force.value()).collect();

            self.calc_geo(options.correction_damping);
            self.calc_forces(options.fallback_force);
            if options.calculate_sag {
                if let Err(e) = self.calc_sag(options.fallback_force) {
                    log::error!("sag calculation failed: {}", e);
                    report.sag_errors.push(e.to_string());
                    self.clear_sag();
                }
            } else {
                self.clear_sag();
            }

            let max_displacement = self
                .nodes
                .iter()
                .zip(&positions)
                .map(|(n, p)| (n.position - p).norm())
                .fold(0.0, f64::max);
            let max_force_change = self
                .lines
                .iter()
                .zip(&forces)
                .filter_map(|(l, old)| Some((l.force.value()? - (*old)?).abs()))
                .fold(0.0, f64::max);

            log::debug!(
                "iteration {}: max knot displacement {:.3e} m, max force change {:.3e} N",
                iteration,
                max_displacement,
                max_force_change
            );
            report.iterations.push(IterationResidual {
                iteration,
                max_displacement,
                max_force_change,
            });
        }
        report
    }

    /// Fit `init_length` so that the reported length meets `target_length`
    pub fn iterate_target_length(&mut self, steps: usize, options: &RecalcOptions) -> RecalcReport {
        let mut report = self.recalc(options, None);
        for _ in 0..steps {
            for id in self.line_ids().collect::<Vec<_>>() {
                let Some(target) = self.lines[id.0].target_length else {
                    continue;
                };
                let length = self.get_line_length(id, options.calculate_sag);
                self.lines[id.0].init_length -= length.get_length() - target;
            }
            report = self.recalc(options, None);
        }
        report
    }

    /// Scale the whole line set; loads scale with the area (`factor²`)
    pub fn scale(&mut self, factor: f64, options: &RecalcOptions) -> RecalcReport {
        for node in &mut self.nodes {
            node.position *= factor;
            if node.is_upper() {
                node.force *= factor * factor;
            }
        }
        for line in &mut self.lines {
            line.init_length *= factor;
            if let Some(target) = line.target_length.as_mut() {
                *target *= factor;
            }
            line.force = LineForce::Unsolved;
        }
        self.refresh_geometry();
        self.recalc(options, None)
    }

    // ========================
    // Geometry output
    // ========================

    /// Points along a line, following its sag profile
    pub fn line_points(&self, id: LineId, numpoints: usize) -> Vec<Vec3> {
        let line = &self.lines[id.0];
        let lower = self.nodes[line.lower_node.0].position;
        let upper = self.nodes[line.upper_node.0].position;
        let inflow = self.v_inf.try_normalize(1e-12).unwrap_or_else(Vec3::zeros);
        let n = numpoints.max(2);

        (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                let straight = lower + (upper - lower) * t;
                match &line.sag {
                    Some(sag) => straight + inflow * sag.offset_at(t),
                    None => straight,
                }
            })
            .collect()
    }

    /// Drag of a single line (N)
    pub fn line_drag(&self, id: LineId) -> f64 {
        let line = &self.lines[id.0];
        let v_perp = perpendicular(&self.v_inf, &line.diff_vector);
        0.5 * RHO_AIR * line.line_type.cw * line.line_type.diameter() * line.chord_length * v_perp.norm_squared()
    }

    /// Centre of pressure and total drag of all lines
    pub fn drag(&self) -> Option<(Vec3, f64)> {
        let mut total = 0.0;
        let mut center = Vec3::zeros();
        for id in self.line_ids() {
            let drag = self.line_drag(id);
            let points = self.line_points(id, 3);
            total += drag;
            center += points[1] * drag;
        }
        (total > 0.0).then(|| (center / total, total))
    }

    /// Line drag normalized by the dynamic pressure (`v² / 2`)
    pub fn normalized_drag(&self) -> Option<f64> {
        let v2 = self.v_inf.norm_squared();
        if v2 < 1e-12 {
            return None;
        }
        self.drag().map(|(_, total)| total / v2 * 2.0)
    }

    /// Total line weight (g)
    pub fn weight(&self) -> f64 {
        self.lines.iter().map(Line::get_weight).sum()
    }

    /// Sum of all stretched line lengths (m)
    pub fn total_length(&self) -> f64 {
        self.lines
            .iter()
            .map(|l| l.get_stretched_length(false).unwrap_or(l.init_length))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::LineType;
    use approx::assert_relative_eq;

    fn line_type() -> Arc<LineType> {
        Arc::new(LineType::new(
            "liros.ltc80",
            0.7,
            vec![(100.0, 0.65), (300.0, 1.65)],
            800.0,
            0.57,
            false,
        ))
    }

    /// main -> knot -> {A1, A2}
    fn y_lineset(v_inf: Vec3) -> LineSet {
        let lt = line_type();
        let mut b = LineSetBuilder::new().with_inflow(v_inf);
        b.add_node(Node::lower("main", Vec3::zeros())).unwrap();
        b.add_node(Node::knot("k1", Vec3::new(0.0, 0.0, 1.0))).unwrap();
        b.add_node(Node::upper("A1", Vec3::new(0.0, 1.5, 6.0), Vec3::new(0.0, 20.0, 100.0)))
            .unwrap();
        b.add_node(Node::upper("A2", Vec3::new(0.0, -1.5, 6.0), Vec3::new(0.0, -20.0, 100.0)))
            .unwrap();
        b.add_line("main", "main", "k1", lt.clone(), 3.0).unwrap();
        b.add_line("A1", "k1", "A1", lt.clone(), 3.2).unwrap();
        b.add_line("A2", "k1", "A2", lt, 3.2).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_topology() {
        let ls = y_lineset(Vec3::zeros());
        assert_eq!(ls.lowest_lines(), vec![LineId(0)]);
        assert_eq!(ls.uppermost_lines(), vec![LineId(1), LineId(2)]);
        let k1 = ls.node_id("k1").unwrap();
        assert_eq!(ls.upper_connected_lines(k1), &[LineId(1), LineId(2)]);
        assert_eq!(ls.lower_connected_lines(k1), &[LineId(0)]);
        let main = ls.main_attachment_point().unwrap();
        assert_eq!(ls.upper_influence_nodes(main).len(), 2);
        assert_eq!(ls.upper_lines(main).len(), 3);
        assert_eq!(ls.floors()[&main], 2);
        assert_eq!(ls.lines_by_floor(1, main, true), vec![LineId(1), LineId(2)]);
        assert_eq!(ls.floor_strength(main), vec![800.0, 1600.0]);
    }

    #[test]
    fn test_multiple_lower_lines_rejected() {
        let lt = line_type();
        let mut b = LineSetBuilder::new();
        b.add_node(Node::lower("main", Vec3::zeros())).unwrap();
        b.add_node(Node::lower("brake", Vec3::new(0.1, 0.0, 0.0))).unwrap();
        b.add_node(Node::upper("A1", Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        b.add_line("a", "main", "A1", lt.clone(), 5.0).unwrap();
        b.add_line("b", "brake", "A1", lt, 5.0).unwrap();
        assert!(matches!(b.build(), Err(LineSetError::MultipleLowerLines(n)) if n == "A1"));
    }

    #[test]
    fn test_cycle_rejected() {
        let lt = line_type();
        let mut b = LineSetBuilder::new();
        b.add_node(Node::knot("k1", Vec3::zeros())).unwrap();
        b.add_node(Node::knot("k2", Vec3::new(0.0, 0.0, 1.0))).unwrap();
        b.add_node(Node::upper("A1", Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        b.add_line("a", "k1", "k2", lt.clone(), 1.0).unwrap();
        b.add_line("b", "k2", "k1", lt.clone(), 1.0).unwrap();
        b.add_line("c", "k2", "A1", lt, 4.0).unwrap();
        assert!(matches!(b.build(), Err(LineSetError::CycleDetected(_))));
    }

    #[test]
    fn test_disconnected_rejected() {
        let lt = line_type();
        let mut b = LineSetBuilder::new();
        b.add_node(Node::knot("k1", Vec3::zeros())).unwrap();
        b.add_node(Node::upper("A1", Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        b.add_line("a", "k1", "A1", lt, 5.0).unwrap();
        assert!(matches!(b.build(), Err(LineSetError::Disconnected(n)) if n == "a"));
    }

    #[test]
    fn test_canopy_cannot_carry_lines_above() {
        let lt = line_type();
        let mut b = LineSetBuilder::new();
        b.add_node(Node::lower("main", Vec3::zeros())).unwrap();
        b.add_node(Node::upper("A1", Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        b.add_node(Node::upper("A2", Vec3::new(0.0, 0.0, 6.0), Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        b.add_line("a", "main", "A1", lt.clone(), 5.0).unwrap();
        b.add_line("b", "A1", "A2", lt, 1.0).unwrap();
        assert!(matches!(b.build(), Err(LineSetError::InvalidTopology(_))));
    }

    #[test]
    fn test_geometry_places_knot_on_symmetry_axis() {
        let mut ls = y_lineset(Vec3::zeros());
        ls.recalc(&RecalcOptions::default().without_sag(), None);
        let k1 = ls.node(ls.node_id("k1").unwrap()).position;
        assert_relative_eq!(k1.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(k1.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(k1.z, 3.0, epsilon = 1e-9);
        // anchors and attachment points stay put
        assert_eq!(ls.node(ls.node_id("main").unwrap()).position, Vec3::zeros());
        assert_eq!(ls.node(ls.node_id("A1").unwrap()).position, Vec3::new(0.0, 1.5, 6.0));
    }

    #[test]
    fn test_forces_balance_at_knot() {
        let mut ls = y_lineset(Vec3::zeros());
        ls.recalc(&RecalcOptions::default().without_sag(), None);
        let k1 = ls.node_id("k1").unwrap();
        let main = ls.line(LineId(0));
        let above = ls.upper_connected_force(k1);
        assert_relative_eq!(
            main.force().value().unwrap(),
            above.dot(&main.diff_vector()),
            epsilon = 1e-9
        );
        assert!(ls.lines().iter().all(|l| l.sag().is_none()));
    }

    #[test]
    fn test_perpendicular_load_uses_fallback() {
        let lt = line_type();
        let mut b = LineSetBuilder::new();
        b.add_node(Node::lower("main", Vec3::zeros())).unwrap();
        b.add_node(Node::upper("A1", Vec3::new(0.0, 0.0, 5.0), Vec3::new(50.0, 0.0, 0.0)))
            .unwrap();
        b.add_line("a", "main", "A1", lt, 5.0).unwrap();
        let mut ls = b.build().unwrap();
        let opts = RecalcOptions::default().without_sag().with_iterations(1);
        ls.recalc(&opts, None);
        assert_eq!(ls.line(LineId(0)).force(), LineForce::Solved(opts.fallback_force));
    }

    #[test]
    fn test_sag_downstream_and_continuous() {
        let mut ls = y_lineset(Vec3::new(-10.0, 0.0, -1.0));
        let report = ls.recalc(&RecalcOptions::default(), None);
        assert!(report.sag_errors.is_empty());

        let main = ls.line(LineId(0)).sag().copied().unwrap();
        let a1 = ls.line(LineId(1)).sag().copied().unwrap();
        assert_relative_eq!(main.offset(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(main.offset(main.length_projected), a1.offset(0.0), epsilon = 1e-12);
        assert_relative_eq!(a1.offset(a1.length_projected), 0.0, epsilon = 1e-12);
        // drag pushes the knot downstream
        assert!(a1.offset(0.0) > 0.0);

        let points = ls.line_points(LineId(1), 5);
        assert_eq!(points.len(), 5);
        assert_relative_eq!(points[4], ls.node(ls.node_id("A1").unwrap()).position, epsilon = 1e-9);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut ls = y_lineset(Vec3::zeros());
        let copy = ls.clone();
        ls.set_init_length(LineId(0), 2.0);
        ls.recalc(&RecalcOptions::default(), None);
        assert_eq!(copy.line(LineId(0)).init_length, 3.0);
        assert_eq!(copy.line(LineId(0)).force(), LineForce::Unsolved);
    }

    #[test]
    fn test_scale() {
        let mut ls = y_lineset(Vec3::zeros());
        ls.scale(2.0, &RecalcOptions::default().without_sag());
        assert_eq!(ls.line(LineId(0)).init_length, 6.0);
        assert_eq!(ls.node(ls.node_id("A1").unwrap()).force, Vec3::new(0.0, 80.0, 400.0));
    }

    #[test]
    fn test_drag_requires_inflow() {
        let ls = y_lineset(Vec3::zeros());
        assert!(ls.drag().is_none());
        let mut ls = y_lineset(Vec3::new(-10.0, 0.0, 0.0));
        ls.recalc(&RecalcOptions::default(), None);
        let (center, total) = ls.drag().unwrap();
        assert!(total > 0.0);
        assert!(center.z > 0.0);
        assert!(ls.normalized_drag().unwrap() > 0.0);
    }
}
