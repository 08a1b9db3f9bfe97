//! Length, force and material reports of a solved line set

use std::collections::{BTreeMap, BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::elements::{LineId, NodeId};
use crate::error::{LineSetError, LineSetResult};
use crate::model::LineSet;
use crate::results::{
    ChecklengthRow, Consumption, ConsumptionEntry, ForceRow, LengthRow, LineLength, LineTree,
};

/// `[floor_]layer index`, e.g. `2_AB3`
static LINE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<floor>[0-9]+_)?(?P<layer>[A-Za-z]+)(?P<index>[0-9]+)").expect("valid regex")
});

/// Letter group of an attachment point name, e.g. `A` for `A12`
static NODE_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^A-Za-z]*([A-Za-z]*)").expect("valid regex"));

/// Weight of the spanwise position against the lateral one for tree order
const TREE_X_FACTOR: f64 = 10.0;

/// Weight used when numbering lines within a group
const RENAME_X_FACTOR: f64 = 0.1;

fn name_key(name: &str) -> Option<u64> {
    let caps = LINE_NAME.captures(name)?;
    let floor = match caps.name("floor") {
        Some(m) => m.as_str().trim_end_matches('_').parse::<u64>().ok()?,
        None => 0,
    };
    let layer: u64 = caps["layer"]
        .to_lowercase()
        .chars()
        .map(|c| c as u64)
        .sum();
    let index = caps["index"].parse::<u64>().ok()?;
    // oversized numbers fall back to the geometric order
    floor
        .checked_mul(100_000)?
        .checked_add(layer.checked_mul(50)?)?
        .checked_add(index)
}

impl LineSet {
    /// Length breakdown of a line.
    ///
    /// A missing force is reported and the unstretched length used instead.
    pub fn get_line_length(&self, id: LineId, with_sag: bool) -> LineLength {
        let line = self.line(id);
        let length = line.get_stretched_length(with_sag).unwrap_or_else(|e| {
            log::warn!("{}, using unstretched length", e);
            line.init_length
        });

        // canopy loop / brake offset
        let loop_correction = if self.upper_connected_lines(line.upper_node).is_empty() {
            self.node(line.upper_node).offset
        } else {
            0.0
        };

        LineLength {
            length,
            seam_correction: line.line_type.seam_correction,
            loop_correction,
            knot_correction: self.knot_correction(id),
            manual_correction: self.trim_corrections.get(&line.name).copied().unwrap_or(0.0),
        }
    }

    fn knot_correction(&self, id: LineId) -> f64 {
        let line = self.line(id);
        let Some(&lower_line) = self.lower_connected_lines(line.lower_node).first() else {
            return 0.0;
        };
        let siblings = self.sort_lines(self.upper_connected_lines(line.lower_node), TREE_X_FACTOR, true);
        let Some(position) = siblings.iter().position(|&l| l == id) else {
            return 0.0;
        };
        let corrections = self.knot_corrections.get(
            &self.line(lower_line).line_type.name,
            &line.line_type.name,
            siblings.len(),
        );
        corrections.get(position).copied().unwrap_or(0.0)
    }

    /// Summed checklength from `node` down to its anchor
    pub fn get_checklength(&self, node: NodeId, with_sag: bool) -> LineSetResult<f64> {
        let mut length = 0.0;
        let mut current = node;
        let mut visited = HashSet::new();
        loop {
            let line = match self.lower_connected_lines(current) {
                [] => return Ok(length),
                [line] => *line,
                _ => {
                    return Err(LineSetError::MultipleLowerLines(
                        self.node(current).name.clone(),
                    ))
                }
            };
            if !visited.insert(current) {
                return Err(LineSetError::CycleDetected(self.node(current).name.clone()));
            }
            length += self.get_line_length(line, with_sag).get_checklength();
            current = self.line(line).lower_node;
        }
    }

    /// Sort lines by name (`[floor_]layer index`) or, if not all names
    /// follow that scheme, by the mean position of their attachment points.
    pub fn sort_lines(&self, lines: &[LineId], x_factor: f64, by_name: bool) -> Vec<LineId> {
        let mut sorted = lines.to_vec();

        if by_name {
            let keys: Option<Vec<u64>> = lines.iter().map(|&l| name_key(&self.line(l).name)).collect();
            if let Some(keys) = keys {
                let mut keyed: Vec<(u64, LineId)> = keys.into_iter().zip(sorted).collect();
                keyed.sort_by_key(|(key, _)| *key);
                return keyed.into_iter().map(|(_, l)| l).collect();
            }
        }

        let key = |line: LineId| {
            let nodes = self.line_influence_nodes(line);
            let (rib, y) = nodes.iter().fold((0.0, 0.0), |(rib, y), n| {
                let node = self.node(*n);
                (rib + node.rib_pos.unwrap_or(1000.0 * node.position.x), y + node.position.y)
            });
            (rib * x_factor + y) / nodes.len().max(1) as f64
        };
        sorted.sort_by(|&a, &b| key(a).total_cmp(&key(b)));
        sorted
    }

    /// Name every line `{floor}_{group}{number}`.
    ///
    /// Floors count from the canopy (1 = lines ending at the canopy), groups
    /// are the letter prefixes of the attachment points above a line.
    pub fn rename_lines(&mut self) {
        let floors = self.floors().values().copied().max().unwrap_or(0);
        let mut lines: Vec<LineId> = self
            .attachment_points()
            .into_iter()
            .flat_map(|n| self.lower_connected_lines(n).to_vec())
            .collect();

        for floor in 0..floors {
            let mut grouped: BTreeMap<String, Vec<LineId>> = BTreeMap::new();
            for &line in &lines {
                let groups: BTreeSet<String> = self
                    .line_influence_nodes(line)
                    .iter()
                    .filter_map(|n| NODE_GROUP.captures(&self.node(*n).name))
                    .map(|caps| caps[1].to_string())
                    .collect();
                grouped.entry(groups.into_iter().collect()).or_default().push(line);
            }

            for (group, members) in grouped {
                for (i, line) in self.sort_lines(&members, RENAME_X_FACTOR, false).into_iter().enumerate() {
                    self.set_line_name(line, &format!("{}_{}{}", floor + 1, group, i + 1));
                }
            }

            let below: BTreeSet<LineId> = lines
                .iter()
                .flat_map(|&l| self.lower_connected_lines(self.line(l).lower_node).to_vec())
                .collect();
            lines = below.into_iter().collect();
        }
    }

    /// Lines above `start` (or above all anchors) as sorted nested trees
    pub fn line_tree(&self, start: Option<NodeId>) -> Vec<LineTree> {
        let lines: Vec<LineId> = match start {
            Some(node) => self.upper_connected_lines(node).to_vec(),
            None => self
                .lower_attachment_points()
                .into_iter()
                .flat_map(|n| self.upper_connected_lines(n).to_vec())
                .collect(),
        };
        self.sort_lines(&lines, TREE_X_FACTOR, false)
            .into_iter()
            .map(|id| {
                let line = self.line(id);
                LineTree {
                    line: line.name.clone(),
                    upper_node: self.node(line.upper_node).name.clone(),
                    children: self.line_tree(Some(line.upper_node)),
                }
            })
            .collect()
    }

    /// Lines in tree order (anchor first, depth first)
    fn tree_order(&self) -> Vec<LineId> {
        fn visit(ls: &LineSet, lines: &[LineId], out: &mut Vec<LineId>) {
            for id in ls.sort_lines(lines, TREE_X_FACTOR, false) {
                out.push(id);
                visit(ls, ls.upper_connected_lines(ls.line(id).upper_node), out);
            }
        }

        let roots: Vec<LineId> = self
            .lower_attachment_points()
            .into_iter()
            .flat_map(|n| self.upper_connected_lines(n).to_vec())
            .collect();
        let mut order = Vec::with_capacity(self.lines().len());
        visit(self, &roots, &mut order);
        order
    }

    fn length_row(&self, id: LineId) -> LengthRow {
        let line = self.line(id);
        LengthRow {
            name: line.name.clone(),
            line_type: line.line_type.name.clone(),
            color: line.color.clone(),
            init_length: line.init_length,
            length_no_sag: self.get_line_length(id, false),
            length_with_sag: self.get_line_length(id, true),
        }
    }

    /// Length breakdown of every line in tree order
    pub fn length_table(&self) -> Vec<LengthRow> {
        self.tree_order().into_iter().map(|id| self.length_row(id)).collect()
    }

    /// Length breakdown of every line sorted by name
    pub fn sorted_length_table(&self) -> Vec<LengthRow> {
        let mut rows: Vec<LengthRow> = self.line_ids().map(|id| self.length_row(id)).collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    /// Anchor-to-canopy checklength for every attachment point in tree order
    pub fn checklength_table(&self, with_sag: bool) -> LineSetResult<Vec<ChecklengthRow>> {
        let mut rows = Vec::new();
        for id in self.tree_order() {
            let upper = self.line(id).upper_node;
            if !self.upper_connected_lines(upper).is_empty() {
                continue;
            }

            let mut lines = Vec::new();
            let mut current = Some(id);
            while let Some(line) = current {
                lines.push(self.line(line).name.clone());
                current = self.lower_connected_lines(self.line(line).lower_node).first().copied();
            }

            rows.push(ChecklengthRow {
                node: self.node(upper).name.clone(),
                lines,
                checklength: self.get_checklength(upper, with_sag)?,
            });
        }
        Ok(rows)
    }

    /// Force and breaking-strength utilisation of every line in tree order
    pub fn force_table(&self) -> Vec<ForceRow> {
        self.tree_order()
            .into_iter()
            .map(|id| {
                let line = self.line(id);
                let force = line.force().value();
                let utilization = match (force, line.line_type.min_break_load) {
                    (Some(f), Some(load)) if load > 0.0 => Some(100.0 * f / load),
                    _ => None,
                };
                ForceRow {
                    name: line.name.clone(),
                    line_type: line.line_type.name.clone(),
                    force,
                    utilization,
                }
            })
            .collect()
    }

    /// Cutting length and weight needed per line type
    pub fn consumption(&self) -> Consumption {
        let mut consumption = Consumption::new();
        for id in self.line_ids() {
            let line = self.line(id);
            let entry: &mut ConsumptionEntry =
                consumption.entry(line.line_type.name.clone()).or_default();
            entry.length += self.get_line_length(id, true).get_length();
            entry.weight += line.get_weight();
        }
        consumption
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RecalcOptions;
    use crate::elements::{Line, LineTypeRegistry, Node};
    use crate::math::Vec3;
    use crate::model::LineSetBuilder;
    use approx::assert_relative_eq;

    /// main -> k1 -> {A1, A2}, main -> k2 -> {B1, B2}
    fn glider() -> LineSet {
        let registry = LineTypeRegistry::with_catalog();
        let lower = registry.get("liros.ntsl250").unwrap();
        let upper = registry.get("liros.ntsl160").unwrap();

        let mut b = LineSetBuilder::new();
        b.add_node(Node::lower("main", Vec3::zeros())).unwrap();
        b.add_node(Node::knot("k1", Vec3::new(0.0, 0.0, 3.0))).unwrap();
        b.add_node(Node::knot("k2", Vec3::new(0.5, 0.0, 3.0))).unwrap();
        for (name, x, y) in [("A1", 0.0, -1.0), ("A2", 0.0, 1.0), ("B1", 0.5, -1.0), ("B2", 0.5, 1.0)] {
            let node = Node::upper(name, Vec3::new(x, y, 6.0), Vec3::new(0.0, 0.0, 100.0))
                .with_offset(0.05);
            b.add_node(node).unwrap();
        }
        b.add_line("a", "main", "k1", lower.clone(), 3.0).unwrap();
        b.add_line("b", "main", "k2", lower, 3.0).unwrap();
        b.add_line("a2", "k1", "A2", upper.clone(), 3.2).unwrap();
        b.add_line("a1", "k1", "A1", upper.clone(), 3.2).unwrap();
        b.add_line("b1", "k2", "B1", upper.clone(), 3.2).unwrap();
        b.add_line("b2", "k2", "B2", upper, 3.2).unwrap();
        b.add_trim_correction("b", -0.01);
        b.build().unwrap()
    }

    fn solved() -> LineSet {
        let mut ls = glider();
        ls.recalc(&RecalcOptions::default().without_sag(), None);
        ls
    }

    #[test]
    fn test_name_key() {
        assert!(name_key("1_A1").unwrap() < name_key("1_A2").unwrap());
        assert!(name_key("1_B1").unwrap() > name_key("1_A9").unwrap());
        assert!(name_key("2_A1").unwrap() > name_key("1_Z9").unwrap());
        assert!(name_key("main").is_none());
        assert!(name_key("999999999999999_A1").is_none());
        assert!(name_key("1_A99999999999999999999").is_none());
    }

    #[test]
    fn test_sort_lines_with_oversized_floor_uses_position() {
        let mut ls = solved();
        let k1 = ls.node_id("k1").unwrap();
        let a1 = ls.line_by_name("a1").unwrap();
        let a2 = ls.line_by_name("a2").unwrap();
        ls.set_line_name(a1, "1_A2");
        ls.set_line_name(a2, "999999999999999_A1");

        let upper = ls.upper_connected_lines(k1).to_vec();
        let sorted = ls.sort_lines(&upper, 10.0, true);
        assert_eq!(sorted, ls.sort_lines(&upper, 10.0, false));
        assert_eq!(sorted[0], a1);

        // reports go through the same sort for the knot correction
        assert_relative_eq!(ls.get_line_length(a1, false).knot_correction, 0.014, epsilon = 1e-12);
        assert_eq!(ls.length_table().len(), 6);
    }

    #[test]
    fn test_rename_lines() {
        let mut ls = solved();
        ls.rename_lines();
        let names: Vec<&str> = ls.lines().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["2_A1", "2_B1", "1_A2", "1_A1", "1_B1", "1_B2"]);

        // renaming again is stable
        let mut again = ls.clone();
        again.rename_lines();
        let names_again: Vec<&str> = again.lines().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, names_again);
    }

    #[test]
    fn test_sort_lines_by_position_and_name() {
        let ls = solved();
        let k1 = ls.node_id("k1").unwrap();
        let upper = ls.upper_connected_lines(k1).to_vec();
        // a2 (y = 1) before a1 (y = -1) in insertion order, sorted by y
        let by_pos = ls.sort_lines(&upper, 10.0, false);
        assert_eq!(ls.line(by_pos[0]).name, "a1");
        // name order agrees with the geometric order here
        assert_eq!(ls.sort_lines(&upper, 10.0, true), by_pos);
    }

    #[test]
    fn test_line_length_components() {
        let ls = solved();
        let a1 = ls.line_by_name("a1").unwrap();
        let length = ls.get_line_length(a1, false);
        assert_relative_eq!(length.loop_correction, 0.05, epsilon = 1e-12);
        // ntsl250 below ntsl160 with two lines in the knot
        assert_relative_eq!(length.knot_correction, 0.014, epsilon = 1e-12);
        assert_relative_eq!(length.manual_correction, 0.0, epsilon = 1e-12);

        let b = ls.line_by_name("b").unwrap();
        let length = ls.get_line_length(b, false);
        assert_eq!(length.knot_correction, 0.0);
        assert_eq!(length.loop_correction, 0.0);
        assert_relative_eq!(length.manual_correction, -0.01, epsilon = 1e-12);
        assert_relative_eq!(
            length.get_length(),
            length.length + length.seam_correction - 0.01,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_checklength_sums_floors() {
        let ls = solved();
        let a1_node = ls.node_id("A1").unwrap();
        let expected = ls.get_line_length(ls.line_by_name("a1").unwrap(), false).get_checklength()
            + ls.get_line_length(ls.line_by_name("a").unwrap(), false).get_checklength();
        assert_relative_eq!(ls.get_checklength(a1_node, false).unwrap(), expected, epsilon = 1e-12);

        let table = ls.checklength_table(false).unwrap();
        assert_eq!(table.len(), 4);
        let row = table.iter().find(|r| r.node == "A1").unwrap();
        assert_eq!(row.lines, vec!["a1", "a"]);
        assert_relative_eq!(row.checklength, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_checklength_rejects_two_lower_lines() {
        let lt = LineTypeRegistry::with_catalog().get("liros.ltc80").unwrap();
        let nodes = vec![
            Node::lower("main", Vec3::zeros()),
            Node::lower("brake", Vec3::new(0.2, 0.0, 0.0)),
            Node::upper("A1", Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 10.0)),
        ];
        let lines = vec![
            Line::new("a", NodeId(0), NodeId(2), lt.clone(), 5.0),
            Line::new("b", NodeId(1), NodeId(2), lt, 5.0),
        ];
        let ls = LineSet::assemble(nodes, lines, Vec3::zeros()).unwrap();
        assert!(matches!(
            ls.get_checklength(NodeId(2), false),
            Err(LineSetError::MultipleLowerLines(n)) if n == "A1"
        ));
    }

    #[test]
    fn test_tables_follow_tree_order() {
        let ls = solved();
        let names: Vec<String> = ls.length_table().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "a1", "a2", "b", "b1", "b2"]);

        let sorted: Vec<String> = ls.sorted_length_table().into_iter().map(|r| r.name).collect();
        assert_eq!(sorted, vec!["a", "a1", "a2", "b", "b1", "b2"]);

        let forces = ls.force_table();
        let a = &forces[0];
        assert!(a.force.unwrap() > 100.0);
        assert_relative_eq!(a.utilization.unwrap(), 100.0 * a.force.unwrap() / 2500.0, epsilon = 1e-12);

        let tree = ls.line_tree(None);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].count(), 3);
        assert_eq!(tree[0].children[0].upper_node, "A1");
    }

    #[test]
    fn test_consumption_by_type() {
        let ls = solved();
        let consumption = ls.consumption();
        assert_eq!(consumption.len(), 2);
        let upper = &consumption["liros.ntsl160"];
        assert!(upper.length > 4.0 * 3.2);
        assert!(upper.weight > 0.0);
    }
}
