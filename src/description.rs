//! JSON description of a line set (nodes, lines by name, inflow, options)

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::RecalcOptions;
use crate::elements::{Line, LineType, LineTypeRegistry, Node};
use crate::error::LineSetResult;
use crate::math::Vec3;
use crate::model::{LineSet, LineSetBuilder};

/// A line wired by node names and a line-type name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDescription {
    pub name: String,
    pub lower: String,
    pub upper: String,
    pub line_type: String,
    pub init_length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn zero_inflow() -> Vec3 {
    Vec3::zeros()
}

/// Serializable scenario: everything needed to rebuild and solve a line set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSetDescription {
    pub nodes: Vec<Node>,
    pub lines: Vec<LineDescription>,
    #[serde(default = "zero_inflow")]
    pub v_inf: Vec3,
    #[serde(default)]
    pub trim_corrections: BTreeMap<String, f64>,
    /// Line types not found in the registry used for building
    #[serde(default)]
    pub line_types: Vec<LineType>,
    #[serde(default)]
    pub options: RecalcOptions,
}

impl LineSetDescription {
    pub fn from_json(json: &str) -> LineSetResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> LineSetResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> LineSetResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the line set, resolving line types through `registry`
    pub fn build(&self, registry: &LineTypeRegistry) -> LineSetResult<LineSet> {
        let mut registry = registry.clone();
        for line_type in &self.line_types {
            if !registry.contains(&line_type.name) {
                registry.register(line_type.clone())?;
            }
        }

        let mut builder = LineSetBuilder::new().with_inflow(self.v_inf);
        for node in &self.nodes {
            builder.add_node(node.clone())?;
        }
        for desc in &self.lines {
            let mut line = Line::new(
                &desc.name,
                builder.node_id(&desc.lower)?,
                builder.node_id(&desc.upper)?,
                registry.get(&desc.line_type)?,
                desc.init_length,
            );
            line.target_length = desc.target_length;
            line.color = desc.color.clone();
            builder.push_line(line)?;
        }
        for (name, correction) in &self.trim_corrections {
            builder.add_trim_correction(name, *correction);
        }
        builder.build()
    }
}

impl LineSet {
    /// Describe the current state; line types travel along
    pub fn describe(&self, options: &RecalcOptions) -> LineSetDescription {
        let mut seen = BTreeSet::new();
        let line_types = self
            .lines()
            .iter()
            .filter(|l| seen.insert(l.line_type.name.clone()))
            .map(|l| (*l.line_type).clone())
            .collect();

        LineSetDescription {
            nodes: self.nodes().to_vec(),
            lines: self
                .lines()
                .iter()
                .map(|l| LineDescription {
                    name: l.name.clone(),
                    lower: self.node(l.lower_node).name.clone(),
                    upper: self.node(l.upper_node).name.clone(),
                    line_type: l.line_type.name.clone(),
                    init_length: l.init_length,
                    target_length: l.target_length,
                    color: l.color.clone(),
                })
                .collect(),
            v_inf: self.v_inf(),
            trim_corrections: self.trim_corrections.clone(),
            line_types,
            options: options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LineSetError;

    const SCENARIO: &str = r#"{
        "nodes": [
            {"name": "main", "node_type": "lower", "position": [0.0, 0.0, 0.0]},
            {"name": "A1", "node_type": "upper", "position": [0.0, 0.0, 5.0], "force": [0.0, 0.0, 50.0], "offset": 0.02}
        ],
        "lines": [
            {"name": "A1", "lower": "main", "upper": "A1", "line_type": "liros.ltc80", "init_length": 5.0}
        ],
        "v_inf": [-10.0, 0.0, 0.0],
        "options": {"iterations": 3}
    }"#;

    #[test]
    fn test_build_from_json() {
        let desc = LineSetDescription::from_json(SCENARIO).unwrap();
        assert_eq!(desc.options.iterations, 3);
        assert!(desc.options.calculate_sag);

        let ls = desc.build(&LineTypeRegistry::with_catalog()).unwrap();
        assert_eq!(ls.lines().len(), 1);
        assert_eq!(ls.node(ls.node_id("A1").unwrap()).offset, 0.02);
        assert_eq!(ls.v_inf(), Vec3::new(-10.0, 0.0, 0.0));
    }

    #[test]
    fn test_unknown_line_type() {
        let desc = LineSetDescription::from_json(SCENARIO).unwrap();
        assert!(matches!(
            desc.build(&LineTypeRegistry::new()),
            Err(LineSetError::LineTypeNotFound(_))
        ));
    }

    #[test]
    fn test_describe_is_self_contained() {
        let desc = LineSetDescription::from_json(SCENARIO).unwrap();
        let ls = desc.build(&LineTypeRegistry::with_catalog()).unwrap();
        let json = ls.describe(&desc.options).to_json().unwrap();

        // rebuilt without the catalogue: line types come from the description
        let rebuilt = LineSetDescription::from_json(&json)
            .unwrap()
            .build(&LineTypeRegistry::new())
            .unwrap();
        assert_eq!(rebuilt.line(crate::elements::LineId(0)).line_type.name, "liros.ltc80");
        assert_eq!(rebuilt.v_inf(), ls.v_inf());
    }
}
