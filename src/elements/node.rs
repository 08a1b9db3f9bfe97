//! Node element - a point of the line network

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Stable index of a node inside its line set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Role of a node in the line tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Canopy attachment point, positioned and loaded by the canopy
    Upper,
    /// Anchor point (risers / harness attachment)
    Lower,
    /// Junction between lines
    Knot,
}

/// A node of the line network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Name (used for grouping, sorting and lookup)
    pub name: String,
    /// Node role
    pub node_type: NodeType,
    /// Position in 3D space
    pub position: Vec3,
    /// External (aerodynamic) force, only used for upper nodes
    #[serde(default = "zero_force")]
    pub force: Vec3,
    /// Length consumed by the canopy loop / brake offset
    #[serde(default)]
    pub offset: f64,
    /// Spanwise rib position, used to sort lines
    #[serde(default)]
    pub rib_pos: Option<f64>,
}

fn zero_force() -> Vec3 {
    Vec3::zeros()
}

impl Node {
    fn new(name: &str, node_type: NodeType, position: Vec3) -> Self {
        Self {
            name: name.to_string(),
            node_type,
            position,
            force: Vec3::zeros(),
            offset: 0.0,
            rib_pos: None,
        }
    }

    /// Canopy attachment point carrying an external force
    pub fn upper(name: &str, position: Vec3, force: Vec3) -> Self {
        Self {
            force,
            ..Self::new(name, NodeType::Upper, position)
        }
    }

    /// Fixed anchor point
    pub fn lower(name: &str, position: Vec3) -> Self {
        Self::new(name, NodeType::Lower, position)
    }

    /// Free knot; the position is only an initial guess
    pub fn knot(name: &str, position: Vec3) -> Self {
        Self::new(name, NodeType::Knot, position)
    }

    /// Set the loop / brake offset
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the rib position used for sorting
    pub fn with_rib_pos(mut self, rib_pos: f64) -> Self {
        self.rib_pos = Some(rib_pos);
        self
    }

    pub fn is_upper(&self) -> bool {
        self.node_type == NodeType::Upper
    }

    pub fn is_lower(&self) -> bool {
        self.node_type == NodeType::Lower
    }

    pub fn is_knot(&self) -> bool {
        self.node_type == NodeType::Knot
    }

    /// External force; `None` for anything but canopy attachment points
    pub fn external_force(&self) -> Option<Vec3> {
        self.is_upper().then_some(self.force)
    }

    /// Pull of this attachment point as seen from `reference`.
    ///
    /// The external force is projected onto the direction towards the
    /// reference point, so a line starting at `reference` is pulled along
    /// that direction with the projected magnitude. Returns `None` for
    /// nodes without an external force; their influence is the sum over
    /// the attachment points above them.
    pub fn calc_force_influence(&self, reference: &Vec3) -> Option<Vec3> {
        let force = self.external_force()?;
        match (self.position - reference).try_normalize(1e-12) {
            Some(direction) => Some(direction * force.dot(&direction)),
            None => Some(force),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_node_creation() {
        let node = Node::upper("A1", Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.0, 10.0));
        assert!(node.is_upper());
        assert_eq!(node.external_force(), Some(Vec3::new(0.0, 0.0, 10.0)));

        let knot = Node::knot("k", Vec3::zeros());
        assert!(knot.external_force().is_none());
        assert!(knot.calc_force_influence(&Vec3::zeros()).is_none());
    }

    #[test]
    fn test_force_influence_projects_onto_direction() {
        let node = Node::upper("A1", Vec3::new(0.0, 3.0, 4.0), Vec3::new(0.0, 0.0, 100.0));
        let infl = node.calc_force_influence(&Vec3::zeros()).unwrap();
        let dir = Vec3::new(0.0, 0.6, 0.8);
        assert_relative_eq!(infl, dir * 80.0, epsilon = 1e-12);
    }
}
