//! Canopy collaborator - positions and loads of the attachment points

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::elements::Node;
use crate::math::Vec3;

/// Position and external force of one canopy attachment point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub position: Vec3,
    pub force: Vec3,
}

/// Source of attachment-point geometry and loads (the 3D glider)
pub trait Canopy {
    /// Current position and force of an upper node, `None` if unknown
    fn attachment(&self, node: &Node) -> Option<Attachment>;

    /// Inflow vector, if the canopy defines one
    fn inflow(&self) -> Option<Vec3> {
        None
    }
}

/// Canopy given as a fixed table of attachment points by node name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCanopy {
    pub attachments: HashMap<String, Attachment>,
    pub v_inf: Option<Vec3>,
}

impl StaticCanopy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attachment(mut self, name: &str, position: Vec3, force: Vec3) -> Self {
        self.attachments
            .insert(name.to_string(), Attachment { position, force });
        self
    }

    pub fn with_inflow(mut self, v_inf: Vec3) -> Self {
        self.v_inf = Some(v_inf);
        self
    }
}

impl Canopy for StaticCanopy {
    fn attachment(&self, node: &Node) -> Option<Attachment> {
        self.attachments.get(&node.name).copied()
    }

    fn inflow(&self) -> Option<Vec3> {
        self.v_inf
    }
}
