//! Paraglider Lines - equilibrium solver for paraglider line sets
//!
//! A line set is a forest of line trees: each tree starts at a lower
//! attachment point (riser / harness), branches at knots and ends at canopy
//! attachment points which carry the aerodynamic load. This crate computes:
//! - Knot positions in static equilibrium
//! - Axial line forces
//! - Drag-induced sag of every line (coupled parabolic profiles)
//! - Length, checklength, force and material reports
//!
//! ## Example
//! ```rust
//! use paraglider_lines::prelude::*;
//!
//! let registry = LineTypeRegistry::with_catalog();
//! let line_type = registry.get("liros.ltc80").unwrap();
//!
//! let mut builder = LineSetBuilder::new().with_inflow(Vec3::new(-10.0, 0.0, -1.0));
//! builder.add_node(Node::lower("main", Vec3::zeros())).unwrap();
//! builder.add_node(Node::knot("k1", Vec3::new(0.0, 0.0, 2.0))).unwrap();
//! builder
//!     .add_node(Node::upper("A1", Vec3::new(0.0, 1.0, 5.0), Vec3::new(0.0, 10.0, 100.0)))
//!     .unwrap();
//! builder
//!     .add_node(Node::upper("A2", Vec3::new(0.0, -1.0, 5.0), Vec3::new(0.0, -10.0, 100.0)))
//!     .unwrap();
//! builder.add_line("main", "main", "k1", line_type.clone(), 2.0).unwrap();
//! builder.add_line("A1", "k1", "A1", line_type.clone(), 3.2).unwrap();
//! builder.add_line("A2", "k1", "A2", line_type, 3.2).unwrap();
//!
//! let mut lineset = builder.build().unwrap();
//! lineset.recalc(&RecalcOptions::default(), None);
//!
//! let main = lineset.line_by_name("main").unwrap();
//! let length = lineset.get_line_length(main, true);
//! assert!(length.get_length() > 2.0);
//! ```

pub mod analysis;
pub mod canopy;
pub mod description;
pub mod elements;
pub mod error;
pub mod knots;
pub mod math;
pub mod model;
pub mod reports;
pub mod results;

// Re-export common types
pub mod prelude {
    pub use crate::analysis::RecalcOptions;
    pub use crate::canopy::{Attachment, Canopy, StaticCanopy};
    pub use crate::description::{LineDescription, LineSetDescription};
    pub use crate::elements::{
        Line, LineForce, LineId, LineType, LineTypeRegistry, Node, NodeId, NodeType,
    };
    pub use crate::error::{LineSetError, LineSetResult};
    pub use crate::knots::KnotCorrections;
    pub use crate::math::{SagCurve, Vec3};
    pub use crate::model::{LineSet, LineSetBuilder};
    pub use crate::results::{
        ChecklengthRow, Consumption, ForceRow, LengthRow, LineLength, LineTree, RecalcReport,
    };
}
