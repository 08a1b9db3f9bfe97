//! Line network elements

mod catalog;
mod line;
mod line_type;
mod node;

pub use line::{Line, LineForce, LineId};
pub use line_type::{Color, LineType, LineTypeRegistry};
pub use node::{Node, NodeId, NodeType};
