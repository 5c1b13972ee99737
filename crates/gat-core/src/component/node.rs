use serde::{Deserialize, Serialize};

use crate::ids::ID;
use crate::units::{PerUnit, Radians};

use super::UpdateChange;

/// A bus: the only component type with no topological endpoints of its own
/// (every other component refers to one or more `Node` IDs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: ID,
    /// Rated line-to-line voltage, volts.
    pub u_rated: f64,
}

/// Output record for a node: positive-sequence (or per-phase, for
/// asymmetric) voltage magnitude and angle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    pub id: ID,
    pub energized: bool,
    pub u_pu: PerUnit,
    pub u: f64,
    pub u_angle: Radians,
}

/// Partial update record: every field after `id` is optional, mirroring the
/// dataset's columnar update buffers where unset columns mean "unchanged".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub id: ID,
}

impl Node {
    pub fn apply(&mut self, _update: &NodeUpdate) -> UpdateChange {
        // Nodes carry no mutable fields in this model; a node update is only
        // ever a no-op placeholder that keeps the per-type update sequence
        // aligned with the dataset's component list.
        UpdateChange::NONE
    }

    pub fn inverse(&self, update: &NodeUpdate) -> NodeUpdate {
        NodeUpdate { id: update.id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_apply_is_a_no_op() {
        let mut node = Node {
            id: 1,
            u_rated: 10_000.0,
        };
        let change = node.apply(&NodeUpdate { id: 1 });
        assert_eq!(change, UpdateChange::NONE);
    }
}
