use serde::{Deserialize, Serialize};

use crate::ids::ID;

use super::UpdateChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultType {
    ThreePhase,
    SinglePhaseToGround,
    TwoPhase,
    TwoPhaseToGround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultPhase {
    A,
    B,
    C,
    Default,
    None,
}

/// A short-circuit fault anchored at a node. `fault_object` is `None` only
/// during construction before the Input Preparer resolves it; a fault
/// always ends up anchored to exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub id: ID,
    pub status: bool,
    pub fault_type: FaultType,
    pub fault_phase: FaultPhase,
    pub fault_object: Option<ID>,
    /// Fault impedance, ohm.
    pub r_f: f64,
    pub x_f: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultUpdate {
    pub id: ID,
    pub status: Option<bool>,
    pub r_f: Option<f64>,
    pub x_f: Option<f64>,
}

impl Fault {
    pub fn apply(&mut self, u: &FaultUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.status {
            // a fault's status does not change the network's topology graph
            // (it is not a branch/source), but it does change which faults
            // are active for the next short-circuit calculation, which this
            // model treats as a parameter change.
            change.param |= v != self.status;
            self.status = v;
        }
        if let Some(v) = u.r_f {
            change.param |= v != self.r_f;
            self.r_f = v;
        }
        if let Some(v) = u.x_f {
            change.param |= v != self.x_f;
            self.x_f = v;
        }
        change
    }

    pub fn inverse(&self, u: &FaultUpdate) -> FaultUpdate {
        FaultUpdate {
            id: u.id,
            status: u.status.map(|_| self.status),
            r_f: u.r_f.map(|_| self.r_f),
            x_f: u.x_f.map(|_| self.x_f),
        }
    }
}

/// Output record for a fault: short-circuit current at the faulted node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultOutput {
    pub id: ID,
    pub i_f: f64,
    pub i_f_angle: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_edit_is_param_change_not_topo() {
        let mut fault = Fault {
            id: 30,
            status: true,
            fault_type: FaultType::ThreePhase,
            fault_phase: FaultPhase::Default,
            fault_object: Some(3),
            r_f: 0.0,
            x_f: 0.0,
        };
        let change = fault.apply(&FaultUpdate {
            id: 30,
            status: Some(false),
            ..Default::default()
        });
        assert!(change.param);
        assert!(!change.topo);
    }
}
