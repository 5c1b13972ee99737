use serde::{Deserialize, Serialize};

use crate::ids::ID;

use super::UpdateChange;

/// How a load/generator's rated power scales with bus voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadGenType {
    ConstPower,
    ConstImpedance,
    ConstCurrent,
}

/// An ideal voltage source behind an internal impedance; always singly
/// connected (one node, one status bit) and capable of seeding an island.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: ID,
    pub node: ID,
    pub status: bool,
    pub u_ref: f64,
    pub u_ref_angle: f64,
    pub sk: Option<f64>,
    pub rx_ratio: Option<f64>,
    pub z01_ratio: Option<f64>,
}

/// Symmetric (three-phase balanced) constant-type load or generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymLoad {
    pub id: ID,
    pub node: ID,
    pub status: bool,
    pub load_gen_type: LoadGenType,
    pub p_specified: f64,
    pub q_specified: f64,
}

/// Per-phase unbalanced constant-type load or generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsymLoad {
    pub id: ID,
    pub node: ID,
    pub status: bool,
    pub load_gen_type: LoadGenType,
    pub p_specified: [f64; 3],
    pub q_specified: [f64; 3],
}

/// Fixed shunt admittance connected to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shunt {
    pub id: ID,
    pub node: ID,
    pub status: bool,
    pub g1: f64,
    pub b1: f64,
    pub g0: Option<f64>,
    pub b0: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplianceUpdate {
    pub id: ID,
    pub status: Option<bool>,
    pub p_specified: Option<f64>,
    pub q_specified: Option<f64>,
    pub p_specified_asym: Option<[f64; 3]>,
    pub q_specified_asym: Option<[f64; 3]>,
    pub u_ref: Option<f64>,
    pub u_ref_angle: Option<f64>,
}

impl Source {
    pub fn apply(&mut self, u: &ApplianceUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.status {
            change.topo |= v != self.status;
            self.status = v;
        }
        if let Some(v) = u.u_ref {
            change.param |= v != self.u_ref;
            self.u_ref = v;
        }
        if let Some(v) = u.u_ref_angle {
            change.param |= v != self.u_ref_angle;
            self.u_ref_angle = v;
        }
        change
    }

    pub fn inverse(&self, u: &ApplianceUpdate) -> ApplianceUpdate {
        ApplianceUpdate {
            id: u.id,
            status: u.status.map(|_| self.status),
            u_ref: u.u_ref.map(|_| self.u_ref),
            u_ref_angle: u.u_ref_angle.map(|_| self.u_ref_angle),
            ..Default::default()
        }
    }
}

impl SymLoad {
    pub fn apply(&mut self, u: &ApplianceUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.status {
            change.topo |= v != self.status;
            self.status = v;
        }
        if let Some(v) = u.p_specified {
            change.param |= v != self.p_specified;
            self.p_specified = v;
        }
        if let Some(v) = u.q_specified {
            change.param |= v != self.q_specified;
            self.q_specified = v;
        }
        change
    }

    pub fn inverse(&self, u: &ApplianceUpdate) -> ApplianceUpdate {
        ApplianceUpdate {
            id: u.id,
            status: u.status.map(|_| self.status),
            p_specified: u.p_specified.map(|_| self.p_specified),
            q_specified: u.q_specified.map(|_| self.q_specified),
            ..Default::default()
        }
    }
}

impl AsymLoad {
    pub fn apply(&mut self, u: &ApplianceUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.status {
            change.topo |= v != self.status;
            self.status = v;
        }
        if let Some(v) = u.p_specified_asym {
            change.param |= v != self.p_specified;
            self.p_specified = v;
        }
        if let Some(v) = u.q_specified_asym {
            change.param |= v != self.q_specified;
            self.q_specified = v;
        }
        change
    }

    pub fn inverse(&self, u: &ApplianceUpdate) -> ApplianceUpdate {
        ApplianceUpdate {
            id: u.id,
            status: u.status.map(|_| self.status),
            p_specified_asym: u.p_specified_asym.map(|_| self.p_specified),
            q_specified_asym: u.q_specified_asym.map(|_| self.q_specified),
            ..Default::default()
        }
    }
}

impl Shunt {
    pub fn apply(&mut self, u: &ApplianceUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.status {
            change.topo |= v != self.status;
            self.status = v;
        }
        change
    }

    pub fn inverse(&self, u: &ApplianceUpdate) -> ApplianceUpdate {
        ApplianceUpdate {
            id: u.id,
            status: u.status.map(|_| self.status),
            ..Default::default()
        }
    }
}

/// Output record shared by source/sym_load/asym_load/shunt: terminal power
/// and current at the single connection point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplianceOutput {
    pub id: ID,
    pub energized: bool,
    pub p: f64,
    pub q: f64,
    pub i: f64,
    pub s: f64,
    pub pf: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_status_toggle_is_topo_change() {
        let mut source = Source {
            id: 6,
            node: 1,
            status: true,
            u_ref: 1.05,
            u_ref_angle: 0.0,
            sk: None,
            rx_ratio: None,
            z01_ratio: None,
        };
        let change = source.apply(&ApplianceUpdate {
            id: 6,
            status: Some(false),
            ..Default::default()
        });
        assert!(change.topo);
        assert!(!source.status);
    }

    #[test]
    fn sym_load_power_edit_is_param_change() {
        let mut load = SymLoad {
            id: 7,
            node: 3,
            status: true,
            load_gen_type: LoadGenType::ConstImpedance,
            p_specified: 0.5e6,
            q_specified: 0.0,
        };
        let change = load.apply(&ApplianceUpdate {
            id: 7,
            p_specified: Some(1.0e6),
            ..Default::default()
        });
        assert!(change.param);
        assert!(!change.topo);
        assert_eq!(load.p_specified, 1.0e6);
    }

    #[test]
    fn asym_load_inverse_round_trips() {
        let mut load = AsymLoad {
            id: 8,
            node: 3,
            status: true,
            load_gen_type: LoadGenType::ConstImpedance,
            p_specified: [0.5e6 / 3.0; 3],
            q_specified: [0.0; 3],
        };
        let update = ApplianceUpdate {
            id: 8,
            status: Some(false),
            ..Default::default()
        };
        let inverse = load.inverse(&update);
        load.apply(&update);
        load.apply(&inverse);
        assert!(load.status);
    }
}
