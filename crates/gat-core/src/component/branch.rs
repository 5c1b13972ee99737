use serde::{Deserialize, Serialize};

use crate::ids::ID;
use crate::units::{PerUnit, Radians};

use super::UpdateChange;

/// A two-terminal line: series impedance plus symmetric shunt charging,
/// closed independently at each end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: ID,
    pub from_node: ID,
    pub to_node: ID,
    pub from_status: bool,
    pub to_status: bool,
    /// Positive-sequence series resistance, ohm.
    pub r1: f64,
    /// Positive-sequence series reactance, ohm.
    pub x1: f64,
    /// Positive-sequence shunt susceptance, siemens.
    pub c1: f64,
    pub tan1: f64,
    /// Zero-sequence variants for asymmetric calculations.
    pub r0: Option<f64>,
    pub x0: Option<f64>,
    pub c0: Option<f64>,
    pub tan0: Option<f64>,
    pub i_n: Option<f64>,
}

impl Line {
    pub fn is_closed(&self) -> bool {
        self.from_status && self.to_status
    }
}

/// A zero-impedance switchable connection between two nodes (e.g. a bus
/// coupler or disconnector). Behaves like a `Line` with zero series
/// impedance and no shunt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: ID,
    pub from_node: ID,
    pub to_node: ID,
    pub from_status: bool,
    pub to_status: bool,
}

impl Link {
    pub fn is_closed(&self) -> bool {
        self.from_status && self.to_status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindingConnection {
    Wye,
    WyeGrounded,
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformerTapSide {
    FromSide,
    ToSide,
}

/// A two-terminal transformer with a tap changer. Tap ratio and phase shift
/// are derived from `tap_pos` at parameter-build time by the input
/// preparer; this struct stores the nameplate and current tap state only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformer {
    pub id: ID,
    pub from_node: ID,
    pub to_node: ID,
    pub from_status: bool,
    pub to_status: bool,
    pub u1: f64,
    pub u2: f64,
    pub sn: f64,
    pub uk: f64,
    pub pk: f64,
    pub i0: f64,
    pub p0: f64,
    pub winding_from: WindingConnection,
    pub winding_to: WindingConnection,
    pub clock: u8,
    pub tap_side: TransformerTapSide,
    pub tap_pos: i32,
    pub tap_min: i32,
    pub tap_max: i32,
    pub tap_nom: i32,
    pub tap_size: f64,
}

impl Transformer {
    pub fn is_closed(&self) -> bool {
        self.from_status && self.to_status
    }

    /// Directed phase shift contributed by the vector group clock number,
    /// from-side to to-side (30 degrees per clock step).
    pub fn phase_shift(&self) -> Radians {
        Radians(self.clock as f64 * std::f64::consts::PI / 6.0)
    }
}

/// A three-terminal transformer; expands to three mathematical branches
/// sharing one synthetic internal node at topology-build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeWindingTransformer {
    pub id: ID,
    pub node_1: ID,
    pub node_2: ID,
    pub node_3: ID,
    pub status_1: bool,
    pub status_2: bool,
    pub status_3: bool,
    pub u1: f64,
    pub u2: f64,
    pub u3: f64,
    pub sn_1: f64,
    pub sn_2: f64,
    pub sn_3: f64,
    pub uk_12: f64,
    pub uk_13: f64,
    pub uk_23: f64,
    pub pk_12: f64,
    pub pk_13: f64,
    pub pk_23: f64,
    pub i0: f64,
    pub p0: f64,
    pub winding_1: WindingConnection,
    pub winding_2: WindingConnection,
    pub winding_3: WindingConnection,
    pub clock_12: u8,
    pub clock_13: u8,
    pub tap_side: TransformerTapSide,
    pub tap_pos: i32,
    pub tap_min: i32,
    pub tap_max: i32,
    pub tap_nom: i32,
    pub tap_size: f64,
}

impl ThreeWindingTransformer {
    pub fn status(&self, terminal: u8) -> bool {
        match terminal {
            1 => self.status_1,
            2 => self.status_2,
            3 => self.status_3,
            _ => false,
        }
    }
}

/// Partial update for any two-terminal branch (`Line`, `Link`,
/// `Transformer`). Status edits are topo-changing; everything else
/// (series/shunt parameters, tap position) is param-changing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchUpdate {
    pub id: ID,
    pub from_status: Option<bool>,
    pub to_status: Option<bool>,
    pub tap_pos: Option<i32>,
}

impl Line {
    pub fn apply(&mut self, u: &BranchUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.from_status {
            change.topo |= v != self.from_status;
            self.from_status = v;
        }
        if let Some(v) = u.to_status {
            change.topo |= v != self.to_status;
            self.to_status = v;
        }
        change
    }

    pub fn inverse(&self, u: &BranchUpdate) -> BranchUpdate {
        BranchUpdate {
            id: u.id,
            from_status: u.from_status.map(|_| self.from_status),
            to_status: u.to_status.map(|_| self.to_status),
            tap_pos: None,
        }
    }
}

impl Link {
    pub fn apply(&mut self, u: &BranchUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.from_status {
            change.topo |= v != self.from_status;
            self.from_status = v;
        }
        if let Some(v) = u.to_status {
            change.topo |= v != self.to_status;
            self.to_status = v;
        }
        change
    }

    pub fn inverse(&self, u: &BranchUpdate) -> BranchUpdate {
        BranchUpdate {
            id: u.id,
            from_status: u.from_status.map(|_| self.from_status),
            to_status: u.to_status.map(|_| self.to_status),
            tap_pos: None,
        }
    }
}

impl Transformer {
    pub fn apply(&mut self, u: &BranchUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.from_status {
            change.topo |= v != self.from_status;
            self.from_status = v;
        }
        if let Some(v) = u.to_status {
            change.topo |= v != self.to_status;
            self.to_status = v;
        }
        if let Some(v) = u.tap_pos {
            change.param |= v != self.tap_pos;
            self.tap_pos = v;
        }
        change
    }

    pub fn inverse(&self, u: &BranchUpdate) -> BranchUpdate {
        BranchUpdate {
            id: u.id,
            from_status: u.from_status.map(|_| self.from_status),
            to_status: u.to_status.map(|_| self.to_status),
            tap_pos: u.tap_pos.map(|_| self.tap_pos),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Branch3Update {
    pub id: ID,
    pub status_1: Option<bool>,
    pub status_2: Option<bool>,
    pub status_3: Option<bool>,
    pub tap_pos: Option<i32>,
}

impl ThreeWindingTransformer {
    pub fn apply(&mut self, u: &Branch3Update) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.status_1 {
            change.topo |= v != self.status_1;
            self.status_1 = v;
        }
        if let Some(v) = u.status_2 {
            change.topo |= v != self.status_2;
            self.status_2 = v;
        }
        if let Some(v) = u.status_3 {
            change.topo |= v != self.status_3;
            self.status_3 = v;
        }
        if let Some(v) = u.tap_pos {
            change.param |= v != self.tap_pos;
            self.tap_pos = v;
        }
        change
    }

    pub fn inverse(&self, u: &Branch3Update) -> Branch3Update {
        Branch3Update {
            id: u.id,
            status_1: u.status_1.map(|_| self.status_1),
            status_2: u.status_2.map(|_| self.status_2),
            status_3: u.status_3.map(|_| self.status_3),
            tap_pos: u.tap_pos.map(|_| self.tap_pos),
        }
    }
}

/// Output record shared by `Line`/`Link`/`Transformer`: one entry per
/// terminal side. `ThreeWindingTransformer` has a third terminal and uses
/// `Branch3Output` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchOutput {
    pub id: ID,
    pub energized: bool,
    pub loading: PerUnit,
    pub p_from: f64,
    pub q_from: f64,
    pub i_from: f64,
    pub s_from: f64,
    pub p_to: f64,
    pub q_to: f64,
    pub i_to: f64,
    pub s_to: f64,
}

/// Output record for `ThreeWindingTransformer`: the same per-terminal
/// power/current/loading quantities as `BranchOutput`, read three times
/// (one per winding) instead of twice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Branch3Output {
    pub id: ID,
    pub energized: bool,
    pub loading: PerUnit,
    pub p_1: f64,
    pub q_1: f64,
    pub i_1: f64,
    pub s_1: f64,
    pub p_2: f64,
    pub q_2: f64,
    pub i_2: f64,
    pub s_2: f64,
    pub p_3: f64,
    pub q_3: f64,
    pub i_3: f64,
    pub s_3: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line() -> Line {
        Line {
            id: 4,
            from_node: 1,
            to_node: 2,
            from_status: true,
            to_status: true,
            r1: 10.0,
            x1: 0.0,
            c1: 0.0,
            tan1: 0.0,
            r0: None,
            x0: None,
            c0: None,
            tan0: None,
            i_n: None,
        }
    }

    #[test]
    fn status_edit_is_topo_change() {
        let mut line = sample_line();
        let change = line.apply(&BranchUpdate {
            id: 4,
            from_status: Some(false),
            to_status: None,
            tap_pos: None,
        });
        assert!(change.topo);
        assert!(!change.param);
        assert!(!line.from_status);
    }

    #[test]
    fn inverse_restores_prior_status() {
        let mut line = sample_line();
        let update = BranchUpdate {
            id: 4,
            from_status: Some(false),
            to_status: None,
            tap_pos: None,
        };
        let inverse = line.inverse(&update);
        line.apply(&update);
        line.apply(&inverse);
        assert!(line.from_status);
    }

    #[test]
    fn transformer_tap_edit_is_param_change() {
        let mut xfmr = Transformer {
            id: 5,
            from_node: 1,
            to_node: 2,
            from_status: true,
            to_status: true,
            u1: 10_000.0,
            u2: 400.0,
            sn: 1e6,
            uk: 0.06,
            pk: 1e4,
            i0: 0.001,
            p0: 100.0,
            winding_from: WindingConnection::WyeGrounded,
            winding_to: WindingConnection::WyeGrounded,
            clock: 0,
            tap_side: TransformerTapSide::FromSide,
            tap_pos: 0,
            tap_min: -5,
            tap_max: 5,
            tap_nom: 0,
            tap_size: 0.025,
        };
        let change = xfmr.apply(&BranchUpdate {
            id: 5,
            from_status: None,
            to_status: None,
            tap_pos: Some(2),
        });
        assert!(change.param);
        assert!(!change.topo);
        assert_eq!(xfmr.tap_pos, 2);
    }
}
