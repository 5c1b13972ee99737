use serde::{Deserialize, Serialize};

use crate::ids::ID;

use super::UpdateChange;

/// What kind of component a tap regulator is allowed to regulate. Used to
/// validate `InvalidRegulatedObject` at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegulatedObjectKind {
    Transformer,
    ThreeWindingTransformer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapChangingStrategy {
    Disabled,
    AnyValidTap,
    MinVoltage,
    MaxVoltage,
    FastAnyTap,
}

/// Automatic tap changer control loop attached to a transformer or
/// three-winding transformer, regulating voltage at a control node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerTapRegulator {
    pub id: ID,
    pub regulated_object: ID,
    pub regulated_object_kind: RegulatedObjectKind,
    pub status: bool,
    pub control_side: u8,
    pub u_set: f64,
    pub u_band: f64,
    pub line_drop_compensation_r: f64,
    pub line_drop_compensation_x: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegulatorUpdate {
    pub id: ID,
    pub status: Option<bool>,
    pub u_set: Option<f64>,
    pub u_band: Option<f64>,
}

impl TransformerTapRegulator {
    pub fn apply(&mut self, u: &RegulatorUpdate) -> UpdateChange {
        let mut change = UpdateChange::NONE;
        if let Some(v) = u.status {
            change.param |= v != self.status;
            self.status = v;
        }
        if let Some(v) = u.u_set {
            change.param |= v != self.u_set;
            self.u_set = v;
        }
        if let Some(v) = u.u_band {
            change.param |= v != self.u_band;
            self.u_band = v;
        }
        change
    }

    pub fn inverse(&self, u: &RegulatorUpdate) -> RegulatorUpdate {
        RegulatorUpdate {
            id: u.id,
            status: u.status.map(|_| self.status),
            u_set: u.u_set.map(|_| self.u_set),
            u_band: u.u_band.map(|_| self.u_band),
        }
    }
}

/// Output record for a tap regulator. Automatic tap calculation is
/// per-component physics this engine does not implement (see `DESIGN.md`),
/// so this is always a null record — present for schema completeness, the
/// same way `null_sensor_outputs`/`null_fault_outputs` report an
/// unimplemented calculation kind rather than omitting the component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegulatorOutput {
    pub id: ID,
    pub energized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_a_regulator_is_param_change() {
        let mut reg = TransformerTapRegulator {
            id: 40,
            regulated_object: 5,
            regulated_object_kind: RegulatedObjectKind::Transformer,
            status: true,
            control_side: 0,
            u_set: 1.0,
            u_band: 0.01,
            line_drop_compensation_r: 0.0,
            line_drop_compensation_x: 0.0,
        };
        let change = reg.apply(&RegulatorUpdate {
            id: 40,
            status: Some(false),
            ..Default::default()
        });
        assert!(change.param);
    }
}
