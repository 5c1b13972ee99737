use serde::{Deserialize, Serialize};

use crate::ids::ID;

use super::UpdateChange;

/// Which physical terminal a power/current sensor observes. Drives the
/// Input Preparer's bucketing of power sensors into
/// source/shunt/load/branch-from/branch-to/branch3-k/node-injection groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasuredTerminalType {
    BranchFrom,
    BranchTo,
    Source,
    Shunt,
    Load,
    Generator,
    Branch3_1,
    Branch3_2,
    Branch3_3,
    Node,
}

/// Symmetric (positive-sequence) voltage measurement at a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymVoltageSensor {
    pub id: ID,
    pub measured_object: ID,
    pub u_sigma: f64,
    pub u_measured: f64,
    pub u_angle_measured: Option<f64>,
}

/// Per-phase voltage measurement at a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsymVoltageSensor {
    pub id: ID,
    pub measured_object: ID,
    pub u_sigma: f64,
    pub u_measured: [f64; 3],
    pub u_angle_measured: Option<[f64; 3]>,
}

/// Symmetric power measurement at a terminal named by `measured_terminal_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymPowerSensor {
    pub id: ID,
    pub measured_object: ID,
    pub measured_terminal_type: MeasuredTerminalType,
    pub power_sigma: f64,
    pub p_measured: f64,
    pub q_measured: f64,
}

/// Per-phase power measurement at a terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsymPowerSensor {
    pub id: ID,
    pub measured_object: ID,
    pub measured_terminal_type: MeasuredTerminalType,
    pub power_sigma: f64,
    pub p_measured: [f64; 3],
    pub q_measured: [f64; 3],
}

/// Current measurement at a branch terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSensor {
    pub id: ID,
    pub measured_object: ID,
    pub measured_terminal_type: MeasuredTerminalType,
    pub current_sigma: f64,
    pub i_measured: f64,
    pub i_angle_measured: f64,
}

/// Partial update for any sensor kind: only the measurement fields are
/// mutable (status and topology are carried by the measured object, not the
/// sensor itself, so a sensor update never reports `topo`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorUpdate {
    pub id: ID,
    pub u_sigma: Option<f64>,
    pub u_measured: Option<f64>,
    pub u_measured_asym: Option<[f64; 3]>,
    pub power_sigma: Option<f64>,
    pub p_measured: Option<f64>,
    pub q_measured: Option<f64>,
    pub p_measured_asym: Option<[f64; 3]>,
    pub q_measured_asym: Option<[f64; 3]>,
    pub current_sigma: Option<f64>,
    pub i_measured: Option<f64>,
    pub i_angle_measured: Option<f64>,
}

impl SymVoltageSensor {
    pub fn apply(&mut self, u: &SensorUpdate) -> UpdateChange {
        if let Some(v) = u.u_sigma {
            self.u_sigma = v;
        }
        if let Some(v) = u.u_measured {
            self.u_measured = v;
        }
        UpdateChange::NONE
    }

    pub fn inverse(&self, u: &SensorUpdate) -> SensorUpdate {
        SensorUpdate {
            id: u.id,
            u_sigma: u.u_sigma.map(|_| self.u_sigma),
            u_measured: u.u_measured.map(|_| self.u_measured),
            ..Default::default()
        }
    }
}

impl SymPowerSensor {
    pub fn apply(&mut self, u: &SensorUpdate) -> UpdateChange {
        if let Some(v) = u.power_sigma {
            self.power_sigma = v;
        }
        if let Some(v) = u.p_measured {
            self.p_measured = v;
        }
        if let Some(v) = u.q_measured {
            self.q_measured = v;
        }
        UpdateChange::NONE
    }

    pub fn inverse(&self, u: &SensorUpdate) -> SensorUpdate {
        SensorUpdate {
            id: u.id,
            power_sigma: u.power_sigma.map(|_| self.power_sigma),
            p_measured: u.p_measured.map(|_| self.p_measured),
            q_measured: u.q_measured.map(|_| self.q_measured),
            ..Default::default()
        }
    }
}

impl AsymVoltageSensor {
    pub fn apply(&mut self, u: &SensorUpdate) -> UpdateChange {
        if let Some(v) = u.u_sigma {
            self.u_sigma = v;
        }
        if let Some(v) = u.u_measured_asym {
            self.u_measured = v;
        }
        UpdateChange::NONE
    }

    pub fn inverse(&self, u: &SensorUpdate) -> SensorUpdate {
        SensorUpdate {
            id: u.id,
            u_sigma: u.u_sigma.map(|_| self.u_sigma),
            u_measured_asym: u.u_measured_asym.map(|_| self.u_measured),
            ..Default::default()
        }
    }
}

impl AsymPowerSensor {
    pub fn apply(&mut self, u: &SensorUpdate) -> UpdateChange {
        if let Some(v) = u.power_sigma {
            self.power_sigma = v;
        }
        if let Some(v) = u.p_measured_asym {
            self.p_measured = v;
        }
        if let Some(v) = u.q_measured_asym {
            self.q_measured = v;
        }
        UpdateChange::NONE
    }

    pub fn inverse(&self, u: &SensorUpdate) -> SensorUpdate {
        SensorUpdate {
            id: u.id,
            power_sigma: u.power_sigma.map(|_| self.power_sigma),
            p_measured_asym: u.p_measured_asym.map(|_| self.p_measured),
            q_measured_asym: u.q_measured_asym.map(|_| self.q_measured),
            ..Default::default()
        }
    }
}

impl CurrentSensor {
    pub fn apply(&mut self, u: &SensorUpdate) -> UpdateChange {
        if let Some(v) = u.current_sigma {
            self.current_sigma = v;
        }
        if let Some(v) = u.i_measured {
            self.i_measured = v;
        }
        if let Some(v) = u.i_angle_measured {
            self.i_angle_measured = v;
        }
        UpdateChange::NONE
    }

    pub fn inverse(&self, u: &SensorUpdate) -> SensorUpdate {
        SensorUpdate {
            id: u.id,
            current_sigma: u.current_sigma.map(|_| self.current_sigma),
            i_measured: u.i_measured.map(|_| self.i_measured),
            i_angle_measured: u.i_angle_measured.map(|_| self.i_angle_measured),
            ..Default::default()
        }
    }
}

/// Output record for a voltage sensor: the state-estimation residual
/// between measured and estimated voltage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoltageSensorOutput {
    pub id: ID,
    pub energized: bool,
    pub u_residual: f64,
    pub u_angle_residual: f64,
}

/// Output record for a power/current sensor residual.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerSensorOutput {
    pub id: ID,
    pub energized: bool,
    pub p_residual: f64,
    pub q_residual: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_update_never_invalidates_topology() {
        let mut sensor = SymPowerSensor {
            id: 20,
            measured_object: 7,
            measured_terminal_type: MeasuredTerminalType::Load,
            power_sigma: 1.0,
            p_measured: 100.0,
            q_measured: 10.0,
        };
        let change = sensor.apply(&SensorUpdate {
            id: 20,
            p_measured: Some(200.0),
            ..Default::default()
        });
        assert_eq!(change, UpdateChange::NONE);
        assert_eq!(sensor.p_measured, 200.0);
    }
}
