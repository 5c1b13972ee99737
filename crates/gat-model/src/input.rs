//! The Input Preparer: turns an input-shape [`Dataset`] into a frozen
//! [`ComponentStore`], then (per calculation kind and symmetry) walks the
//! component coupling to fill per-island solver input records.
//!
//! Grounded on `main_core/input.hpp`'s per-component construction pass and
//! `math_solver/*_solver.hpp`'s per-island input assembly, simplified to
//! the one linear power-flow strategy this engine implements (see
//! [`crate::calculate`]).

use std::collections::HashMap;

use gat_core::component::{
    AsymLoad, Component, ComponentKind, Fault, FaultPhase, FaultType, Line, Link, LoadGenType, Node,
    RegulatedObjectKind, Shunt, Source, SymLoad, TapChangingStrategy, TransformerTapRegulator, TransformerTapSide,
    WindingConnection,
};
use gat_core::component::{
    AsymPowerSensor, AsymVoltageSensor, CurrentSensor, MeasuredTerminalType, SymPowerSensor, SymVoltageSensor,
};
use gat_core::component::{ThreeWindingTransformer, Transformer};
use gat_core::error::GatError;
use gat_core::ids::ID;
use gat_core::store::ComponentStore;
use gat_io::dataset::{AttrValue, Dataset, ElementRecord};
use num_complex::Complex64;

fn req_id(record: &ElementRecord) -> Result<ID, GatError> {
    record
        .get("id")
        .and_then(|v| v.as_i32())
        .ok_or_else(|| GatError::DatasetError("input element missing `id`".into()))
}

fn req_i32(record: &ElementRecord, key: &str) -> Result<i32, GatError> {
    record
        .get(key)
        .and_then(|v| v.as_i32())
        .ok_or_else(|| GatError::DatasetError(format!("input element missing `{key}`")))
}

fn req_f64(record: &ElementRecord, key: &str) -> Result<f64, GatError> {
    match record.get(key) {
        Some(v) if !v.as_f64().is_nan() => Ok(v.as_f64()),
        _ => Err(GatError::DatasetError(format!("input element missing `{key}`"))),
    }
}

fn req_bool(record: &ElementRecord, key: &str) -> Result<bool, GatError> {
    Ok(req_i32(record, key)? != 0)
}

fn opt_f64(record: &ElementRecord, key: &str) -> Option<f64> {
    record.get(key).map(|v| v.as_f64()).filter(|v| !v.is_nan())
}

fn opt_i32(record: &ElementRecord, key: &str) -> Option<i32> {
    record.get(key).and_then(|v| v.as_i32())
}

fn opt_u8(record: &ElementRecord, key: &str) -> Option<u8> {
    opt_i32(record, key).map(|v| v as u8)
}

fn opt_bool(record: &ElementRecord, key: &str) -> Option<bool> {
    opt_i32(record, key).map(|v| v != 0)
}

fn opt_double3(record: &ElementRecord, key: &str) -> Option<[f64; 3]> {
    match record.get(key) {
        Some(AttrValue::Double3(v)) => Some(*v),
        _ => None,
    }
}

fn winding_connection(tag: i32) -> WindingConnection {
    match tag {
        1 => WindingConnection::WyeGrounded,
        2 => WindingConnection::Delta,
        _ => WindingConnection::Wye,
    }
}

fn tap_side(tag: i32) -> TransformerTapSide {
    match tag {
        1 => TransformerTapSide::ToSide,
        _ => TransformerTapSide::FromSide,
    }
}

fn load_gen_type(tag: i32) -> LoadGenType {
    match tag {
        1 => LoadGenType::ConstImpedance,
        2 => LoadGenType::ConstCurrent,
        _ => LoadGenType::ConstPower,
    }
}

fn measured_terminal_type(tag: i32) -> MeasuredTerminalType {
    match tag {
        0 => MeasuredTerminalType::BranchFrom,
        1 => MeasuredTerminalType::BranchTo,
        2 => MeasuredTerminalType::Source,
        3 => MeasuredTerminalType::Shunt,
        4 => MeasuredTerminalType::Load,
        5 => MeasuredTerminalType::Generator,
        6 => MeasuredTerminalType::Branch3_1,
        7 => MeasuredTerminalType::Branch3_2,
        8 => MeasuredTerminalType::Branch3_3,
        _ => MeasuredTerminalType::Node,
    }
}

fn fault_type(tag: i32) -> FaultType {
    match tag {
        1 => FaultType::SinglePhaseToGround,
        2 => FaultType::TwoPhase,
        3 => FaultType::TwoPhaseToGround,
        _ => FaultType::ThreePhase,
    }
}

fn fault_phase(tag: i32) -> FaultPhase {
    match tag {
        0 => FaultPhase::A,
        1 => FaultPhase::B,
        2 => FaultPhase::C,
        4 => FaultPhase::None,
        _ => FaultPhase::Default,
    }
}

fn regulated_object_kind(tag: i32) -> RegulatedObjectKind {
    match tag {
        1 => RegulatedObjectKind::ThreeWindingTransformer,
        _ => RegulatedObjectKind::Transformer,
    }
}

fn tap_changing_strategy(tag: i32) -> TapChangingStrategy {
    match tag {
        1 => TapChangingStrategy::AnyValidTap,
        2 => TapChangingStrategy::MinVoltage,
        3 => TapChangingStrategy::MaxVoltage,
        4 => TapChangingStrategy::FastAnyTap,
        _ => TapChangingStrategy::Disabled,
    }
}

/// Build a frozen [`ComponentStore`] from an input-shape dataset. Every
/// permitted kind's single scenario (`batch_size == 1` for an input
/// dataset) is walked in [`ComponentKind::ALL`] order so construction order
/// is deterministic across runs of the same dataset.
pub fn build_store(input_data: &Dataset) -> Result<ComponentStore, GatError> {
    let mut store = ComponentStore::new();
    for kind in ComponentKind::ALL {
        let Ok(span) = input_data.get_span(kind, 0) else { continue };
        store.reserve(kind, span.len());
        for record in span {
            store.emplace(row_to_component(kind, record)?)?;
        }
    }
    store.set_construction_complete();
    Ok(store)
}

fn row_to_component(kind: ComponentKind, record: &ElementRecord) -> Result<Component, GatError> {
    let id = req_id(record)?;
    Ok(match kind {
        ComponentKind::Node => Component::Node(Node {
            id,
            u_rated: req_f64(record, "u_rated")?,
        }),
        ComponentKind::Line => Component::Line(Line {
            id,
            from_node: req_i32(record, "from_node")?,
            to_node: req_i32(record, "to_node")?,
            from_status: req_bool(record, "from_status")?,
            to_status: req_bool(record, "to_status")?,
            r1: req_f64(record, "r1")?,
            x1: req_f64(record, "x1")?,
            c1: req_f64(record, "c1")?,
            tan1: req_f64(record, "tan1")?,
            r0: opt_f64(record, "r0"),
            x0: opt_f64(record, "x0"),
            c0: opt_f64(record, "c0"),
            tan0: opt_f64(record, "tan0"),
            i_n: opt_f64(record, "i_n"),
        }),
        ComponentKind::Link => Component::Link(Link {
            id,
            from_node: req_i32(record, "from_node")?,
            to_node: req_i32(record, "to_node")?,
            from_status: req_bool(record, "from_status")?,
            to_status: req_bool(record, "to_status")?,
        }),
        ComponentKind::Transformer => Component::Transformer(Transformer {
            id,
            from_node: req_i32(record, "from_node")?,
            to_node: req_i32(record, "to_node")?,
            from_status: req_bool(record, "from_status")?,
            to_status: req_bool(record, "to_status")?,
            u1: req_f64(record, "u1")?,
            u2: req_f64(record, "u2")?,
            sn: req_f64(record, "sn")?,
            uk: req_f64(record, "uk")?,
            pk: req_f64(record, "pk")?,
            i0: opt_f64(record, "i0").unwrap_or(0.0),
            p0: opt_f64(record, "p0").unwrap_or(0.0),
            winding_from: winding_connection(opt_i32(record, "winding_from").unwrap_or(1)),
            winding_to: winding_connection(opt_i32(record, "winding_to").unwrap_or(1)),
            clock: opt_u8(record, "clock").unwrap_or(0),
            tap_side: tap_side(opt_i32(record, "tap_side").unwrap_or(0)),
            tap_pos: opt_i32(record, "tap_pos").unwrap_or(0),
            tap_min: opt_i32(record, "tap_min").unwrap_or(0),
            tap_max: opt_i32(record, "tap_max").unwrap_or(0),
            tap_nom: opt_i32(record, "tap_nom").unwrap_or(0),
            tap_size: opt_f64(record, "tap_size").unwrap_or(0.0),
        }),
        ComponentKind::ThreeWindingTransformer => Component::ThreeWindingTransformer(ThreeWindingTransformer {
            id,
            node_1: req_i32(record, "node_1")?,
            node_2: req_i32(record, "node_2")?,
            node_3: req_i32(record, "node_3")?,
            status_1: req_bool(record, "status_1")?,
            status_2: req_bool(record, "status_2")?,
            status_3: req_bool(record, "status_3")?,
            u1: req_f64(record, "u1")?,
            u2: req_f64(record, "u2")?,
            u3: req_f64(record, "u3")?,
            sn_1: req_f64(record, "sn_1")?,
            sn_2: req_f64(record, "sn_2")?,
            sn_3: req_f64(record, "sn_3")?,
            uk_12: req_f64(record, "uk_12")?,
            uk_13: req_f64(record, "uk_13")?,
            uk_23: req_f64(record, "uk_23")?,
            pk_12: req_f64(record, "pk_12")?,
            pk_13: req_f64(record, "pk_13")?,
            pk_23: req_f64(record, "pk_23")?,
            i0: opt_f64(record, "i0").unwrap_or(0.0),
            p0: opt_f64(record, "p0").unwrap_or(0.0),
            winding_1: winding_connection(opt_i32(record, "winding_1").unwrap_or(1)),
            winding_2: winding_connection(opt_i32(record, "winding_2").unwrap_or(1)),
            winding_3: winding_connection(opt_i32(record, "winding_3").unwrap_or(1)),
            clock_12: opt_u8(record, "clock_12").unwrap_or(0),
            clock_13: opt_u8(record, "clock_13").unwrap_or(0),
            tap_side: tap_side(opt_i32(record, "tap_side").unwrap_or(0)),
            tap_pos: opt_i32(record, "tap_pos").unwrap_or(0),
            tap_min: opt_i32(record, "tap_min").unwrap_or(0),
            tap_max: opt_i32(record, "tap_max").unwrap_or(0),
            tap_nom: opt_i32(record, "tap_nom").unwrap_or(0),
            tap_size: opt_f64(record, "tap_size").unwrap_or(0.0),
        }),
        ComponentKind::Source => Component::Source(Source {
            id,
            node: req_i32(record, "node")?,
            status: req_bool(record, "status")?,
            u_ref: opt_f64(record, "u_ref").unwrap_or(1.0),
            u_ref_angle: opt_f64(record, "u_ref_angle").unwrap_or(0.0),
            sk: opt_f64(record, "sk"),
            rx_ratio: opt_f64(record, "rx_ratio"),
            z01_ratio: opt_f64(record, "z01_ratio"),
        }),
        ComponentKind::SymLoad => Component::SymLoad(SymLoad {
            id,
            node: req_i32(record, "node")?,
            status: req_bool(record, "status")?,
            load_gen_type: load_gen_type(opt_i32(record, "type").unwrap_or(0)),
            p_specified: req_f64(record, "p_specified")?,
            q_specified: req_f64(record, "q_specified")?,
        }),
        ComponentKind::AsymLoad => Component::AsymLoad(AsymLoad {
            id,
            node: req_i32(record, "node")?,
            status: req_bool(record, "status")?,
            load_gen_type: load_gen_type(opt_i32(record, "type").unwrap_or(0)),
            p_specified: opt_double3(record, "p_specified").ok_or_else(|| {
                GatError::DatasetError(format!("asym_load {id} missing `p_specified`"))
            })?,
            q_specified: opt_double3(record, "q_specified").ok_or_else(|| {
                GatError::DatasetError(format!("asym_load {id} missing `q_specified`"))
            })?,
        }),
        ComponentKind::Shunt => Component::Shunt(Shunt {
            id,
            node: req_i32(record, "node")?,
            status: req_bool(record, "status")?,
            g1: req_f64(record, "g1")?,
            b1: req_f64(record, "b1")?,
            g0: opt_f64(record, "g0"),
            b0: opt_f64(record, "b0"),
        }),
        ComponentKind::SymVoltageSensor => Component::SymVoltageSensor(SymVoltageSensor {
            id,
            measured_object: req_i32(record, "measured_object")?,
            u_sigma: req_f64(record, "u_sigma")?,
            u_measured: req_f64(record, "u_measured")?,
            u_angle_measured: opt_f64(record, "u_angle_measured"),
        }),
        ComponentKind::AsymVoltageSensor => Component::AsymVoltageSensor(AsymVoltageSensor {
            id,
            measured_object: req_i32(record, "measured_object")?,
            u_sigma: req_f64(record, "u_sigma")?,
            u_measured: opt_double3(record, "u_measured").ok_or_else(|| {
                GatError::DatasetError(format!("asym_voltage_sensor {id} missing `u_measured`"))
            })?,
            u_angle_measured: opt_double3(record, "u_angle_measured"),
        }),
        ComponentKind::SymPowerSensor => Component::SymPowerSensor(SymPowerSensor {
            id,
            measured_object: req_i32(record, "measured_object")?,
            measured_terminal_type: measured_terminal_type(req_i32(record, "measured_terminal_type")?),
            power_sigma: req_f64(record, "power_sigma")?,
            p_measured: req_f64(record, "p_measured")?,
            q_measured: req_f64(record, "q_measured")?,
        }),
        ComponentKind::AsymPowerSensor => Component::AsymPowerSensor(AsymPowerSensor {
            id,
            measured_object: req_i32(record, "measured_object")?,
            measured_terminal_type: measured_terminal_type(req_i32(record, "measured_terminal_type")?),
            power_sigma: req_f64(record, "power_sigma")?,
            p_measured: opt_double3(record, "p_measured").ok_or_else(|| {
                GatError::DatasetError(format!("asym_power_sensor {id} missing `p_measured`"))
            })?,
            q_measured: opt_double3(record, "q_measured").ok_or_else(|| {
                GatError::DatasetError(format!("asym_power_sensor {id} missing `q_measured`"))
            })?,
        }),
        ComponentKind::CurrentSensor => Component::CurrentSensor(CurrentSensor {
            id,
            measured_object: req_i32(record, "measured_object")?,
            measured_terminal_type: measured_terminal_type(req_i32(record, "measured_terminal_type")?),
            current_sigma: req_f64(record, "current_sigma")?,
            i_measured: req_f64(record, "i_measured")?,
            i_angle_measured: req_f64(record, "i_angle_measured")?,
        }),
        ComponentKind::Fault => Component::Fault(Fault {
            id,
            status: req_bool(record, "status")?,
            fault_type: fault_type(opt_i32(record, "fault_type").unwrap_or(0)),
            fault_phase: fault_phase(opt_i32(record, "fault_phase").unwrap_or(3)),
            fault_object: opt_i32(record, "fault_object"),
            r_f: opt_f64(record, "r_f").unwrap_or(0.0),
            x_f: opt_f64(record, "x_f").unwrap_or(0.0),
        }),
        ComponentKind::TransformerTapRegulator => Component::TransformerTapRegulator(TransformerTapRegulator {
            id,
            regulated_object: req_i32(record, "regulated_object")?,
            regulated_object_kind: regulated_object_kind(opt_i32(record, "regulated_object_kind").unwrap_or(0)),
            status: req_bool(record, "status")?,
            control_side: opt_u8(record, "control_side").unwrap_or(0),
            u_set: req_f64(record, "u_set")?,
            u_band: req_f64(record, "u_band")?,
            line_drop_compensation_r: opt_f64(record, "line_drop_compensation_r").unwrap_or(0.0),
            line_drop_compensation_x: opt_f64(record, "line_drop_compensation_x").unwrap_or(0.0),
        }),
    })
}

/// Per-island power-flow input: a fixed complex voltage at the slack bus and
/// a net complex power injection (generation positive, load negative) at
/// every other bus, assembled by walking the closed sources, loads, and
/// shunts coupled into that island.
#[derive(Debug, Clone)]
pub struct PowerFlowIslandInput {
    pub n_bus: usize,
    pub slack_bus: usize,
    pub slack_voltage: Complex64,
    pub s_bus: Vec<Complex64>,
}

/// Fill one [`PowerFlowIslandInput`] per island (power-flow, 4.7's first
/// bullet). Isolated components (coupling `Idx2D::NONE`) are skipped, as is
/// any component whose status is open.
pub fn prepare_power_flow_input(
    store: &ComponentStore,
    comp_topo: &gat_core::topology::ComponentTopology,
    islands: &[gat_core::topology::MathTopology],
) -> Vec<PowerFlowIslandInput> {
    let mut inputs: Vec<PowerFlowIslandInput> = islands
        .iter()
        .map(|island| PowerFlowIslandInput {
            n_bus: island.n_node,
            slack_bus: island.slack_bus as usize,
            slack_voltage: Complex64::new(1.0, 0.0),
            s_bus: vec![Complex64::new(0.0, 0.0); island.n_node],
        })
        .collect();

    for component in store.iter(ComponentKind::Source) {
        let Component::Source(source) = component else { continue };
        if !source.status {
            continue;
        }
        let Some(coord) = comp_topo.coupling.get(&source.id) else { continue };
        if coord.is_none() {
            continue;
        }
        if let Some(input) = inputs.get_mut(coord.group as usize) {
            input.slack_voltage = Complex64::from_polar(source.u_ref, source.u_ref_angle);
        }
    }

    let mut accumulate = |node: ID, id: ID, s: Complex64| {
        let Some(coord) = comp_topo.coupling.get(&id) else { return };
        if coord.is_none() {
            return;
        }
        let Some(&pos) = comp_topo.node_positions.get(&node) else { return };
        if let Some(input) = inputs.get_mut(coord.group as usize) {
            input.s_bus[pos as usize] -= s;
        }
    };

    for component in store.iter(ComponentKind::SymLoad) {
        let Component::SymLoad(load) = component else { continue };
        if load.status && load.load_gen_type != LoadGenType::ConstImpedance {
            accumulate(load.node, load.id, Complex64::new(load.p_specified, load.q_specified));
        }
        // A constant-impedance load's admittance is stamped directly into
        // the Y-bus diagonal (see `gat_core::mathstate`); injecting it here
        // too would double-count it.
    }
    for component in store.iter(ComponentKind::AsymLoad) {
        let Component::AsymLoad(load) = component else { continue };
        if load.status && load.load_gen_type != LoadGenType::ConstImpedance {
            let p: f64 = load.p_specified.iter().sum();
            let q: f64 = load.q_specified.iter().sum();
            accumulate(load.node, load.id, Complex64::new(p, q));
        }
    }
    for component in store.iter(ComponentKind::Shunt) {
        let Component::Shunt(shunt) = component else { continue };
        if shunt.status {
            // A shunt's own admittance is already stamped into the Y-bus;
            // it contributes no separate injection here.
            let _ = shunt;
        }
    }

    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use gat_core::component::ComponentKind;
    use gat_io::dataset::{AttrValue, Dataset};

    fn row(pairs: &[(&str, AttrValue)]) -> ElementRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn build_store_constructs_node_and_line() {
        let mut ds = Dataset::new(false, 1);
        ds.add_buffer(
            ComponentKind::Node,
            2,
            2,
            None,
            vec![
                row(&[("id", AttrValue::Int32(1)), ("u_rated", AttrValue::Double(10_000.0))]),
                row(&[("id", AttrValue::Int32(2)), ("u_rated", AttrValue::Double(10_000.0))]),
            ],
        )
        .unwrap();
        ds.add_buffer(
            ComponentKind::Line,
            1,
            1,
            None,
            vec![row(&[
                ("id", AttrValue::Int32(3)),
                ("from_node", AttrValue::Int32(1)),
                ("to_node", AttrValue::Int32(2)),
                ("from_status", AttrValue::Int8(1)),
                ("to_status", AttrValue::Int8(1)),
                ("r1", AttrValue::Double(1.0)),
                ("x1", AttrValue::Double(1.0)),
                ("c1", AttrValue::Double(0.0)),
                ("tan1", AttrValue::Double(0.0)),
            ])],
        )
        .unwrap();

        let store = build_store(&ds).unwrap();
        assert_eq!(store.count(ComponentKind::Node), 2);
        assert_eq!(store.count(ComponentKind::Line), 1);
    }

    #[test]
    fn missing_required_field_is_dataset_error() {
        let mut ds = Dataset::new(false, 1);
        ds.add_buffer(
            ComponentKind::Node,
            1,
            1,
            None,
            vec![row(&[("id", AttrValue::Int32(1))])],
        )
        .unwrap();
        let err = build_store(&ds).unwrap_err();
        assert!(matches!(err, GatError::DatasetError(_)));
    }
}
