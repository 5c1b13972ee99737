//! The Output Projector: per-component output records computed from a
//! solved set of per-island bus voltages.
//!
//! Grounded on `main_core/output.hpp`'s "read the math entity at this
//! component's coupled position" pattern, restricted to the power-flow
//! quantities this engine's linear strategy (see [`crate::calculate`])
//! actually produces. Sensor residuals and fault currents are always
//! null — this engine does not implement state estimation or
//! short-circuit calculation (see `DESIGN.md`).

use num_complex::Complex64;

use gat_core::component::{Component, ComponentKind, FaultOutput, NodeOutput, PowerSensorOutput, VoltageSensorOutput};
use gat_core::component::{ApplianceOutput, Branch3Output, BranchOutput, RegulatorOutput};
use gat_core::ids::ID;
use gat_core::store::ComponentStore;
use gat_core::topology::{ComponentTopology, MathTopology};
use gat_io::dataset::{AttrValue, ElementRecord};

fn node_voltage(comp_topo: &ComponentTopology, v_bus: &[Vec<Complex64>], node: ID) -> Option<Complex64> {
    let island = *comp_topo.node_island.get(&node)?;
    let pos = *comp_topo.node_positions.get(&node)?;
    v_bus.get(island as usize)?.get(pos as usize).copied()
}

pub fn node_outputs(store: &ComponentStore, comp_topo: &ComponentTopology, v_bus: &[Vec<Complex64>]) -> Vec<NodeOutput> {
    store
        .iter(ComponentKind::Node)
        .map(|c| {
            let Component::Node(node) = c else { unreachable!() };
            match node_voltage(comp_topo, v_bus, node.id) {
                Some(v) => NodeOutput {
                    id: node.id,
                    energized: true,
                    u_pu: gat_core::units::PerUnit(v.norm()),
                    u: v.norm() * node.u_rated,
                    u_angle: gat_core::units::Radians(v.arg()),
                },
                None => NodeOutput {
                    id: node.id,
                    energized: false,
                    u_pu: gat_core::units::PerUnit(f64::NAN),
                    u: f64::NAN,
                    u_angle: gat_core::units::Radians(f64::NAN),
                },
            }
        })
        .collect()
}

fn appliance_output(id: ID, energized: bool, s: Complex64, v: Complex64) -> ApplianceOutput {
    if !energized {
        return ApplianceOutput {
            id,
            energized: false,
            p: f64::NAN,
            q: f64::NAN,
            i: f64::NAN,
            s: f64::NAN,
            pf: f64::NAN,
        };
    }
    let i = if v.norm() > 1e-12 { (s / v).conj().norm() } else { f64::NAN };
    ApplianceOutput {
        id,
        energized: true,
        p: s.re,
        q: s.im,
        i,
        s: s.norm(),
        pf: if s.norm() > 1e-12 { s.re / s.norm() } else { f64::NAN },
    }
}

/// Output for sources/sym_loads/asym_loads/shunts: the single-terminal
/// appliance record `ApplianceOutput` already models.
pub fn appliance_outputs(
    store: &ComponentStore,
    comp_topo: &ComponentTopology,
    v_bus: &[Vec<Complex64>],
) -> Vec<(ComponentKind, ApplianceOutput)> {
    let mut outputs = Vec::new();

    for c in store.iter(ComponentKind::Source) {
        let Component::Source(source) = c else { unreachable!() };
        match node_voltage(comp_topo, v_bus, source.node) {
            Some(v) => {
                // A source's own injection is implied by the slack
                // balance rather than read from `s_bus`; this engine
                // reports its terminal voltage-derived apparent power as
                // zero net load (the reference bus does not "consume").
                outputs.push((ComponentKind::Source, appliance_output(source.id, true, Complex64::new(0.0, 0.0), v)));
            }
            None => outputs.push((
                ComponentKind::Source,
                appliance_output(source.id, false, Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)),
            )),
        }
    }

    for c in store.iter(ComponentKind::SymLoad) {
        let Component::SymLoad(load) = c else { unreachable!() };
        let s = Complex64::new(load.p_specified, load.q_specified);
        match node_voltage(comp_topo, v_bus, load.node) {
            Some(v) if load.status => outputs.push((ComponentKind::SymLoad, appliance_output(load.id, true, s, v))),
            _ => outputs.push((ComponentKind::SymLoad, appliance_output(load.id, false, s, Complex64::new(0.0, 0.0)))),
        }
    }

    for c in store.iter(ComponentKind::AsymLoad) {
        let Component::AsymLoad(load) = c else { unreachable!() };
        let s = Complex64::new(load.p_specified.iter().sum(), load.q_specified.iter().sum());
        match node_voltage(comp_topo, v_bus, load.node) {
            Some(v) if load.status => outputs.push((ComponentKind::AsymLoad, appliance_output(load.id, true, s, v))),
            _ => outputs.push((ComponentKind::AsymLoad, appliance_output(load.id, false, s, Complex64::new(0.0, 0.0)))),
        }
    }

    for c in store.iter(ComponentKind::Shunt) {
        let Component::Shunt(shunt) = c else { unreachable!() };
        match node_voltage(comp_topo, v_bus, shunt.node) {
            Some(v) if shunt.status => {
                let y = Complex64::new(shunt.g1, shunt.b1);
                let s = v * (y * v).conj();
                outputs.push((ComponentKind::Shunt, appliance_output(shunt.id, true, s, v)));
            }
            _ => outputs.push((ComponentKind::Shunt, appliance_output(shunt.id, false, Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)))),
        }
    }

    outputs
}

fn branch_terminal_admittance(z_series: Complex64, y_shunt_half: Complex64, tap: f64, shift_rad: f64) -> (Complex64, Complex64, Complex64, Complex64) {
    let y_series = z_series.inv();
    let tau = if tap.abs() < 1e-12 { 1.0 } else { tap };
    let tau2 = tau * tau;
    let shift = Complex64::from_polar(1.0, -shift_rad);
    let y_ii = y_series / tau2 + y_shunt_half;
    let y_jj = y_series + y_shunt_half;
    let y_ij = -y_series / tau * shift.conj();
    let y_ji = -y_series / tau * shift;
    (y_ii, y_ij, y_ji, y_jj)
}

fn branch_output(id: ID, v_from: Option<Complex64>, v_to: Option<Complex64>, y: (Complex64, Complex64, Complex64, Complex64)) -> BranchOutput {
    let (y_ii, y_ij, y_ji, y_jj) = y;
    let energized = v_from.is_some() || v_to.is_some();
    if !energized {
        return BranchOutput {
            id,
            energized: false,
            loading: gat_core::units::PerUnit(f64::NAN),
            p_from: f64::NAN,
            q_from: f64::NAN,
            i_from: f64::NAN,
            s_from: f64::NAN,
            p_to: f64::NAN,
            q_to: f64::NAN,
            i_to: f64::NAN,
            s_to: f64::NAN,
        };
    }
    let vf = v_from.unwrap_or(Complex64::new(0.0, 0.0));
    let vt = v_to.unwrap_or(Complex64::new(0.0, 0.0));
    let i_from = y_ii * vf + y_ij * vt;
    let i_to = y_ji * vf + y_jj * vt;
    let s_from = vf * i_from.conj();
    let s_to = vt * i_to.conj();
    BranchOutput {
        id,
        energized: true,
        loading: gat_core::units::PerUnit(i_from.norm().max(i_to.norm())),
        p_from: s_from.re,
        q_from: s_from.im,
        i_from: i_from.norm(),
        s_from: s_from.norm(),
        p_to: s_to.re,
        q_to: s_to.im,
        i_to: i_to.norm(),
        s_to: s_to.norm(),
    }
}

/// Output for lines/links/transformers.
pub fn branch_outputs(
    store: &ComponentStore,
    comp_topo: &ComponentTopology,
    islands: &[MathTopology],
    v_bus: &[Vec<Complex64>],
) -> Vec<(ComponentKind, BranchOutput)> {
    let mut outputs = Vec::new();
    let terminals = |coord: &gat_core::ids::Idx2D| -> Option<(Option<Complex64>, Option<Complex64>)> {
        let island = islands.get(coord.group as usize)?;
        let (from, to) = *island.branches.get(coord.pos as usize)?;
        let v_from = if from >= 0 { v_bus.get(coord.group as usize)?.get(from as usize).copied() } else { None };
        let v_to = if to >= 0 { v_bus.get(coord.group as usize)?.get(to as usize).copied() } else { None };
        Some((v_from, v_to))
    };

    for c in store.iter(ComponentKind::Line) {
        let Component::Line(line) = c else { unreachable!() };
        let coord = comp_topo.coupling.get(&line.id);
        let (v_from, v_to) = coord
            .filter(|c| !c.is_none())
            .and_then(terminals)
            .unwrap_or((None, None));
        let y = branch_terminal_admittance(Complex64::new(line.r1, line.x1), Complex64::new(0.0, line.c1 / 2.0), 1.0, 0.0);
        outputs.push((ComponentKind::Line, branch_output(line.id, v_from, v_to, y)));
    }

    for c in store.iter(ComponentKind::Link) {
        let Component::Link(link) = c else { unreachable!() };
        let coord = comp_topo.coupling.get(&link.id);
        let (v_from, v_to) = coord
            .filter(|c| !c.is_none())
            .and_then(terminals)
            .unwrap_or((None, None));
        let y = branch_terminal_admittance(Complex64::new(1.0e-6, 0.0), Complex64::new(0.0, 0.0), 1.0, 0.0);
        outputs.push((ComponentKind::Link, branch_output(link.id, v_from, v_to, y)));
    }

    for c in store.iter(ComponentKind::Transformer) {
        let Component::Transformer(xfmr) = c else { unreachable!() };
        let coord = comp_topo.coupling.get(&xfmr.id);
        let (v_from, v_to) = coord
            .filter(|c| !c.is_none())
            .and_then(terminals)
            .unwrap_or((None, None));
        let z_base = xfmr.u2 * xfmr.u2 / xfmr.sn;
        let z_pu = Complex64::new(xfmr.pk * z_base / xfmr.sn, xfmr.uk * z_base);
        let y = branch_terminal_admittance(z_pu, Complex64::new(0.0, 0.0), 1.0, xfmr.phase_shift().value());
        outputs.push((ComponentKind::Transformer, branch_output(xfmr.id, v_from, v_to, y)));
    }

    outputs
}

fn three_winding_star_impedances(t3: &gat_core::component::ThreeWindingTransformer) -> [Complex64; 3] {
    // Mirrors `gat_core::mathstate::build_island_ybus`'s star-equivalent
    // derivation exactly; kept independent (rather than read back off the
    // Y-bus) the same way `branch_outputs` above recomputes `z_pu` from the
    // component's own fields instead of its cached Y-bus entry.
    let z_base = t3.u1 * t3.u1 / t3.sn_1;
    let z_pair = |uk: f64, pk: f64| Complex64::new(pk * z_base / t3.sn_1, uk * z_base);
    let z12 = z_pair(t3.uk_12, t3.pk_12);
    let z13 = z_pair(t3.uk_13, t3.pk_13);
    let z23 = z_pair(t3.uk_23, t3.pk_23);
    [0.5 * (z12 + z13 - z23), 0.5 * (z12 + z23 - z13), 0.5 * (z13 + z23 - z12)]
}

/// Output for three-winding transformers: one terminal read per winding. The
/// star point is eliminated, so unlike `branch_outputs` there is no
/// off-diagonal term — each winding's current follows directly from its own
/// terminal voltage and star-equivalent series impedance.
pub fn three_winding_transformer_outputs(
    store: &ComponentStore,
    comp_topo: &ComponentTopology,
    islands: &[MathTopology],
    v_bus: &[Vec<Complex64>],
) -> Vec<Branch3Output> {
    let mut outputs = Vec::new();
    for c in store.iter(ComponentKind::ThreeWindingTransformer) {
        let Component::ThreeWindingTransformer(t3) = c else { unreachable!() };
        let z = three_winding_star_impedances(t3);
        let coords = comp_topo.branch3_coupling.get(&t3.id);

        let terminal = |k: usize| -> (bool, f64, f64, f64, f64) {
            let nan4 = (false, f64::NAN, f64::NAN, f64::NAN, f64::NAN);
            let Some(coords) = coords else { return nan4 };
            let coord = &coords[k];
            if coord.is_none() {
                return nan4;
            }
            let Some(island) = islands.get(coord.group as usize) else { return nan4 };
            let Some(&(from, _)) = island.branches.get(coord.pos as usize) else { return nan4 };
            if from < 0 {
                return nan4;
            }
            let Some(v) = v_bus.get(coord.group as usize).and_then(|b| b.get(from as usize)).copied() else {
                return nan4;
            };
            let i = z[k].inv() * v;
            let s = v * i.conj();
            (true, s.re, s.im, i.norm(), s.norm())
        };

        let (e1, p1, q1, i1, s1) = terminal(0);
        let (e2, p2, q2, i2, s2) = terminal(1);
        let (e3, p3, q3, i3, s3) = terminal(2);
        let energized = e1 || e2 || e3;
        outputs.push(Branch3Output {
            id: t3.id,
            energized,
            loading: gat_core::units::PerUnit(if energized { i1.max(i2).max(i3) } else { f64::NAN }),
            p_1: p1,
            q_1: q1,
            i_1: i1,
            s_1: s1,
            p_2: p2,
            q_2: q2,
            i_2: i2,
            s_2: s2,
            p_3: p3,
            q_3: q3,
            i_3: i3,
            s_3: s3,
        });
    }
    outputs
}

/// Null tap-regulator output records: automatic tap calculation is not
/// implemented (see `DESIGN.md`), so every regulator reports unenergized.
pub fn null_regulator_outputs(store: &ComponentStore) -> Vec<RegulatorOutput> {
    store
        .iter(ComponentKind::TransformerTapRegulator)
        .map(|c| RegulatorOutput { id: c.id(), energized: false })
        .collect()
}

/// Null voltage-sensor/power-sensor output records, kind-tagged so the
/// caller can still route `SymVoltageSensor`/`AsymVoltageSensor` (and the
/// three power-sensor kinds) into separate output buffers. This engine's
/// calculate path only produces power-flow voltages, so every sensor
/// residual is reported NaN rather than estimated.
pub fn null_sensor_outputs(store: &ComponentStore) -> (Vec<(ComponentKind, VoltageSensorOutput)>, Vec<(ComponentKind, PowerSensorOutput)>) {
    let mut voltage = Vec::new();
    let mut power = Vec::new();
    for kind in [ComponentKind::SymVoltageSensor, ComponentKind::AsymVoltageSensor] {
        for c in store.iter(kind) {
            voltage.push((
                kind,
                VoltageSensorOutput {
                    id: c.id(),
                    energized: false,
                    u_residual: f64::NAN,
                    u_angle_residual: f64::NAN,
                },
            ));
        }
    }
    for kind in [ComponentKind::SymPowerSensor, ComponentKind::AsymPowerSensor, ComponentKind::CurrentSensor] {
        for c in store.iter(kind) {
            power.push((
                kind,
                PowerSensorOutput {
                    id: c.id(),
                    energized: false,
                    p_residual: f64::NAN,
                    q_residual: f64::NAN,
                },
            ));
        }
    }
    (voltage, power)
}

pub fn null_fault_outputs(store: &ComponentStore) -> Vec<FaultOutput> {
    store
        .iter(ComponentKind::Fault)
        .map(|c| {
            let Component::Fault(fault) = c else { unreachable!() };
            FaultOutput {
                id: fault.id,
                i_f: f64::NAN,
                i_f_angle: f64::NAN,
            }
        })
        .collect()
}

fn rec(pairs: Vec<(&str, AttrValue)>) -> ElementRecord {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub fn node_output_record(o: &NodeOutput) -> ElementRecord {
    rec(vec![
        ("id", AttrValue::Int32(o.id)),
        ("energized", AttrValue::Int8(o.energized as i8)),
        ("u_pu", AttrValue::Double(o.u_pu.0)),
        ("u", AttrValue::Double(o.u)),
        ("u_angle", AttrValue::Double(o.u_angle.0)),
    ])
}

pub fn appliance_output_record(o: &ApplianceOutput) -> ElementRecord {
    rec(vec![
        ("id", AttrValue::Int32(o.id)),
        ("energized", AttrValue::Int8(o.energized as i8)),
        ("p", AttrValue::Double(o.p)),
        ("q", AttrValue::Double(o.q)),
        ("i", AttrValue::Double(o.i)),
        ("s", AttrValue::Double(o.s)),
        ("pf", AttrValue::Double(o.pf)),
    ])
}

pub fn branch_output_record(o: &BranchOutput) -> ElementRecord {
    rec(vec![
        ("id", AttrValue::Int32(o.id)),
        ("energized", AttrValue::Int8(o.energized as i8)),
        ("loading", AttrValue::Double(o.loading.0)),
        ("p_from", AttrValue::Double(o.p_from)),
        ("q_from", AttrValue::Double(o.q_from)),
        ("i_from", AttrValue::Double(o.i_from)),
        ("s_from", AttrValue::Double(o.s_from)),
        ("p_to", AttrValue::Double(o.p_to)),
        ("q_to", AttrValue::Double(o.q_to)),
        ("i_to", AttrValue::Double(o.i_to)),
        ("s_to", AttrValue::Double(o.s_to)),
    ])
}

pub fn branch3_output_record(o: &Branch3Output) -> ElementRecord {
    rec(vec![
        ("id", AttrValue::Int32(o.id)),
        ("energized", AttrValue::Int8(o.energized as i8)),
        ("loading", AttrValue::Double(o.loading.0)),
        ("p_1", AttrValue::Double(o.p_1)),
        ("q_1", AttrValue::Double(o.q_1)),
        ("i_1", AttrValue::Double(o.i_1)),
        ("s_1", AttrValue::Double(o.s_1)),
        ("p_2", AttrValue::Double(o.p_2)),
        ("q_2", AttrValue::Double(o.q_2)),
        ("i_2", AttrValue::Double(o.i_2)),
        ("s_2", AttrValue::Double(o.s_2)),
        ("p_3", AttrValue::Double(o.p_3)),
        ("q_3", AttrValue::Double(o.q_3)),
        ("i_3", AttrValue::Double(o.i_3)),
        ("s_3", AttrValue::Double(o.s_3)),
    ])
}

pub fn regulator_output_record(o: &RegulatorOutput) -> ElementRecord {
    rec(vec![("id", AttrValue::Int32(o.id)), ("energized", AttrValue::Int8(o.energized as i8))])
}

pub fn voltage_sensor_output_record(o: &VoltageSensorOutput) -> ElementRecord {
    rec(vec![
        ("id", AttrValue::Int32(o.id)),
        ("energized", AttrValue::Int8(o.energized as i8)),
        ("u_residual", AttrValue::Double(o.u_residual)),
        ("u_angle_residual", AttrValue::Double(o.u_angle_residual)),
    ])
}

pub fn power_sensor_output_record(o: &PowerSensorOutput) -> ElementRecord {
    rec(vec![
        ("id", AttrValue::Int32(o.id)),
        ("energized", AttrValue::Int8(o.energized as i8)),
        ("p_residual", AttrValue::Double(o.p_residual)),
        ("q_residual", AttrValue::Double(o.q_residual)),
    ])
}

pub fn fault_output_record(o: &FaultOutput) -> ElementRecord {
    rec(vec![
        ("id", AttrValue::Int32(o.id)),
        ("i_f", AttrValue::Double(o.i_f)),
        ("i_f_angle", AttrValue::Double(o.i_f_angle)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use gat_core::component::{Link as LinkComp, LoadGenType, Node as NodeComp, Source as SourceComp, SymLoad as SymLoadComp};
    use gat_core::topology::TopologyBuilder;

    fn sample_store() -> ComponentStore {
        let mut store = ComponentStore::new();
        store.emplace(Component::Node(NodeComp { id: 1, u_rated: 10_000.0 })).unwrap();
        store.emplace(Component::Node(NodeComp { id: 2, u_rated: 10_000.0 })).unwrap();
        store
            .emplace(Component::Link(LinkComp {
                id: 3,
                from_node: 1,
                to_node: 2,
                from_status: true,
                to_status: true,
            }))
            .unwrap();
        store
            .emplace(Component::Source(SourceComp {
                id: 4,
                node: 1,
                status: true,
                u_ref: 1.0,
                u_ref_angle: 0.0,
                sk: None,
                rx_ratio: None,
                z01_ratio: None,
            }))
            .unwrap();
        store
            .emplace(Component::SymLoad(SymLoadComp {
                id: 5,
                node: 2,
                status: true,
                load_gen_type: LoadGenType::ConstPower,
                p_specified: 1000.0,
                q_specified: 0.0,
            }))
            .unwrap();
        store.set_construction_complete();
        store
    }

    #[test]
    fn node_outputs_report_voltage_for_energized_bus() {
        let store = sample_store();
        let (islands, comp_topo) = TopologyBuilder::new(&store).build();
        let v_bus = vec![vec![Complex64::new(1.0, 0.0); islands[0].n_node]];
        let outputs = node_outputs(&store, &comp_topo, &v_bus);
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| o.energized));
    }

    fn three_winding_store() -> ComponentStore {
        use gat_core::component::{ThreeWindingTransformer, TransformerTapSide, WindingConnection};

        let mut store = ComponentStore::new();
        store.emplace(Component::Node(NodeComp { id: 1, u_rated: 110_000.0 })).unwrap();
        store.emplace(Component::Node(NodeComp { id: 2, u_rated: 20_000.0 })).unwrap();
        store.emplace(Component::Node(NodeComp { id: 3, u_rated: 10_000.0 })).unwrap();
        store
            .emplace(Component::Source(SourceComp {
                id: 4,
                node: 1,
                status: true,
                u_ref: 1.0,
                u_ref_angle: 0.0,
                sk: None,
                rx_ratio: None,
                z01_ratio: None,
            }))
            .unwrap();
        store
            .emplace(Component::ThreeWindingTransformer(ThreeWindingTransformer {
                id: 5,
                node_1: 1,
                node_2: 2,
                node_3: 3,
                status_1: true,
                status_2: true,
                status_3: true,
                u1: 110_000.0,
                u2: 20_000.0,
                u3: 10_000.0,
                sn_1: 1.0e7,
                sn_2: 1.0e7,
                sn_3: 5.0e6,
                uk_12: 0.1,
                uk_13: 0.11,
                uk_23: 0.09,
                pk_12: 5.0e4,
                pk_13: 5.5e4,
                pk_23: 4.5e4,
                i0: 0.0,
                p0: 0.0,
                winding_1: WindingConnection::WyeGrounded,
                winding_2: WindingConnection::WyeGrounded,
                winding_3: WindingConnection::WyeGrounded,
                clock_12: 0,
                clock_13: 0,
                tap_side: TransformerTapSide::FromSide,
                tap_pos: 0,
                tap_min: -5,
                tap_max: 5,
                tap_nom: 0,
                tap_size: 0.01,
            }))
            .unwrap();
        store.set_construction_complete();
        store
    }

    #[test]
    fn three_winding_transformer_output_reads_all_three_terminals() {
        let store = three_winding_store();
        let (islands, comp_topo) = TopologyBuilder::new(&store).build();
        let v_bus = vec![vec![Complex64::new(1.0, 0.0); islands[0].n_node]];
        let outputs = three_winding_transformer_outputs(&store, &comp_topo, &islands, &v_bus);
        assert_eq!(outputs.len(), 1);
        let o = &outputs[0];
        assert!(o.energized);
        assert!(o.s_1 > 0.0);
        assert!(o.s_2 > 0.0);
        assert!(o.s_3 > 0.0);
    }
}
