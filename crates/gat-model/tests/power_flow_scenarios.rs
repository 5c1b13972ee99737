//! End-to-end coverage of the three-node radial dummy network: nodes
//! {1,2,3} at 10 kV, line 4 between 1-2, link 5 between 2-3, source 6 at
//! node 1 (`u_ref=1.05`), source 10 at node 3 (initially off), sym-load 7
//! at node 3 (`const_y`, `p=0.5e6`), asym-load 8 at node 3 (`const_y`,
//! `p_per_phase=0.5e6/3`), shunt 9 at node 3 (`g1=0.015`).

use gat_core::component::ComponentKind;
use gat_io::dataset::{AttrValue, Dataset, ElementRecord};
use gat_model::model::{CalculationOptions, CalculationSymmetry, Model};

fn row(pairs: &[(&str, AttrValue)]) -> ElementRecord {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn dummy_network() -> Dataset {
    let mut ds = Dataset::new(false, 1);
    ds.add_buffer(
        ComponentKind::Node,
        3,
        3,
        None,
        vec![
            row(&[("id", AttrValue::Int32(1)), ("u_rated", AttrValue::Double(10_000.0))]),
            row(&[("id", AttrValue::Int32(2)), ("u_rated", AttrValue::Double(10_000.0))]),
            row(&[("id", AttrValue::Int32(3)), ("u_rated", AttrValue::Double(10_000.0))]),
        ],
    )
    .unwrap();
    ds.add_buffer(
        ComponentKind::Line,
        1,
        1,
        None,
        vec![row(&[
            ("id", AttrValue::Int32(4)),
            ("from_node", AttrValue::Int32(1)),
            ("to_node", AttrValue::Int32(2)),
            ("from_status", AttrValue::Int8(1)),
            ("to_status", AttrValue::Int8(1)),
            ("r1", AttrValue::Double(10.0)),
            ("x1", AttrValue::Double(0.0)),
            ("c1", AttrValue::Double(0.0)),
            ("tan1", AttrValue::Double(0.0)),
        ])],
    )
    .unwrap();
    ds.add_buffer(
        ComponentKind::Link,
        1,
        1,
        None,
        vec![row(&[
            ("id", AttrValue::Int32(5)),
            ("from_node", AttrValue::Int32(2)),
            ("to_node", AttrValue::Int32(3)),
            ("from_status", AttrValue::Int8(1)),
            ("to_status", AttrValue::Int8(1)),
        ])],
    )
    .unwrap();
    ds.add_buffer(
        ComponentKind::Source,
        1,
        2,
        None,
        vec![
            row(&[
                ("id", AttrValue::Int32(6)),
                ("node", AttrValue::Int32(1)),
                ("status", AttrValue::Int8(1)),
                ("u_ref", AttrValue::Double(1.05)),
            ]),
            row(&[
                ("id", AttrValue::Int32(10)),
                ("node", AttrValue::Int32(3)),
                ("status", AttrValue::Int8(0)),
                ("u_ref", AttrValue::Double(1.05)),
            ]),
        ],
    )
    .unwrap();
    ds.add_buffer(
        ComponentKind::SymLoad,
        1,
        1,
        None,
        vec![row(&[
            ("id", AttrValue::Int32(7)),
            ("node", AttrValue::Int32(3)),
            ("status", AttrValue::Int8(1)),
            ("type", AttrValue::Int32(1)),
            ("p_specified", AttrValue::Double(0.5e6)),
            ("q_specified", AttrValue::Double(0.0)),
        ])],
    )
    .unwrap();
    ds.add_buffer(
        ComponentKind::AsymLoad,
        1,
        1,
        None,
        vec![row(&[
            ("id", AttrValue::Int32(8)),
            ("node", AttrValue::Int32(3)),
            ("status", AttrValue::Int8(1)),
            ("type", AttrValue::Int32(1)),
            ("p_specified", AttrValue::Double3([0.5e6 / 3.0; 3])),
            ("q_specified", AttrValue::Double3([0.0; 3])),
        ])],
    )
    .unwrap();
    ds.add_buffer(
        ComponentKind::Shunt,
        1,
        1,
        None,
        vec![row(&[
            ("id", AttrValue::Int32(9)),
            ("node", AttrValue::Int32(3)),
            ("status", AttrValue::Int8(1)),
            ("g1", AttrValue::Double(0.015)),
            ("b1", AttrValue::Double(0.0)),
        ])],
    )
    .unwrap();
    ds
}

fn node_u_pu(target: &Dataset, scenario: usize, id: i32) -> f64 {
    target
        .get_span(ComponentKind::Node, scenario)
        .unwrap()
        .iter()
        .find(|r| r.get("id").and_then(AttrValue::as_i32) == Some(id))
        .unwrap()
        .get("u_pu")
        .unwrap()
        .as_f64()
}

/// Scenario 1: symmetric, linear power flow against the dummy network as
/// constructed (source 10 is off, only source 6 is feeding).
#[test]
fn symmetric_power_flow_matches_hand_solved_bus_voltages() {
    let input = dummy_network();
    let mut model = Model::new(50.0, &input).unwrap();
    let mut target = Dataset::new(false, 1);
    let options = CalculationOptions::default();

    model.calculate(&options, &mut target, None).unwrap();

    let u1 = node_u_pu(&target, 0, 1);
    assert!((u1 - 1.05).abs() < 1e-9, "u1 = {u1}");

    // z_bus2 = 1 / (g1 + p_const_y/u_rated^2 * 2), the two const-impedance
    // loads (sym-load 7 and asym-load 8) each contribute p/u_rated^2 and the
    // shunt contributes g1 directly.
    let z_bus2 = 1.0 / (0.015 + 2.0 * 0.5e6 / (10_000.0_f64 * 10_000.0));
    let expected = z_bus2 / (z_bus2 + 10.0) * 1.05;
    let u2 = node_u_pu(&target, 0, 2);
    let u3 = node_u_pu(&target, 0, 3);
    assert!((u2 - expected).abs() < 0.005, "u2 = {u2}, expected {expected}");
    assert!((u3 - expected).abs() < 0.005, "u3 = {u3}, expected {expected}");
}

/// Scenario 2: requesting the asymmetric calculation symmetry on the same
/// network must still be accepted and must still produce the same bus
/// voltage, since nothing in the dummy network is phase-unbalanced.
#[test]
fn asymmetric_power_flow_matches_symmetric_per_phase() {
    let input = dummy_network();
    let mut model = Model::new(50.0, &input).unwrap();
    let mut target_sym = Dataset::new(false, 1);
    let mut target_asym = Dataset::new(false, 1);
    let sym_options = CalculationOptions { calculation_symmetry: CalculationSymmetry::Symmetric, ..CalculationOptions::default() };
    let asym_options = CalculationOptions { calculation_symmetry: CalculationSymmetry::Asymmetric, ..CalculationOptions::default() };

    model.calculate(&sym_options, &mut target_sym, None).unwrap();
    model.calculate(&asym_options, &mut target_asym, None).unwrap();

    let sym_u2 = node_u_pu(&target_sym, 0, 2);
    let asym_u2 = node_u_pu(&target_asym, 0, 2);
    assert!((sym_u2 - asym_u2).abs() < 0.005, "sym {sym_u2} vs asym {asym_u2}");
}

/// Scenario 3: updating sym-load 7 to double its power and switching off
/// asym-load 8 changes the downstream bus voltage accordingly.
#[test]
fn update_changes_bus_voltage_around_const_impedance_loads() {
    let input = dummy_network();
    let mut model = Model::new(50.0, &input).unwrap();
    let mut baseline = Dataset::new(false, 1);
    model.calculate(&CalculationOptions::default(), &mut baseline, None).unwrap();
    let u2_before = node_u_pu(&baseline, 0, 2);

    let mut update = Dataset::new(false, 1);
    update
        .add_buffer(
            ComponentKind::SymLoad,
            1,
            1,
            None,
            vec![row(&[("id", AttrValue::Int32(7)), ("p_specified", AttrValue::Double(1.0e6))])],
        )
        .unwrap();
    update
        .add_buffer(
            ComponentKind::AsymLoad,
            1,
            1,
            None,
            vec![row(&[("id", AttrValue::Int32(8)), ("status", AttrValue::Int8(0))])],
        )
        .unwrap();
    model.update(&update, gat_model::model::CacheKind::Permanent).unwrap();

    let mut after = Dataset::new(false, 1);
    model.calculate(&CalculationOptions::default(), &mut after, None).unwrap();
    let u2_after = node_u_pu(&after, 0, 2);

    assert!(u2_after < u2_before, "heavier const-y load should pull voltage down further: {u2_after} vs {u2_before}");
}

/// Scenario 5 (single-threaded half): running the same three scenarios
/// through `Model::calculate` one at a time (the batch-dispatch half of
/// this scenario, run across threads, is covered in `gat-batch`'s own
/// integration tests) keeps node 1 pinned regardless of sym-load 7's swing.
#[test]
fn sequential_scenarios_vary_downstream_voltage_slack_stays_fixed() {
    let input = dummy_network();
    let mut model = Model::new(50.0, &input).unwrap();
    let swings = [
        vec![("q_specified", AttrValue::Double(1.0e7))],
        vec![("p_specified", AttrValue::Double(1.0e3))],
        vec![("p_specified", AttrValue::Double(1.0e3)), ("q_specified", AttrValue::Double(1.0e7))],
    ];

    for swing in swings {
        let mut update = Dataset::new(false, 1);
        let mut pairs = vec![("id", AttrValue::Int32(7))];
        pairs.extend(swing);
        update.add_buffer(ComponentKind::SymLoad, 1, 1, None, vec![row(&pairs)]).unwrap();
        model.update(&update, gat_model::model::CacheKind::Cached).unwrap();

        let mut target = Dataset::new(false, 1);
        model.calculate(&CalculationOptions::default(), &mut target, None).unwrap();
        let u1 = node_u_pu(&target, 0, 1);
        assert!((u1 - 1.05).abs() < 1e-9, "u1 = {u1}");

        model.restore_components().unwrap();
    }
}
