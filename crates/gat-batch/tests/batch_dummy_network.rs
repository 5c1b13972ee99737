//! Scenario 5 of the three-node radial dummy network: a batch of 3
//! scenarios varying sym-load 7's power/reactive power, run across
//! threads. Node 1 (the slack) must stay pinned at `u_ref` in every
//! scenario regardless of what downstream loads do.

use gat_batch::dispatch;
use gat_core::component::ComponentKind;
use gat_io::dataset::{AttrValue, Dataset, ElementRecord};
use gat_model::{CalculationOptions, Model};

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
        1,
        None,
        vec![row(&[
            ("id", AttrValue::Int32(6)),
            ("node", AttrValue::Int32(1)),
            ("status", AttrValue::Int8(1)),
            ("u_ref", AttrValue::Double(1.05)),
        ])],
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

#[test]
fn batch_scenarios_vary_downstream_voltage_slack_stays_fixed() {
    let input = dummy_network();
    let model = Model::new(50.0, &input).unwrap();

    let mut updates = Dataset::new(true, 3);
    updates
        .add_buffer(
            ComponentKind::SymLoad,
            1,
            3,
            None,
            vec![
                row(&[("id", AttrValue::Int32(7)), ("q_specified", AttrValue::Double(1.0e7))]),
                row(&[("id", AttrValue::Int32(7)), ("p_specified", AttrValue::Double(1.0e3))]),
                row(&[
                    ("id", AttrValue::Int32(7)),
                    ("p_specified", AttrValue::Double(1.0e3)),
                    ("q_specified", AttrValue::Double(1.0e7)),
                ]),
            ],
        )
        .unwrap();

    let mut target = Dataset::new(false, 3);
    let options = CalculationOptions { threading: 2, ..CalculationOptions::default() };

    let result = dispatch(&model, &updates, &mut target, &options).unwrap();
    assert_eq!(result.n_scenarios, 3);

    for scenario in 0..3 {
        let span = target.get_span(ComponentKind::Node, scenario).unwrap();
        let u1 = span
            .iter()
            .find(|r| r.get("id").and_then(AttrValue::as_i32) == Some(1))
            .unwrap()
            .get("u_pu")
            .unwrap()
            .as_f64();
        assert!((u1 - 1.05).abs() < 1e-9, "scenario {scenario}: u1 = {u1}");
    }
}
