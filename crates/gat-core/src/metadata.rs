//! The process-wide metadata registry.
//!
//! Enumerates dataset shapes, the component types each shape permits, and
//! per-component attribute lists (name, C-type tag, byte offset). Mirrors
//! `gat_core::solver::registry`'s `Lazy<RwLock<..>>` global-registry idiom,
//! generalized from "pluggable solver constructors" to "static attribute
//! descriptions" — the registry here is populated once at first access and
//! never mutated afterward, so `RwLock` is really just a `OnceLock` with
//! extra ceremony kept for texture consistency with the solver registry.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::component::ComponentKind;

/// Which dataset this metadata shape describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetShape {
    Input,
    Update,
    SymOutput,
    AsymOutput,
    ScOutput,
}

impl DatasetShape {
    pub fn name(self) -> &'static str {
        match self {
            DatasetShape::Input => "input",
            DatasetShape::Update => "update",
            DatasetShape::SymOutput => "sym_output",
            DatasetShape::AsymOutput => "asym_output",
            DatasetShape::ScOutput => "sc_output",
        }
    }
}

/// The on-wire/in-memory scalar representation of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CType {
    Int8,
    Int32,
    Int64,
    Double,
    Double3,
}

#[derive(Debug, Clone)]
pub struct MetaAttribute {
    pub name: &'static str,
    pub ctype: CType,
    /// Byte offset within a row-based record of this component/shape.
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct MetaComponent {
    pub kind: ComponentKind,
    pub attributes: Vec<MetaAttribute>,
}

impl MetaComponent {
    pub fn attribute(&self, name: &str) -> Option<&MetaAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Default)]
pub struct MetaDataset {
    shapes: HashMap<&'static str, HashMap<ComponentKind, MetaComponent>>,
}

impl MetaDataset {
    fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, shape: DatasetShape, components: Vec<MetaComponent>) {
        let map = components.into_iter().map(|c| (c.kind, c)).collect();
        self.shapes.insert(shape.name(), map);
    }

    pub fn permitted_components(&self, shape: DatasetShape) -> Vec<ComponentKind> {
        self.shapes
            .get(shape.name())
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn component(&self, shape: DatasetShape, kind: ComponentKind) -> Option<&MetaComponent> {
        self.shapes.get(shape.name()).and_then(|m| m.get(&kind))
    }
}

fn attr(name: &'static str, ctype: CType, offset: usize) -> MetaAttribute {
    MetaAttribute { name, ctype, offset }
}

fn build_registry() -> MetaDataset {
    let mut meta = MetaDataset::new();

    let id_attr = |offset| attr("id", CType::Int32, offset);

    meta.register(
        DatasetShape::Input,
        vec![
            MetaComponent {
                kind: ComponentKind::Node,
                attributes: vec![id_attr(0), attr("u_rated", CType::Double, 8)],
            },
            MetaComponent {
                kind: ComponentKind::Line,
                attributes: vec![
                    id_attr(0),
                    attr("from_node", CType::Int32, 4),
                    attr("to_node", CType::Int32, 8),
                    attr("from_status", CType::Int8, 12),
                    attr("to_status", CType::Int8, 13),
                    attr("r1", CType::Double, 16),
                    attr("x1", CType::Double, 24),
                    attr("c1", CType::Double, 32),
                    attr("tan1", CType::Double, 40),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Link,
                attributes: vec![
                    id_attr(0),
                    attr("from_node", CType::Int32, 4),
                    attr("to_node", CType::Int32, 8),
                    attr("from_status", CType::Int8, 12),
                    attr("to_status", CType::Int8, 13),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Transformer,
                attributes: vec![
                    id_attr(0),
                    attr("from_node", CType::Int32, 4),
                    attr("to_node", CType::Int32, 8),
                    attr("from_status", CType::Int8, 12),
                    attr("to_status", CType::Int8, 13),
                    attr("tap_pos", CType::Int32, 16),
                ],
            },
            MetaComponent {
                kind: ComponentKind::ThreeWindingTransformer,
                attributes: vec![
                    id_attr(0),
                    attr("node_1", CType::Int32, 4),
                    attr("node_2", CType::Int32, 8),
                    attr("node_3", CType::Int32, 12),
                    attr("status_1", CType::Int8, 16),
                    attr("status_2", CType::Int8, 17),
                    attr("status_3", CType::Int8, 18),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Source,
                attributes: vec![
                    id_attr(0),
                    attr("node", CType::Int32, 4),
                    attr("status", CType::Int8, 8),
                    attr("u_ref", CType::Double, 16),
                    attr("u_ref_angle", CType::Double, 24),
                ],
            },
            MetaComponent {
                kind: ComponentKind::SymLoad,
                attributes: vec![
                    id_attr(0),
                    attr("node", CType::Int32, 4),
                    attr("status", CType::Int8, 8),
                    attr("p_specified", CType::Double, 16),
                    attr("q_specified", CType::Double, 24),
                ],
            },
            MetaComponent {
                kind: ComponentKind::AsymLoad,
                attributes: vec![
                    id_attr(0),
                    attr("node", CType::Int32, 4),
                    attr("status", CType::Int8, 8),
                    attr("p_specified", CType::Double3, 16),
                    attr("q_specified", CType::Double3, 40),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Shunt,
                attributes: vec![
                    id_attr(0),
                    attr("node", CType::Int32, 4),
                    attr("status", CType::Int8, 8),
                    attr("g1", CType::Double, 16),
                    attr("b1", CType::Double, 24),
                ],
            },
            MetaComponent {
                kind: ComponentKind::SymVoltageSensor,
                attributes: vec![
                    id_attr(0),
                    attr("measured_object", CType::Int32, 4),
                    attr("u_sigma", CType::Double, 8),
                    attr("u_measured", CType::Double, 16),
                ],
            },
            MetaComponent {
                kind: ComponentKind::AsymVoltageSensor,
                attributes: vec![
                    id_attr(0),
                    attr("measured_object", CType::Int32, 4),
                    attr("u_sigma", CType::Double, 8),
                    attr("u_measured", CType::Double3, 16),
                ],
            },
            MetaComponent {
                kind: ComponentKind::SymPowerSensor,
                attributes: vec![
                    id_attr(0),
                    attr("measured_object", CType::Int32, 4),
                    attr("power_sigma", CType::Double, 8),
                    attr("p_measured", CType::Double, 16),
                    attr("q_measured", CType::Double, 24),
                ],
            },
            MetaComponent {
                kind: ComponentKind::AsymPowerSensor,
                attributes: vec![
                    id_attr(0),
                    attr("measured_object", CType::Int32, 4),
                    attr("power_sigma", CType::Double, 8),
                    attr("p_measured", CType::Double3, 16),
                    attr("q_measured", CType::Double3, 40),
                ],
            },
            MetaComponent {
                kind: ComponentKind::CurrentSensor,
                attributes: vec![
                    id_attr(0),
                    attr("measured_object", CType::Int32, 4),
                    attr("current_sigma", CType::Double, 8),
                    attr("i_measured", CType::Double, 16),
                    attr("i_angle_measured", CType::Double, 24),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Fault,
                attributes: vec![
                    id_attr(0),
                    attr("status", CType::Int8, 4),
                    attr("fault_object", CType::Int32, 8),
                    attr("r_f", CType::Double, 16),
                    attr("x_f", CType::Double, 24),
                ],
            },
            MetaComponent {
                kind: ComponentKind::TransformerTapRegulator,
                attributes: vec![
                    id_attr(0),
                    attr("regulated_object", CType::Int32, 4),
                    attr("status", CType::Int8, 8),
                    attr("u_set", CType::Double, 16),
                    attr("u_band", CType::Double, 24),
                ],
            },
        ],
    );

    meta.register(
        DatasetShape::Update,
        vec![
            MetaComponent {
                kind: ComponentKind::Line,
                attributes: vec![
                    id_attr(0),
                    attr("from_status", CType::Int8, 4),
                    attr("to_status", CType::Int8, 5),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Link,
                attributes: vec![
                    id_attr(0),
                    attr("from_status", CType::Int8, 4),
                    attr("to_status", CType::Int8, 5),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Transformer,
                attributes: vec![
                    id_attr(0),
                    attr("from_status", CType::Int8, 4),
                    attr("to_status", CType::Int8, 5),
                    attr("tap_pos", CType::Int32, 8),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Source,
                attributes: vec![
                    id_attr(0),
                    attr("status", CType::Int8, 4),
                    attr("u_ref", CType::Double, 8),
                    attr("u_ref_angle", CType::Double, 16),
                ],
            },
            MetaComponent {
                kind: ComponentKind::SymLoad,
                attributes: vec![
                    id_attr(0),
                    attr("status", CType::Int8, 4),
                    attr("p_specified", CType::Double, 8),
                    attr("q_specified", CType::Double, 16),
                ],
            },
            MetaComponent {
                kind: ComponentKind::AsymLoad,
                attributes: vec![
                    id_attr(0),
                    attr("status", CType::Int8, 4),
                    attr("p_specified", CType::Double3, 8),
                    attr("q_specified", CType::Double3, 32),
                ],
            },
            MetaComponent {
                kind: ComponentKind::Shunt,
                attributes: vec![id_attr(0), attr("status", CType::Int8, 4)],
            },
            MetaComponent {
                kind: ComponentKind::Fault,
                attributes: vec![
                    id_attr(0),
                    attr("status", CType::Int8, 4),
                    attr("r_f", CType::Double, 8),
                    attr("x_f", CType::Double, 16),
                ],
            },
        ],
    );

    meta
}

static METADATA: Lazy<RwLock<MetaDataset>> = Lazy::new(|| RwLock::new(build_registry()));

/// Dataset shapes permitted for `kind` under `shape`.
pub fn permitted_components(shape: DatasetShape) -> Vec<ComponentKind> {
    METADATA
        .read()
        .expect("metadata registry lock poisoned")
        .permitted_components(shape)
}

/// Look up a component's attribute list under a given dataset shape. Panics
/// never escape: missing metadata just means the caller treats every
/// attribute as absent (NaN-filled) rather than rejecting an unknown name.
pub fn attributes_of(shape: DatasetShape, kind: ComponentKind) -> Vec<MetaAttribute> {
    METADATA
        .read()
        .expect("metadata registry lock poisoned")
        .component(shape, kind)
        .map(|c| c.attributes.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_shape_lists_all_sixteen_kinds() {
        let kinds = permitted_components(DatasetShape::Input);
        assert_eq!(kinds.len(), ComponentKind::ALL.len());
    }

    #[test]
    fn update_shape_is_a_strict_subset_of_input() {
        let input = permitted_components(DatasetShape::Input);
        let update = permitted_components(DatasetShape::Update);
        assert!(update.iter().all(|k| input.contains(k)));
        assert!(update.len() < input.len());
    }

    #[test]
    fn sym_load_attributes_include_p_and_q() {
        let attrs = attributes_of(DatasetShape::Input, ComponentKind::SymLoad);
        assert!(attrs.iter().any(|a| a.name == "p_specified"));
        assert!(attrs.iter().any(|a| a.name == "q_specified"));
    }

    #[test]
    fn unknown_component_yields_empty_attribute_list() {
        let attrs = attributes_of(DatasetShape::SymOutput, ComponentKind::Fault);
        assert!(attrs.is_empty());
    }
}
